use std::{sync::Arc, time::Duration};

use tokio::runtime::{Builder, Runtime};
use tracing::info;

use crate::{
    ChatflowError, Config, Engine, Result, StoreType,
    oracle::{GeminiOracle, Oracle, OracleClient},
    store::{DbStore, MemStore, PostgresStore, Store},
};

pub struct EngineBuilder {
    config: Config,
    store_worker_thread_number: u16,
    oracle: Option<Arc<dyn Oracle>>,
    store: Option<Arc<Store>>,
    rt: Option<Arc<Runtime>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            store_worker_thread_number: 4,
            oracle: None,
            store: None,
            rt: None,
        }
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    /// Oracle backend, defaults to Gemini built from the oracle config.
    pub fn oracle(
        mut self,
        oracle: Arc<dyn Oracle>,
    ) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// An already initialized store, bypassing the store config.
    pub fn store(
        mut self,
        store: Arc<Store>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    /// Worker threads of the runtime created for the postgres client.
    pub fn store_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.store_worker_thread_number = n;
        self
    }

    /// Runtime used by the postgres client instead of a dedicated one.
    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    pub fn build(&self) -> Result<Engine> {
        let store = match &self.store {
            Some(store) => store.clone(),
            None => self.build_store()?,
        };

        let oracle: Arc<dyn Oracle> = match &self.oracle {
            Some(oracle) => oracle.clone(),
            None => Arc::new(GeminiOracle::from_config(&self.config.oracle)?),
        };
        info!(oracle = oracle.name(), "engine oracle ready");

        let client = OracleClient::new(oracle)
            .with_timeout(Duration::from_millis(self.config.oracle.timeout_ms))
            .with_history_window(self.config.session.history_window);

        Ok(Engine::new(store, client, &self.config.session))
    }

    fn build_store(&self) -> Result<Arc<Store>> {
        let store = Store::new();
        let db: Box<dyn DbStore> = match self.config.store.store_type {
            StoreType::Mem => Box::new(MemStore::new()),
            StoreType::Postgres => {
                let postgres = self
                    .config
                    .store
                    .postgres
                    .as_ref()
                    .ok_or(ChatflowError::Config("postgres configuration is required when store type is postgres".to_string()))?;
                let runtime = match &self.rt {
                    Some(rt) => rt.clone(),
                    None => Arc::new(Builder::new_multi_thread().worker_threads(self.store_worker_thread_number.into()).enable_all().build()?),
                };
                Box::new(PostgresStore::new(&postgres.database_url, runtime)?)
            }
        };
        db.init(&store)?;
        Ok(Arc::new(store))
    }
}
