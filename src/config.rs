use std::{fs, path::Path};

use serde::Deserialize;

use crate::{ChatflowError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// store config
    pub store: StoreConfig,
    /// oracle config
    pub oracle: OracleConfig,
    /// session runtime config
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// store type
    pub store_type: StoreType,
    /// postgres config
    pub postgres: Option<PostgresConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    Mem,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    /// postgres database url
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// model name, e.g. `gemini-2.5-flash`
    pub model: String,
    /// api key, falls back to the `GEMINI_API_KEY` environment variable
    pub api_key: Option<String>,
    /// base url of the generative language api
    pub endpoint: String,
    /// upper bound of a single oracle call in milliseconds
    pub timeout_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// number of trailing history turns shown to evaluate-transition
    pub history_window: usize,
    /// max number of live sessions held by the engine
    pub session_capacity: u64,
    /// idle seconds after which an abandoned session is dropped
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            session_capacity: 10_000,
            idle_timeout_secs: 3600,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())
            .map_err(|e| ChatflowError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str).map_err(|e| ChatflowError::Config(format!("failed to parse the toml str: {}", e)))?;
        if config.store.store_type == StoreType::Postgres && config.store.postgres.is_none() {
            return Err(ChatflowError::Config("postgres configuration is required when store type is postgres".to_string()));
        }
        if config.session.history_window == 0 {
            return Err(ChatflowError::Config("session.history_window must be greater than 0".to_string()));
        }
        Ok(config)
    }
}
