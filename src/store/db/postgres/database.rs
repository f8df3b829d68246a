use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::info;

use crate::{
    Result,
    store::{DbAtomic, DbCollection, DbStore, Store, data::*, map_db_err},
};

use super::{DbInit, collection::*, synclient::SynClient};

pub struct PostgresStore {
    conn: Arc<SynClient>,
    graphs: Arc<GraphCollection>,
    versions: Arc<VersionCollection>,
    nodes: Arc<NodeCollection>,
    edges: Arc<EdgeCollection>,
    variables: Arc<VariableCollection>,
    journeys: Arc<JourneyCollection>,
}

impl DbStore for PostgresStore {
    fn init(
        &self,
        s: &Store,
    ) -> Result<()> {
        self.graphs.init()?;
        self.versions.init()?;
        self.nodes.init()?;
        self.edges.init()?;
        self.variables.init()?;
        self.journeys.init()?;

        s.register(self.graphs());
        s.register(self.versions());
        s.register(self.nodes());
        s.register(self.edges());
        s.register(self.variables());
        s.register(self.journeys());
        s.register_atomic(Arc::new(self.clone()));
        info!("postgres store initialized");
        Ok(())
    }
}

impl Clone for PostgresStore {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            graphs: self.graphs.clone(),
            versions: self.versions.clone(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            variables: self.variables.clone(),
            journeys: self.journeys.clone(),
        }
    }
}

impl PostgresStore {
    pub fn new(
        db_url: &str,
        runtime: Arc<Runtime>,
    ) -> Result<Self> {
        let conn = Arc::new(SynClient::connect(db_url, runtime).map_err(map_db_err)?);

        Ok(Self {
            graphs: Arc::new(GraphCollection::new(&conn)),
            versions: Arc::new(VersionCollection::new(&conn)),
            nodes: Arc::new(NodeCollection::new(&conn)),
            edges: Arc::new(EdgeCollection::new(&conn)),
            variables: Arc::new(VariableCollection::new(&conn)),
            journeys: Arc::new(JourneyCollection::new(&conn)),
            conn,
        })
    }

    pub fn graphs(&self) -> Arc<dyn DbCollection<Item = GraphRow> + Send + Sync> {
        self.graphs.clone()
    }

    pub fn versions(&self) -> Arc<dyn DbCollection<Item = VersionRow> + Send + Sync> {
        self.versions.clone()
    }

    pub fn nodes(&self) -> Arc<dyn DbCollection<Item = NodeRow> + Send + Sync> {
        self.nodes.clone()
    }

    pub fn edges(&self) -> Arc<dyn DbCollection<Item = EdgeRow> + Send + Sync> {
        self.edges.clone()
    }

    pub fn variables(&self) -> Arc<dyn DbCollection<Item = VariableRow> + Send + Sync> {
        self.variables.clone()
    }

    pub fn journeys(&self) -> Arc<dyn DbCollection<Item = JourneyRow> + Send + Sync> {
        self.journeys.clone()
    }
}

impl DbAtomic for PostgresStore {
    fn publish_version(
        &self,
        graph_id: &str,
        version_id: &str,
    ) -> Result<bool> {
        if !self.versions.exists(version_id)? || self.versions.find(version_id)?.graph_id != graph_id {
            return Ok(false);
        }
        let affected = self.conn.transaction(VersionCollection::publish_statements(graph_id, version_id)).map_err(map_db_err)?;
        Ok(affected.last().copied().unwrap_or_default() > 0)
    }

    fn record_visit(
        &self,
        token: &str,
    ) -> Result<bool> {
        self.versions.increment_visits(token)
    }

    fn replace_workflow(
        &self,
        version_id: &str,
        nodes: &[NodeRow],
        edges: &[EdgeRow],
    ) -> Result<()> {
        let mut statements = self.nodes.replace_statements(version_id, nodes)?;
        statements.extend(self.edges.replace_statements(version_id, edges)?);
        self.conn.transaction(statements).map_err(map_db_err)?;
        Ok(())
    }
}
