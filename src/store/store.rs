use std::{
    any::Any,
    collections::HashMap,
    convert::AsRef,
    sync::{Arc, RwLock},
};

use tracing::trace;

use crate::{
    ChatflowError, GraphModel, Result, ShareLock,
    graph::template,
    store::{DbAtomic, query::Query},
};

use super::{DbCollection, DbCollectionIden, StoreIden, data::*};

#[derive(Clone)]
pub struct DynDbSetRef<T>(Arc<dyn DbCollection<Item = T>>);

pub struct Store {
    collections: ShareLock<HashMap<StoreIden, Arc<dyn Any + Send + Sync + 'static>>>,
    atomic: ShareLock<Option<Arc<dyn DbAtomic>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            atomic: Arc::new(RwLock::new(None)),
        }
    }

    pub fn collection<DATA>(&self) -> Arc<dyn DbCollection<Item = DATA>>
    where
        DATA: DbCollectionIden + Send + Sync + 'static,
    {
        let collections = self.collections.read().unwrap();

        #[allow(clippy::expect_fun_call)]
        let collection = collections.get(&DATA::iden()).expect(&format!("fail to get collection: {}", DATA::iden().as_ref()));

        #[allow(clippy::expect_fun_call)]
        collection.downcast_ref::<DynDbSetRef<DATA>>().map(|v| v.0.clone()).expect(&format!("fail to get collection: {}", DATA::iden().as_ref()))
    }

    pub fn register<DATA>(
        &self,
        collection: Arc<dyn DbCollection<Item = DATA> + Send + Sync + 'static>,
    ) where
        DATA: DbCollectionIden + 'static,
    {
        let mut collections = self.collections.write().unwrap();
        collections.insert(DATA::iden(), Arc::new(DynDbSetRef::<DATA>(collection)));
    }

    pub fn register_atomic(
        &self,
        atomic: Arc<dyn DbAtomic>,
    ) {
        *self.atomic.write().unwrap() = Some(atomic);
    }

    pub fn atomic(&self) -> Result<Arc<dyn DbAtomic>> {
        self.atomic.read().unwrap().clone().ok_or(ChatflowError::Store("atomic operations are not registered".to_string()))
    }

    pub fn graphs(&self) -> Arc<dyn DbCollection<Item = GraphRow>> {
        self.collection()
    }

    pub fn versions(&self) -> Arc<dyn DbCollection<Item = VersionRow>> {
        self.collection()
    }

    pub fn nodes(&self) -> Arc<dyn DbCollection<Item = NodeRow>> {
        self.collection()
    }

    pub fn edges(&self) -> Arc<dyn DbCollection<Item = EdgeRow>> {
        self.collection()
    }

    pub fn variables(&self) -> Arc<dyn DbCollection<Item = VariableRow>> {
        self.collection()
    }

    pub fn journeys(&self) -> Arc<dyn DbCollection<Item = JourneyRow>> {
        self.collection()
    }

    /// Nodes of a version in insertion order.
    pub fn version_nodes(
        &self,
        version_id: &str,
    ) -> Result<Vec<NodeRow>> {
        Ok(self.nodes().query(&Query::new().filter("version_id", version_id).order_by("seq", false))?.rows)
    }

    /// Edges of a version in insertion order.
    pub fn version_edges(
        &self,
        version_id: &str,
    ) -> Result<Vec<EdgeRow>> {
        Ok(self.edges().query(&Query::new().filter("version_id", version_id).order_by("seq", false))?.rows)
    }

    /// Project variables as a `key -> value` map.
    pub fn project_variables(
        &self,
        project_id: &str,
    ) -> Result<HashMap<String, String>> {
        let rows = self.variables().query(&Query::new().filter("project_id", project_id))?.rows;
        Ok(rows.into_iter().map(|v| (v.key, v.value)).collect())
    }

    /// Load a version with its templates as authored, plus the project variables.
    ///
    /// Sessions run on this model so runtime answers can still override project values.
    pub fn version_graph(
        &self,
        version_id: &str,
    ) -> Result<GraphModel> {
        trace!("store::version_graph({})", version_id);
        let version = self.versions().find(version_id)?;
        let graph = self.graphs().find(&version.graph_id)?;
        let variables = self.project_variables(&graph.project_id)?;
        let nodes = self.version_nodes(version_id)?.iter().map(NodeRow::model).collect::<Result<Vec<_>>>()?;
        let edges = self.version_edges(version_id)?.iter().map(EdgeRow::model).collect();

        Ok(GraphModel {
            version_id: version.id,
            name: graph.name,
            nodes,
            edges,
            variables,
        })
    }

    /// Load a version as a display snapshot with prompts and conditions resolved against
    /// the project variables.
    pub fn snapshot(
        &self,
        version_id: &str,
    ) -> Result<GraphModel> {
        let mut model = self.version_graph(version_id)?;
        for node in &mut model.nodes {
            node.system_prompt_template = node.system_prompt_template.take().map(|t| template::resolve(&t, &model.variables));
        }
        for edge in &mut model.edges {
            edge.llm_prompt_template = template::resolve(&edge.llm_prompt_template, &model.variables);
        }
        Ok(model)
    }
}
