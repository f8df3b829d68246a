mod collect;
mod r#impl;

use std::{collections::HashMap, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use crate::{
    Result,
    store::{DbAtomic, DbCollection, DbStore, Store, data::*},
};
use collect::Collect;

#[derive(Debug, Clone)]
pub struct MemStore {
    graphs: Arc<Collect<GraphRow>>,
    versions: Arc<Collect<VersionRow>>,
    nodes: Arc<Collect<NodeRow>>,
    edges: Arc<Collect<EdgeRow>>,
    variables: Arc<Collect<VariableRow>>,
    journeys: Arc<Collect<JourneyRow>>,
}

trait DbDocument: Serialize + DeserializeOwned {
    fn id(&self) -> &str;
    fn doc(&self) -> Result<HashMap<String, JsonValue>>;

    /// Keys that must be unique across the collection.
    fn unique_keys(&self) -> Vec<String> {
        Vec::new()
    }
}

impl DbStore for MemStore {
    fn init(
        &self,
        s: &Store,
    ) -> Result<()> {
        s.register(self.graphs());
        s.register(self.versions());
        s.register(self.nodes());
        s.register(self.edges());
        s.register(self.variables());
        s.register(self.journeys());
        s.register_atomic(Arc::new(self.clone()));
        Ok(())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            graphs: Arc::new(Collect::new("graphs")),
            versions: Arc::new(Collect::new("versions")),
            nodes: Arc::new(Collect::new("nodes")),
            edges: Arc::new(Collect::new("edges")),
            variables: Arc::new(Collect::new("variables")),
            journeys: Arc::new(Collect::new("journeys")),
        }
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

impl DbAtomic for MemStore {
    fn publish_version(
        &self,
        graph_id: &str,
        version_id: &str,
    ) -> Result<bool> {
        Ok(self.versions.with_rows(|rows| {
            if !rows.iter().any(|v| v.id == version_id && v.graph_id == graph_id) {
                return false;
            }
            for version in rows.iter_mut().filter(|v| v.graph_id == graph_id) {
                version.status = if version.id == version_id {
                    VersionStatus::Published
                } else if version.status == VersionStatus::Published {
                    VersionStatus::Draft
                } else {
                    version.status
                };
            }
            true
        }))
    }

    fn record_visit(
        &self,
        token: &str,
    ) -> Result<bool> {
        Ok(self.versions.with_rows(|rows| match rows.iter_mut().find(|v| v.public_token.as_deref() == Some(token)) {
            Some(version) => {
                version.visit_count += 1;
                true
            }
            None => false,
        }))
    }

    fn replace_workflow(
        &self,
        version_id: &str,
        nodes: &[NodeRow],
        edges: &[EdgeRow],
    ) -> Result<()> {
        self.nodes.with_rows(|node_rows| {
            self.edges.with_rows(|edge_rows| {
                node_rows.retain(|n| n.version_id != version_id);
                node_rows.extend(nodes.iter().cloned());
                edge_rows.retain(|e| e.version_id != version_id);
                edge_rows.extend(edges.iter().cloned());
            })
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::query::Query;

    fn version(
        id: &str,
        number: i32,
        status: VersionStatus,
    ) -> VersionRow {
        VersionRow {
            id: id.to_string(),
            graph_id: "g1".to_string(),
            version_number: number,
            status,
            public_token: None,
            visit_count: 0,
            created_at: number as i64,
        }
    }

    #[test]
    fn test_query_filter_and_order() {
        let store = MemStore::new();
        let versions = store.versions();
        versions.create(&version("a", 1, VersionStatus::Draft)).unwrap();
        versions.create(&version("b", 2, VersionStatus::Draft)).unwrap();
        let mut other = version("c", 1, VersionStatus::Draft);
        other.graph_id = "g2".to_string();
        versions.create(&other).unwrap();

        let page = versions.query(&Query::new().filter("graph_id", "g1").order_by("version_number", true)).unwrap();
        assert_eq!(page.count, 2);
        assert_eq!(page.rows[0].id, "b");
        assert_eq!(page.rows[1].id, "a");
    }

    #[test]
    fn test_unique_constraint() {
        let store = MemStore::new();
        let versions = store.versions();
        versions.create(&version("a", 1, VersionStatus::Draft)).unwrap();
        assert!(versions.create(&version("b", 1, VersionStatus::Draft)).is_err());
        assert!(versions.create(&version("a", 3, VersionStatus::Draft)).is_err());
    }

    #[test]
    fn test_publish_is_exclusive() {
        let store = MemStore::new();
        let versions = store.versions();
        versions.create(&version("x", 1, VersionStatus::Draft)).unwrap();
        versions.create(&version("y", 2, VersionStatus::Published)).unwrap();

        assert!(store.publish_version("g1", "x").unwrap());
        let published: Vec<String> = versions.query(&Query::new().filter("status", "published")).unwrap().rows.into_iter().map(|v| v.id).collect();
        assert_eq!(published, vec!["x".to_string()]);
        assert!(!store.publish_version("g2", "x").unwrap());
    }

    #[test]
    fn test_record_visit() {
        let store = MemStore::new();
        let mut row = version("x", 1, VersionStatus::Published);
        row.public_token = Some("tok".to_string());
        store.versions().create(&row).unwrap();

        assert!(store.record_visit("tok").unwrap());
        assert!(store.record_visit("tok").unwrap());
        assert!(!store.record_visit("nope").unwrap());
        assert_eq!(store.versions().find("x").unwrap().visit_count, 2);
    }

    #[test]
    fn test_find_missing_is_not_found() {
        let store = MemStore::new();
        assert!(matches!(store.journeys().find("nope"), Err(crate::ChatflowError::NotFound(_))));
    }
}
