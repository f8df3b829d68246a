use serde::{Deserialize, Serialize};

use crate::{
    Result,
    model::NodeModel,
    store::{DbCollectionIden, StoreIden},
    utils,
};

/// A stored node. The full node model is kept as JSON in `data`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub id: String,
    pub version_id: String,
    pub node_key: String,
    pub title: String,
    pub category: String,
    pub data: String,
    /// insertion order within the version
    pub seq: i64,
}

impl NodeRow {
    pub fn new(
        version_id: &str,
        model: &NodeModel,
        seq: i64,
    ) -> Result<Self> {
        Ok(Self {
            id: utils::longid(),
            version_id: version_id.to_string(),
            node_key: model.node_key.clone(),
            title: model.title.clone(),
            category: model.category().as_ref().to_string(),
            data: serde_json::to_string(model)?,
            seq,
        })
    }

    pub fn model(&self) -> Result<NodeModel> {
        Ok(serde_json::from_str(&self.data)?)
    }
}

impl DbCollectionIden for NodeRow {
    fn iden() -> StoreIden {
        StoreIden::Nodes
    }
}
