use serde::{Deserialize, Serialize};

use crate::{
    model::EdgeModel,
    store::{DbCollectionIden, StoreIden},
    utils,
};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EdgeRow {
    pub id: String,
    pub version_id: String,
    pub edge_key: String,
    pub from_node_key: String,
    pub to_node_key: String,
    pub llm_prompt_template: String,
    pub priority: i32,
    pub fallback: bool,
    /// insertion order within the version
    pub seq: i64,
}

impl EdgeRow {
    pub fn new(
        version_id: &str,
        model: &EdgeModel,
        seq: i64,
    ) -> Self {
        Self {
            id: utils::longid(),
            version_id: version_id.to_string(),
            edge_key: model.edge_key.clone(),
            from_node_key: model.from_node_key.clone(),
            to_node_key: model.to_node_key.clone(),
            llm_prompt_template: model.llm_prompt_template.clone(),
            priority: model.priority,
            fallback: model.fallback,
            seq,
        }
    }

    pub fn model(&self) -> EdgeModel {
        EdgeModel {
            edge_key: self.edge_key.clone(),
            from_node_key: self.from_node_key.clone(),
            to_node_key: self.to_node_key.clone(),
            llm_prompt_template: self.llm_prompt_template.clone(),
            priority: self.priority,
            fallback: self.fallback,
        }
    }
}

impl DbCollectionIden for EdgeRow {
    fn iden() -> StoreIden {
        StoreIden::Edges
    }
}
