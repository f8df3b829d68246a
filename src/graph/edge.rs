use serde::{Deserialize, Serialize};

use crate::model::{EdgeModel, NodeKey};

/// Runtime edge: a directed transition with its natural-language condition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Edge {
    pub key: String,
    pub from: NodeKey,
    pub to: NodeKey,
    /// condition text, may still carry `@var` references
    pub condition: String,
}

impl From<&EdgeModel> for Edge {
    fn from(model: &EdgeModel) -> Self {
        Self {
            key: model.edge_key.clone(),
            from: model.from_node_key.clone(),
            to: model.to_node_key.clone(),
            condition: model.condition().to_string(),
        }
    }
}
