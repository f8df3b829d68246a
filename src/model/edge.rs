use serde::{Deserialize, Serialize};

use crate::model::NodeKey;

/// Condition used when an edge is saved without one.
pub const DEFAULT_EDGE_CONDITION: &str = "Route to next node";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeModel {
    pub edge_key: String,
    pub from_node_key: NodeKey,
    pub to_node_key: NodeKey,
    /// natural-language condition describing when the transition fires
    #[serde(default)]
    pub llm_prompt_template: String,
    /// stored for authoring, not consulted when evaluating transitions
    #[serde(default)]
    pub priority: i32,
    /// stored for authoring, not consulted when evaluating transitions
    #[serde(default)]
    pub fallback: bool,
}

impl EdgeModel {
    pub fn new(
        edge_key: impl Into<String>,
        from: impl Into<NodeKey>,
        to: impl Into<NodeKey>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            edge_key: edge_key.into(),
            from_node_key: from.into(),
            to_node_key: to.into(),
            llm_prompt_template: condition.into(),
            priority: 0,
            fallback: false,
        }
    }

    /// The edge condition, or the default one when left blank.
    pub fn condition(&self) -> &str {
        if self.llm_prompt_template.trim().is_empty() {
            DEFAULT_EDGE_CONDITION
        } else {
            &self.llm_prompt_template
        }
    }
}
