use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    ChatflowError, Result,
    model::{EdgeModel, NodeModel},
};

/// A graph version snapshot as served to the runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphModel {
    pub version_id: String,
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<NodeModel>,
    pub edges: Vec<EdgeModel>,
    /// project variables, `key -> value`
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl GraphModel {
    pub fn from_json(s: &str) -> Result<Self> {
        let graph = serde_json::from_str::<GraphModel>(s);
        match graph {
            Ok(v) => Ok(v),
            Err(e) => Err(ChatflowError::Graph(format!("{}", e))),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
