use serde::{Deserialize, Serialize};

/// Key of a node, unique within a graph version.
pub type NodeKey = String;

/// Title used when a node is saved without one.
pub const DEFAULT_NODE_TITLE: &str = "New Agent";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeCategory {
    #[default]
    Agent,
    Form,
    Report,
}

/// Editor canvas position, irrelevant to the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeModel {
    pub node_key: NodeKey,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<NodeCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_config: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_config: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodeModel {
    pub fn agent(
        node_key: impl Into<NodeKey>,
        title: impl Into<String>,
        system_prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            node_key: node_key.into(),
            title: title.into(),
            category: Some(NodeCategory::Agent),
            system_prompt_template: Some(system_prompt_template.into()),
            ..Default::default()
        }
    }

    pub fn form(
        node_key: impl Into<NodeKey>,
        form_config: serde_json::Value,
    ) -> Self {
        let title = form_config.get("title").and_then(|t| t.as_str()).unwrap_or_default().to_string();
        Self {
            node_key: node_key.into(),
            title,
            category: Some(NodeCategory::Form),
            form_config: Some(form_config),
            ..Default::default()
        }
    }

    pub fn report(
        node_key: impl Into<NodeKey>,
        report_config: serde_json::Value,
    ) -> Self {
        let title = report_config.get("title").and_then(|t| t.as_str()).unwrap_or_default().to_string();
        Self {
            node_key: node_key.into(),
            title,
            category: Some(NodeCategory::Report),
            report_config: Some(report_config),
            ..Default::default()
        }
    }

    /// Explicit category, else inferred from which payload is present.
    pub fn category(&self) -> NodeCategory {
        match self.category {
            Some(category) => category,
            None if self.form_config.is_some() => NodeCategory::Form,
            None if self.report_config.is_some() => NodeCategory::Report,
            None => NodeCategory::Agent,
        }
    }
}
