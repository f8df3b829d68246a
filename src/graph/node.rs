//! Typed runtime nodes.
//!
//! The storage model keeps a loose `category` plus optional JSON payloads. At graph build
//! time every node is validated against its payload schema and lifted into the closed
//! [`NodeKind`] union, so runtime dispatch is always an exhaustive match.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    ChatflowError, Result,
    model::{AnswerValue, NodeCategory, NodeKey, NodeModel},
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuestionType {
    Text,
    SingleSelect,
    MultiSelect,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QuestionOption {
    pub id: String,
    pub label: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

impl Question {
    /// Display text captured into runtime variables, the id when the text is blank.
    pub fn display_text(&self) -> &str {
        if self.text.trim().is_empty() { &self.id } else { &self.text }
    }

    /// Check an answer against the question type and its options.
    pub fn check_answer(
        &self,
        answer: &AnswerValue,
    ) -> Result<()> {
        let allowed = |value: &str| self.options.is_empty() || self.options.iter().any(|o| o.value == value);

        match (self.question_type, answer) {
            (QuestionType::Text, AnswerValue::Text(text)) if !text.trim().is_empty() => Ok(()),
            (QuestionType::SingleSelect, AnswerValue::Text(value)) if allowed(value) => Ok(()),
            (QuestionType::MultiSelect, AnswerValue::Choices(values)) if !values.is_empty() && values.iter().all(|v| allowed(v)) => Ok(()),
            _ => Err(ChatflowError::Validation(format!("invalid answer for question '{}'", self.id))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FormConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl FormConfig {
    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "questions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id", "type"],
                        "properties": {
                            "id": { "type": "string", "minLength": 1 },
                            "text": { "type": "string" },
                            "type": { "enum": ["text", "single_select", "multi_select"] },
                            "options": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "required": ["id", "label", "value"],
                                    "properties": {
                                        "id": { "type": "string" },
                                        "label": { "type": "string" },
                                        "value": { "type": "string" }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    pub fn create(params: &Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), params)?;
        Ok(serde_json::from_value(params.clone())?)
    }

    pub fn question(
        &self,
        id: &str,
    ) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    /// custom summarize instruction, the default recap prompt is used when absent
    #[serde(default)]
    pub system_prompt_template: Option<String>,
}

impl ReportConfig {
    fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "subtitle": { "type": "string" },
                "systemPromptTemplate": { "type": ["string", "null"] }
            }
        })
    }

    pub fn create(params: &Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), params)?;
        Ok(serde_json::from_value(params.clone())?)
    }

    /// Custom instruction, `None` when unset or blank.
    pub fn instruction(&self) -> Option<&str> {
        self.system_prompt_template.as_deref().filter(|t| !t.trim().is_empty())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AgentConfig {
    pub system_prompt_template: String,
    pub structured_output_schema: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum NodeKind {
    Agent(AgentConfig),
    Form(FormConfig),
    Report(ReportConfig),
}

impl NodeKind {
    pub fn category(&self) -> NodeCategory {
        match self {
            NodeKind::Agent(_) => NodeCategory::Agent,
            NodeKind::Form(_) => NodeCategory::Form,
            NodeKind::Report(_) => NodeCategory::Report,
        }
    }
}

/// Runtime node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Node {
    pub key: NodeKey,
    pub title: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn category(&self) -> NodeCategory {
        self.kind.category()
    }

    pub fn is_form(&self) -> bool {
        matches!(self.kind, NodeKind::Form(_))
    }
}

impl TryFrom<&NodeModel> for Node {
    type Error = ChatflowError;

    fn try_from(model: &NodeModel) -> Result<Self> {
        if model.node_key.trim().is_empty() {
            return Err(ChatflowError::Graph("node key must not be empty".to_string()));
        }

        let kind = match model.category() {
            NodeCategory::Agent => NodeKind::Agent(AgentConfig {
                system_prompt_template: model.system_prompt_template.clone().unwrap_or_default(),
                structured_output_schema: model.structured_output_schema.clone(),
            }),
            NodeCategory::Form => {
                let config = model.form_config.clone().unwrap_or(Value::Object(Default::default()));
                NodeKind::Form(
                    FormConfig::create(&config).map_err(|e| ChatflowError::Graph(format!("invalid form config of node '{}': {}", model.node_key, e)))?,
                )
            }
            NodeCategory::Report => {
                let config = model.report_config.clone().unwrap_or(Value::Object(Default::default()));
                NodeKind::Report(
                    ReportConfig::create(&config).map_err(|e| ChatflowError::Graph(format!("invalid report config of node '{}': {}", model.node_key, e)))?,
                )
            }
        };

        Ok(Self {
            key: model.node_key.clone(),
            title: model.title.clone(),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn form_model(config: Value) -> NodeModel {
        NodeModel::form("f1", config)
    }

    #[test]
    fn test_agent_node_from_model() {
        let node = Node::try_from(&NodeModel::agent("a1", "Guide", "You are @persona")).unwrap();
        assert_eq!(node.category(), NodeCategory::Agent);
        match node.kind {
            NodeKind::Agent(agent) => assert_eq!(agent.system_prompt_template, "You are @persona"),
            _ => panic!("expected agent"),
        }
    }

    #[test]
    fn test_form_node_from_model() {
        let node = Node::try_from(&form_model(json!({
            "title": "About you",
            "questions": [
                { "id": "q1", "text": "Name?", "type": "text" },
                { "id": "q2", "text": "Plan?", "type": "single_select", "options": [
                    { "id": "o1", "label": "Basic", "value": "basic" },
                    { "id": "o2", "label": "Pro", "value": "pro" }
                ]}
            ]
        })))
        .unwrap();

        let NodeKind::Form(form) = node.kind else { panic!("expected form") };
        assert_eq!(form.questions.len(), 2);
        assert_eq!(form.questions[1].question_type, QuestionType::SingleSelect);
        assert_eq!(form.question("q2").unwrap().options[1].value, "pro");
    }

    #[test]
    fn test_invalid_form_config_is_graph_error() {
        let err = Node::try_from(&form_model(json!({
            "questions": [{ "id": "q1", "type": "slider" }]
        })))
        .unwrap_err();
        assert!(matches!(err, ChatflowError::Graph(_)));
    }

    #[test]
    fn test_report_instruction() {
        let node = Node::try_from(&NodeModel::report("r1", json!({ "title": "Report", "systemPromptTemplate": "  " }))).unwrap();
        let NodeKind::Report(report) = node.kind else { panic!("expected report") };
        assert_eq!(report.instruction(), None);
    }

    #[test]
    fn test_check_answer() {
        let question = Question {
            id: "q".into(),
            text: "".into(),
            question_type: QuestionType::MultiSelect,
            options: vec![QuestionOption {
                id: "o1".into(),
                label: "A".into(),
                value: "a".into(),
            }],
        };
        assert_eq!(question.display_text(), "q");
        assert!(question.check_answer(&AnswerValue::Choices(vec!["a".into()])).is_ok());
        assert!(question.check_answer(&AnswerValue::Choices(vec!["b".into()])).is_err());
        assert!(question.check_answer(&AnswerValue::from("a")).is_err());
    }
}
