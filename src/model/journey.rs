use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ChatMessage, Role, RuntimeVariable, RuntimeVariables};

/// Flattened transcript line as persisted with a journey.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
}

/// A persisted variable. Older journeys stored bare values without question text.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum StoredVariable {
    Captured(RuntimeVariable),
    Legacy(serde_json::Value),
}

impl StoredVariable {
    pub fn question_text(&self) -> Option<&str> {
        match self {
            StoredVariable::Captured(var) => Some(&var.question_text),
            StoredVariable::Legacy(_) => None,
        }
    }

    pub fn value(&self) -> serde_json::Value {
        match self {
            StoredVariable::Captured(var) => serde_json::to_value(&var.value).unwrap_or_default(),
            StoredVariable::Legacy(value) => value.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JourneySummary {
    #[serde(default)]
    pub history: Vec<TranscriptEntry>,
    #[serde(default)]
    pub variables: BTreeMap<String, StoredVariable>,
    #[serde(default)]
    pub ai_report: Option<String>,
}

impl JourneySummary {
    pub fn new(
        history: &[ChatMessage],
        variables: &RuntimeVariables,
        ai_report: impl Into<String>,
    ) -> Self {
        Self {
            history: history
                .iter()
                .map(|m| TranscriptEntry {
                    role: m.role,
                    text: m.text().to_string(),
                })
                .collect(),
            variables: variables.iter().map(|(k, v)| (k.clone(), StoredVariable::Captured(v.clone()))).collect(),
            ai_report: Some(ai_report.into()),
        }
    }
}
