use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Runtime variables captured during a session, keyed by question id.
pub type RuntimeVariables = BTreeMap<String, RuntimeVariable>;

/// A form answer: free text or the selected option values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Choices(Vec<String>),
}

impl fmt::Display for AnswerValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            AnswerValue::Text(text) => write!(f, "{}", text),
            AnswerValue::Choices(choices) => write!(f, "{}", choices.join(", ")),
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        AnswerValue::Text(value.to_string())
    }
}

impl From<String> for AnswerValue {
    fn from(value: String) -> Self {
        AnswerValue::Text(value)
    }
}

impl From<Vec<String>> for AnswerValue {
    fn from(value: Vec<String>) -> Self {
        AnswerValue::Choices(value)
    }
}

/// A captured answer with the question text as it read at answer time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVariable {
    pub value: AnswerValue,
    pub question_text: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_answer_value_display() {
        assert_eq!(AnswerValue::from("plain").to_string(), "plain");
        assert_eq!(AnswerValue::Choices(vec!["a".into(), "b".into()]).to_string(), "a, b");
    }

    #[test]
    fn test_runtime_variable_wire_shape() {
        let var = RuntimeVariable {
            value: AnswerValue::Choices(vec!["red".into()]),
            question_text: "Favourite colour?".into(),
        };
        assert_eq!(serde_json::to_value(&var).unwrap(), json!({ "value": ["red"], "questionText": "Favourite colour?" }));
    }
}
