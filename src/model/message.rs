use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    User,
    Model,
    /// session-internal transition annotation, never sent to the oracle as `system`
    System,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Part {
    pub text: String,
}

/// Suggested quick reply: clicking `label` sends `next_message`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Button {
    pub label: String,
    pub next_message: String,
}

/// Structured agent output: a short display text plus quick replies.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Interactive {
    pub concise_text: String,
    #[serde(default)]
    pub buttons: Vec<Button>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive: Option<Interactive>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part {
                text: text.into(),
            }],
            interactive: None,
        }
    }

    pub fn model(interactive: Interactive) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part {
                text: interactive.concise_text.clone(),
            }],
            interactive: Some(interactive),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![Part {
                text: text.into(),
            }],
            interactive: None,
        }
    }

    /// Text of the first part, empty when the message has none.
    pub fn text(&self) -> &str {
        self.parts.first().map(|p| p.text.as_str()).unwrap_or_default()
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}
