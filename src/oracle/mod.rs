//! Transition oracle.
//!
//! The oracle is an opaque text-completion service: it takes a system instruction plus
//! user/model turns and returns free text that is expected to embed one JSON object.
//! [`OracleClient`] builds the four request shapes the session needs on top of any
//! [`Oracle`] backend and enforces the response contracts.

mod client;
mod extract;
mod gemini;
pub mod prompts;
mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{OracleClient, TransitionDecision};
pub use extract::extract_json;
pub use gemini::GeminiOracle;
pub use scripted::ScriptedOracle;

use crate::{Result, model::Role};

/// One turn sent to the oracle. Only `user` and `model` roles reach a backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OracleTurn {
    pub role: Role,
    pub text: String,
}

impl OracleTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct OracleRequest {
    pub system_instruction: Option<String>,
    pub contents: Vec<OracleTurn>,
    /// ask the backend for a JSON mime type response
    pub json_response: bool,
}

/// Text-completion backend.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Short backend name, used in logs.
    fn name(&self) -> &str;

    /// Run one completion and return the raw response text.
    async fn generate(
        &self,
        request: OracleRequest,
    ) -> Result<String>;
}
