//! Deterministic oracle backed by a queue of canned replies.
//!
//! Replies are consumed in order. Every request is recorded so callers can assert on
//! what was sent and how often the backend was hit.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    ChatflowError, Result,
    oracle::{Oracle, OracleRequest},
};

#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Error(ChatflowError),
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedOracle {
    replies: Arc<Mutex<VecDeque<Scripted>>>,
    calls: Arc<Mutex<Vec<OracleRequest>>>,
    delay: Duration,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw response text.
    pub fn with_response(
        self,
        text: impl Into<String>,
    ) -> Self {
        self.push(Scripted::Text(text.into()));
        self
    }

    /// Queue a JSON value, serialized as the response text.
    pub fn with_json(
        self,
        value: serde_json::Value,
    ) -> Self {
        self.with_response(value.to_string())
    }

    /// Queue a failing call.
    pub fn with_error(
        self,
        error: ChatflowError,
    ) -> Self {
        self.push(Scripted::Error(error));
        self
    }

    /// Simulated latency per call.
    pub fn with_delay(
        mut self,
        delay: Duration,
    ) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a response on a shared handle.
    pub fn push_response(
        &self,
        text: impl Into<String>,
    ) {
        self.push(Scripted::Text(text.into()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<OracleRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    fn push(
        &self,
        reply: Scripted,
    ) {
        self.replies.lock().unwrap().push_back(reply);
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        request: OracleRequest,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(request);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Error(err)) => Err(err),
            None => Err(ChatflowError::Oracle("scripted oracle has no reply left".to_string())),
        }
    }
}
