use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    ChatflowError, Result,
    graph::Edge,
    model::{ChatMessage, Interactive, NodeKey, Role},
    oracle::{
        Oracle, OracleRequest, OracleTurn, extract_json,
        prompts::{self, CONTEXT_ESTABLISHED_PROMPT, INITIATE_CONVERSATION_PROMPT, SUMMARY_FALLBACK},
    },
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Outcome of evaluate-transition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransitionDecision {
    pub completed: bool,
    pub next_node_key: Option<NodeKey>,
    pub reason: String,
}

impl TransitionDecision {
    /// The node is not done yet.
    pub fn stay() -> Self {
        Self {
            completed: false,
            next_node_key: None,
            reason: String::new(),
        }
    }

    /// Target node when the decision is a completed transition.
    pub fn target(&self) -> Option<&str> {
        if self.completed { self.next_node_key.as_deref() } else { None }
    }
}

#[derive(Deserialize)]
struct RawDecision {
    completed: bool,
    #[serde(default, rename = "nextNodeKey")]
    next_node_key: Option<String>,
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
struct RawSummary {
    summary: String,
}

/// The four oracle call shapes used by a session.
#[derive(Clone)]
pub struct OracleClient {
    oracle: Arc<dyn Oracle>,
    timeout: Duration,
    history_window: usize,
}

impl OracleClient {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            timeout: DEFAULT_TIMEOUT,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Upper bound of a single oracle call.
    pub fn with_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of trailing messages shown to evaluate-transition.
    pub fn with_history_window(
        mut self,
        window: usize,
    ) -> Self {
        self.history_window = window.max(1);
        self
    }

    async fn call(
        &self,
        request: OracleRequest,
    ) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.oracle.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(ChatflowError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Opening line of an agent node.
    pub async fn initiate(
        &self,
        system_prompt: &str,
    ) -> Result<Interactive> {
        debug!(oracle = self.oracle.name(), "initiate conversation");
        let text = self
            .call(OracleRequest {
                system_instruction: Some(prompts::agent_instruction(system_prompt)),
                contents: vec![OracleTurn::user(INITIATE_CONVERSATION_PROMPT)],
                json_response: true,
            })
            .await?;

        extract_json::<Interactive>(&text).inspect_err(|_| warn!(raw = %text, "malformed initiate response"))
    }

    /// Agent reply to `user_input` given the prior `history`.
    ///
    /// System annotations are sent as user turns, and a synthetic user turn is put in
    /// front when the history opens with a model message.
    pub async fn converse(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        user_input: &str,
    ) -> Result<Interactive> {
        let mut contents: Vec<OracleTurn> = history
            .iter()
            .map(|m| OracleTurn {
                role: if m.role == Role::Model { Role::Model } else { Role::User },
                text: m.text().to_string(),
            })
            .collect();
        if contents.first().is_some_and(|t| t.role == Role::Model) {
            contents.insert(0, OracleTurn::user(CONTEXT_ESTABLISHED_PROMPT));
        }
        contents.push(OracleTurn::user(user_input));

        debug!(oracle = self.oracle.name(), turns = contents.len(), "converse");
        let text = self
            .call(OracleRequest {
                system_instruction: Some(prompts::agent_instruction(system_prompt)),
                contents,
                json_response: true,
            })
            .await?;

        extract_json::<Interactive>(&text).inspect_err(|_| warn!(raw = %text, "malformed converse response"))
    }

    /// Decide whether `current` is done and where to go next.
    ///
    /// Terminal nodes short-circuit to [`TransitionDecision::stay`] without calling the
    /// oracle. A completed decision naming a node that is not an outgoing target is a
    /// contract violation.
    pub async fn evaluate_transition(
        &self,
        current: &str,
        edges: &[Edge],
        history: &[ChatMessage],
    ) -> Result<TransitionDecision> {
        if edges.is_empty() {
            return Ok(TransitionDecision::stay());
        }

        let recent = &history[history.len().saturating_sub(self.history_window)..];
        let text = self
            .call(OracleRequest {
                system_instruction: None,
                contents: vec![OracleTurn::user(prompts::evaluate_prompt(current, edges, recent))],
                json_response: true,
            })
            .await?;

        let raw = extract_json::<RawDecision>(&text).inspect_err(|_| warn!(raw = %text, "malformed evaluate response"))?;
        let decision = match (raw.completed, raw.next_node_key) {
            (true, Some(next)) => {
                if !edges.iter().any(|e| e.to == next) {
                    warn!(node = current, next = %next, "evaluate named a node that is not an outgoing target");
                    return Err(ChatflowError::OracleContract(format!("'{}' is not a transition target of '{}'", next, current)));
                }
                TransitionDecision {
                    completed: true,
                    next_node_key: Some(next),
                    reason: raw.reason,
                }
            }
            (_, _) => TransitionDecision {
                completed: false,
                next_node_key: None,
                reason: raw.reason,
            },
        };

        debug!(node = current, completed = decision.completed, next = ?decision.next_node_key, reason = %decision.reason, "transition evaluated");
        Ok(decision)
    }

    /// Recap of the conversation. Never fails: any error yields the canned fallback.
    pub async fn summarize(
        &self,
        history: &[ChatMessage],
        custom_instruction: Option<&str>,
    ) -> String {
        let visible: Vec<&ChatMessage> = history.iter().filter(|m| !m.is_system()).collect();
        let request = OracleRequest {
            system_instruction: None,
            contents: vec![OracleTurn::user(prompts::summary_prompt(custom_instruction, &visible))],
            json_response: true,
        };

        let summary = match self.call(request).await {
            Ok(text) => extract_json::<RawSummary>(&text).inspect_err(|_| warn!(raw = %text, "malformed summary response")),
            Err(err) => Err(err),
        };

        match summary {
            Ok(raw) => raw.summary,
            Err(err) => {
                warn!(error = %err, "summary generation failed, using fallback");
                SUMMARY_FALLBACK.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::oracle::ScriptedOracle;

    fn client(oracle: &ScriptedOracle) -> OracleClient {
        OracleClient::new(Arc::new(oracle.clone()))
    }

    fn edge(to: &str) -> Edge {
        Edge {
            key: format!("e-{}", to),
            from: "a".into(),
            to: to.into(),
            condition: format!("go to {}", to),
        }
    }

    fn reply(text: &str) -> ChatMessage {
        ChatMessage::model(Interactive {
            concise_text: text.into(),
            buttons: vec![],
        })
    }

    #[tokio::test]
    async fn test_initiate_parses_interactive() {
        let oracle = ScriptedOracle::new().with_response(r#"Here: {"concise_text": "Hi!", "buttons": [{"label": "Go", "next_message": "Let's go"}]}"#);
        let interactive = client(&oracle).initiate("You are a guide").await.unwrap();

        assert_eq!(interactive.concise_text, "Hi!");
        assert_eq!(interactive.buttons[0].next_message, "Let's go");
        let request = &oracle.calls()[0];
        assert!(request.system_instruction.as_ref().unwrap().starts_with("You are a guide\n"));
        assert_eq!(request.contents[0].text, INITIATE_CONVERSATION_PROMPT);
    }

    #[tokio::test]
    async fn test_initiate_malformed_is_contract_violation() {
        let oracle = ScriptedOracle::new().with_response("hello there");
        let err = client(&oracle).initiate("p").await.unwrap_err();
        assert!(matches!(err, ChatflowError::OracleContract(_)));
    }

    #[tokio::test]
    async fn test_converse_prepends_user_turn_and_maps_system() {
        let oracle = ScriptedOracle::new().with_json(json!({ "concise_text": "Sure", "buttons": [] }));
        let history = vec![reply("Welcome"), ChatMessage::system("Transitioning to: b")];
        client(&oracle).converse("p", &history, "tell me more").await.unwrap();

        let contents = &oracle.calls()[0].contents;
        let roles: Vec<Role> = contents.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Model, Role::User, Role::User]);
        assert_eq!(contents[0].text, CONTEXT_ESTABLISHED_PROMPT);
        assert_eq!(contents[3].text, "tell me more");
    }

    #[tokio::test]
    async fn test_evaluate_terminal_skips_oracle() {
        let oracle = ScriptedOracle::new();
        let decision = client(&oracle).evaluate_transition("r", &[], &[ChatMessage::user("bye")]).await.unwrap();
        assert_eq!(decision, TransitionDecision::stay());
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_evaluate_completed() {
        let oracle = ScriptedOracle::new().with_json(json!({ "completed": true, "nextNodeKey": "f", "reason": "confirmed" }));
        let decision = client(&oracle).evaluate_transition("a", &[edge("f")], &[ChatMessage::user("yes")]).await.unwrap();
        assert_eq!(decision.target(), Some("f"));
        assert_eq!(decision.reason, "confirmed");
    }

    #[tokio::test]
    async fn test_evaluate_unknown_target_is_contract_violation() {
        let oracle = ScriptedOracle::new().with_json(json!({ "completed": true, "nextNodeKey": "zzz", "reason": "" }));
        let err = client(&oracle).evaluate_transition("a", &[edge("f")], &[]).await.unwrap_err();
        assert!(matches!(err, ChatflowError::OracleContract(_)));
    }

    #[tokio::test]
    async fn test_evaluate_completed_without_target_stays() {
        let oracle = ScriptedOracle::new().with_json(json!({ "completed": true, "nextNodeKey": null, "reason": "unsure" }));
        let decision = client(&oracle).evaluate_transition("a", &[edge("f")], &[]).await.unwrap();
        assert!(!decision.completed);
        assert_eq!(decision.target(), None);
    }

    #[tokio::test]
    async fn test_evaluate_error_is_not_conflated_with_stay() {
        let oracle = ScriptedOracle::new().with_error(ChatflowError::Oracle("503".into()));
        let err = client(&oracle).evaluate_transition("a", &[edge("f")], &[]).await.unwrap_err();
        assert!(matches!(err, ChatflowError::Oracle(_)));
    }

    #[tokio::test]
    async fn test_evaluate_uses_history_window() {
        let oracle = ScriptedOracle::new().with_json(json!({ "completed": false, "nextNodeKey": null, "reason": "" }));
        let history: Vec<ChatMessage> = (0..5).map(|i| ChatMessage::user(format!("msg-{}", i))).collect();
        client(&oracle).with_history_window(2).evaluate_transition("a", &[edge("f")], &history).await.unwrap();

        let prompt = &oracle.calls()[0].contents[0].text;
        assert!(!prompt.contains("msg-2"));
        assert!(prompt.contains("msg-3"));
        assert!(prompt.contains("msg-4"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let oracle = ScriptedOracle::new().with_response("{}").with_delay(Duration::from_millis(200));
        let err = client(&oracle).with_timeout(Duration::from_millis(10)).initiate("p").await.unwrap_err();
        assert_eq!(err, ChatflowError::Timeout(10));
    }

    #[tokio::test]
    async fn test_summarize_filters_system_turns() {
        let oracle = ScriptedOracle::new().with_json(json!({ "summary": "Visitor wants pricing" }));
        let history = vec![ChatMessage::user("pricing?"), ChatMessage::system("Transitioning to: f"), reply("Here")];
        let summary = client(&oracle).summarize(&history, None).await;

        assert_eq!(summary, "Visitor wants pricing");
        let prompt = &oracle.calls()[0].contents[0].text;
        assert!(prompt.contains("USER: pricing?"));
        assert!(!prompt.contains("Transitioning to"));
    }

    #[tokio::test]
    async fn test_summarize_falls_back() {
        let oracle = ScriptedOracle::new().with_response("not json").with_error(ChatflowError::Oracle("down".into()));
        let client = client(&oracle);
        assert_eq!(client.summarize(&[], None).await, SUMMARY_FALLBACK);
        assert_eq!(client.summarize(&[], Some("custom")).await, SUMMARY_FALLBACK);
    }
}
