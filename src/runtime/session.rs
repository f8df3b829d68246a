//! Conversation session state machine.
//!
//! A [`Session`] owns one visitor's traversal of a graph version: the current node, the
//! message history and the runtime variables captured by forms. Every operation runs
//! against a draft copy of that data and only replaces it once the whole turn succeeded,
//! so a failed oracle call or store write never leaves history half-written.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, LazyLock},
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    ChatflowError, Result,
    graph::{Edge, FormConfig, Graph, Node, NodeKind, template},
    journey::JourneySink,
    model::{AnswerValue, ChatMessage, JourneySummary, NodeKey, RuntimeVariable, RuntimeVariables},
    oracle::OracleClient,
};

/// session id
pub type SessionId = String;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(tag = "state", content = "node", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    NotStarted,
    Active(NodeKey),
    Terminal(NodeKey),
}

impl SessionState {
    pub fn node(&self) -> Option<&str> {
        match self {
            SessionState::NotStarted => None,
            SessionState::Active(node) | SessionState::Terminal(node) => Some(node),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminal(_))
    }
}

/// The mutable part of a session.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub state: SessionState,
    pub history: Vec<ChatMessage>,
    pub runtime_variables: RuntimeVariables,
    /// outgoing edges offered to the visitor after a branching form
    pub pending_choices: Vec<Edge>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: NodeKey,
    pub to: NodeKey,
}

/// What a single session operation produced.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    /// messages appended to the history by this turn
    pub messages: Vec<ChatMessage>,
    pub transition: Option<Transition>,
    /// non-empty when the visitor has to pick the next node
    pub choices: Vec<Edge>,
    pub state: SessionState,
    /// summary shown after a report submission
    pub report: Option<String>,
    pub journey_id: Option<String>,
}

pub struct Session {
    id: SessionId,
    graph: Graph,
    oracle: OracleClient,
    journeys: Arc<dyn JourneySink>,
    data: SessionData,
    /// summary of a report submission whose journey write has not succeeded yet
    report_summary: Option<String>,
}

impl Session {
    pub fn new(
        id: SessionId,
        graph: Graph,
        oracle: OracleClient,
        journeys: Arc<dyn JourneySink>,
    ) -> Self {
        Self {
            id,
            graph,
            oracle,
            journeys,
            data: SessionData::default(),
            report_summary: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn state(&self) -> &SessionState {
        &self.data.state
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.data.history
    }

    pub fn runtime_variables(&self) -> &RuntimeVariables {
        &self.data.runtime_variables
    }

    /// The node the session currently sits on.
    pub fn current_node(&self) -> Option<&Node> {
        self.data.state.node().and_then(|key| self.graph.get_node(key))
    }

    /// Enter the start node. An agent start node produces its opening line.
    pub async fn start(&mut self) -> Result<TurnOutcome> {
        if self.data.state != SessionState::NotStarted {
            return Err(ChatflowError::Session("session already started".to_string()));
        }

        let start = self.graph.find_start_node()?.key.clone();
        let mut draft = self.data.clone();
        self.enter(&mut draft, &start).await?;

        info!(session = %self.id, version = self.graph.version_id(), node = %start, "session started");
        Ok(self.commit(draft, None))
    }

    /// Handle one visitor utterance on an agent node.
    pub async fn send_message(
        &mut self,
        text: &str,
    ) -> Result<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatflowError::Validation("message must not be empty".to_string()));
        }

        let (current, system_prompt) = {
            let node = self.active_node()?;
            let NodeKind::Agent(agent) = &node.kind else {
                return Err(ChatflowError::Session(format!("node '{}' does not accept messages", node.key)));
            };
            (node.key.clone(), agent.system_prompt_template.clone())
        };

        let mut draft = self.data.clone();
        draft.history.push(ChatMessage::user(text));
        let edges = self.resolved_edges(&draft, &current);

        // a form may interrupt the agent before it replies
        let decision = self.oracle.evaluate_transition(&current, &edges, &draft.history).await?;
        if let Some(target) = decision.target().filter(|t| *t != current)
            && self.graph.get_node(target).is_some_and(|n| n.is_form())
        {
            let target = target.to_string();
            debug!(session = %self.id, from = %current, to = %target, reason = %decision.reason, "instant shift to form");
            self.enter(&mut draft, &target).await?;
            return Ok(self.commit(draft, Some((current, target))));
        }

        let prompt = template::resolve_node_prompt(&system_prompt, self.graph.variables(), &draft.runtime_variables);
        let prior = &draft.history[..draft.history.len() - 1];
        let reply = self.oracle.converse(&prompt, prior, text).await?;
        draft.history.push(ChatMessage::model(reply));

        let decision = self.oracle.evaluate_transition(&current, &edges, &draft.history).await?;
        match decision.target() {
            Some(target) if target != current => {
                let target = target.to_string();
                debug!(session = %self.id, from = %current, to = %target, reason = %decision.reason, "transition decided");
                draft.history.push(ChatMessage::system(format!("Transitioning to: {}", target)));
                self.enter(&mut draft, &target).await?;
                Ok(self.commit(draft, Some((current, target))))
            }
            _ => Ok(self.commit(draft, None)),
        }
    }

    /// Submit the answers of the current form node.
    ///
    /// Every question must be answered. Answers are stored with the question text as it
    /// reads now, in question order.
    pub async fn submit_form(
        &mut self,
        answers: BTreeMap<String, AnswerValue>,
    ) -> Result<TurnOutcome> {
        let (current, form) = {
            let node = self.active_node()?;
            let NodeKind::Form(form) = &node.kind else {
                return Err(ChatflowError::Session(format!("node '{}' is not a form", node.key)));
            };
            (node.key.clone(), form.clone())
        };
        if !self.data.pending_choices.is_empty() {
            return Err(ChatflowError::Session("form already submitted, a transition choice is pending".to_string()));
        }

        let captured = capture_answers(&form, &answers)?;
        let mut draft = self.data.clone();

        let lines: Vec<String> = captured.iter().map(|(_, var)| format!("{}: {}", var.question_text, var.value)).collect();
        draft.history.push(ChatMessage::user(format!("Form Completed:\n{}", lines.join("\n"))));
        draft.runtime_variables.extend(captured);

        if self.graph.is_terminal(&current)? {
            info!(session = %self.id, node = %current, "form is a dead end, session finished");
            draft.state = SessionState::Terminal(current);
            return Ok(self.commit(draft, None));
        }

        let edges = self.graph.outgoing_edges(&current);
        if let [edge] = edges.as_slice() {
            let target = edge.to.clone();
            draft.history.push(ChatMessage::system(format!("Form completed. Transitioning to: {}", target)));
            self.enter(&mut draft, &target).await?;
            Ok(self.commit(draft, Some((current, target))))
        } else {
            debug!(session = %self.id, node = %current, choices = edges.len(), "form requires a transition choice");
            draft.pending_choices = self.resolved_edges(&draft, &current);
            Ok(self.commit(draft, None))
        }
    }

    /// Follow the pending choice that leads to `target`.
    pub async fn choose_transition(
        &mut self,
        target: &str,
    ) -> Result<TurnOutcome> {
        let current = self.active_node()?.key.clone();
        if self.data.pending_choices.is_empty() {
            return Err(ChatflowError::Session("no transition choice is pending".to_string()));
        }
        let Some(edge) = self.data.pending_choices.iter().find(|e| e.to == target || e.key == target).cloned() else {
            return Err(ChatflowError::Validation(format!("'{}' is not an available choice", target)));
        };

        let mut draft = self.data.clone();
        draft.pending_choices.clear();
        draft.history.push(ChatMessage::system(format!("Transitioning to: {}", edge.to)));
        self.enter(&mut draft, &edge.to).await?;
        Ok(self.commit(draft, Some((current, edge.to))))
    }

    /// Summarize the session and persist the journey for `email`.
    ///
    /// A failed write keeps the session on the report node so the visitor can resubmit.
    /// The summary is produced once and reused by retries.
    pub async fn submit_report(
        &mut self,
        email: &str,
    ) -> Result<TurnOutcome> {
        let (current, instruction) = {
            let node = self.current_node().ok_or(ChatflowError::Session("session not started".to_string()))?;
            let NodeKind::Report(report) = &node.kind else {
                return Err(ChatflowError::Session(format!("node '{}' is not a report", node.key)));
            };
            (node.key.clone(), report.instruction().map(str::to_string))
        };

        let email = email.trim();
        if !EMAIL_RE.is_match(email) {
            return Err(ChatflowError::Validation(format!("invalid email '{}'", email)));
        }

        let summary = match &self.report_summary {
            Some(summary) => summary.clone(),
            None => {
                let instruction = instruction.map(|i| template::resolve_node_prompt(&i, self.graph.variables(), &self.data.runtime_variables));
                let summary = self.oracle.summarize(&self.data.history, instruction.as_deref()).await;
                self.report_summary = Some(summary.clone());
                summary
            }
        };

        let journey = JourneySummary::new(&self.data.history, &self.data.runtime_variables, summary.clone());
        let journey_id = self.journeys.save(self.graph.version_id(), email, journey)?;
        info!(session = %self.id, journey = %journey_id, "journey saved");

        let mut draft = self.data.clone();
        draft.state = SessionState::Terminal(current);
        let mut outcome = self.commit(draft, None);
        outcome.report = Some(summary);
        outcome.journey_id = Some(journey_id);
        Ok(outcome)
    }

    /// The active node, rejecting sessions that have not started or already ended.
    fn active_node(&self) -> Result<&Node> {
        match &self.data.state {
            SessionState::NotStarted => Err(ChatflowError::Session("session not started".to_string())),
            SessionState::Terminal(node) => Err(ChatflowError::Session(format!("session ended at node '{}'", node))),
            SessionState::Active(key) => self.graph.get_node(key).ok_or(ChatflowError::Graph(format!("node '{}' not found", key))),
        }
    }

    /// Outgoing edges with their conditions resolved against the draft's variables.
    fn resolved_edges(
        &self,
        draft: &SessionData,
        node: &str,
    ) -> Vec<Edge> {
        let variables: HashMap<String, String> = template::merge_variables(self.graph.variables(), &draft.runtime_variables);
        self.graph
            .outgoing_edges(node)
            .into_iter()
            .map(|mut edge| {
                edge.condition = template::resolve(&edge.condition, &variables);
                edge
            })
            .collect()
    }

    /// Move the draft onto `key` and run the node's entry behaviour.
    async fn enter(
        &self,
        draft: &mut SessionData,
        key: &str,
    ) -> Result<()> {
        let node = self.graph.get_node(key).ok_or(ChatflowError::Graph(format!("node '{}' not found", key)))?;
        draft.state = SessionState::Active(node.key.clone());

        if let NodeKind::Agent(agent) = &node.kind {
            let needs_opening = draft.history.last().is_none_or(|m| m.is_system());
            if needs_opening {
                let prompt = template::resolve_node_prompt(&agent.system_prompt_template, self.graph.variables(), &draft.runtime_variables);
                let opening = self.oracle.initiate(&prompt).await?;
                draft.history.push(ChatMessage::model(opening));
            }
        }

        debug!(session = %self.id, node = %node.key, category = node.category().as_ref(), "node entered");
        Ok(())
    }

    fn commit(
        &mut self,
        draft: SessionData,
        transition: Option<(NodeKey, NodeKey)>,
    ) -> TurnOutcome {
        let messages = draft.history[self.data.history.len().min(draft.history.len())..].to_vec();
        if let Some((from, to)) = &transition {
            info!(session = %self.id, from = %from, to = %to, "transitioned");
        }

        self.data = draft;
        if !matches!(self.current_node().map(|n| &n.kind), Some(NodeKind::Report(_))) {
            self.report_summary = None;
        }

        TurnOutcome {
            messages,
            transition: transition.map(|(from, to)| Transition {
                from,
                to,
            }),
            choices: self.data.pending_choices.clone(),
            state: self.data.state.clone(),
            report: None,
            journey_id: None,
        }
    }
}

/// Validate answers against the form and pair each with its question text.
fn capture_answers(
    form: &FormConfig,
    answers: &BTreeMap<String, AnswerValue>,
) -> Result<Vec<(String, RuntimeVariable)>> {
    if let Some(unknown) = answers.keys().find(|id| form.question(id).is_none()) {
        return Err(ChatflowError::Validation(format!("unknown question '{}'", unknown)));
    }

    form.questions
        .iter()
        .map(|question| {
            let answer = answers.get(&question.id).ok_or(ChatflowError::Validation(format!("question '{}' is not answered", question.id)))?;
            question.check_answer(answer)?;
            Ok((
                question.id.clone(),
                RuntimeVariable {
                    value: answer.clone(),
                    question_text: question.display_text().to_string(),
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    };

    use serde_json::{Value, json};

    use super::*;
    use crate::{
        GraphModel,
        model::{EdgeModel, NodeModel, Role, StoredVariable},
        oracle::ScriptedOracle,
    };

    #[derive(Default)]
    struct RecordingSink {
        rows: Mutex<Vec<(String, String, JourneySummary)>>,
        fail_next: AtomicBool,
    }

    impl JourneySink for RecordingSink {
        fn save(
            &self,
            version_id: &str,
            email: &str,
            summary: JourneySummary,
        ) -> Result<String> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(ChatflowError::Store("connection reset".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            rows.push((version_id.to_string(), email.to_string(), summary));
            Ok(format!("journey-{}", rows.len()))
        }
    }

    fn interactive(text: &str) -> Value {
        json!({ "concise_text": text, "buttons": [{ "label": "Yes", "next_message": "yes" }] })
    }

    fn decision(
        completed: bool,
        next: Option<&str>,
    ) -> Value {
        json!({ "completed": completed, "nextNodeKey": next, "reason": "test" })
    }

    fn name_form(key: &str) -> NodeModel {
        NodeModel::form(key, json!({ "title": "About you", "questions": [{ "id": "name", "text": "What is your name?", "type": "text" }] }))
    }

    /// A --"user confirms"--> F --> R
    fn linear_graph() -> Graph {
        Graph::try_from(&GraphModel {
            version_id: "v1".into(),
            nodes: vec![
                NodeModel::agent("A", "Guide", "You are a guide for @company"),
                name_form("F"),
                NodeModel::report("R", json!({ "title": "Your report" })),
            ],
            edges: vec![EdgeModel::new("e1", "A", "F", "user confirms"), EdgeModel::new("e2", "F", "R", "")],
            variables: HashMap::from([("company".to_string(), "Acme".to_string())]),
            ..Default::default()
        })
        .unwrap()
    }

    fn session(
        graph: Graph,
        oracle: &ScriptedOracle,
    ) -> (Session, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let session = Session::new("s1".into(), graph, OracleClient::new(Arc::new(oracle.clone())), sink.clone());
        (session, sink)
    }

    fn answers(pairs: &[(&str, &str)]) -> BTreeMap<String, AnswerValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), AnswerValue::from(*v))).collect()
    }

    #[tokio::test]
    async fn test_agent_form_report_flow() {
        let oracle = ScriptedOracle::new()
            .with_json(interactive("Welcome to Acme!"))
            .with_json(decision(true, Some("F")))
            .with_json(json!({ "summary": "Ada wants a demo" }));
        let (mut session, sink) = session(linear_graph(), &oracle);

        let outcome = session.start().await.unwrap();
        assert_eq!(outcome.state, SessionState::Active("A".into()));
        assert_eq!(outcome.messages.len(), 1);
        assert!(oracle.calls()[0].system_instruction.as_ref().unwrap().contains("You are a guide for Acme"));

        // evaluate fires before the agent replies: no model message for this turn
        let outcome = session.send_message("yes").await.unwrap();
        assert_eq!(
            outcome.transition,
            Some(Transition {
                from: "A".into(),
                to: "F".into()
            })
        );
        assert_eq!(outcome.messages, vec![ChatMessage::user("yes")]);
        assert_eq!(session.state(), &SessionState::Active("F".into()));
        assert_eq!(oracle.call_count(), 2);

        let outcome = session.submit_form(answers(&[("name", "Ada")])).await.unwrap();
        assert_eq!(outcome.state, SessionState::Active("R".into()));
        assert_eq!(outcome.messages[0].text(), "Form Completed:\nWhat is your name?: Ada");
        assert_eq!(outcome.messages[1], ChatMessage::system("Form completed. Transitioning to: R"));
        assert_eq!(oracle.call_count(), 2);

        let outcome = session.submit_report("ada@example.com").await.unwrap();
        assert_eq!(outcome.report.as_deref(), Some("Ada wants a demo"));
        assert_eq!(outcome.state, SessionState::Terminal("R".into()));
        assert_eq!(oracle.call_count(), 3);

        let rows = sink.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        let (version, email, summary) = &rows[0];
        assert_eq!(version, "v1");
        assert_eq!(email, "ada@example.com");
        assert_eq!(summary.variables["name"].question_text(), Some("What is your name?"));
        assert_eq!(summary.ai_report.as_deref(), Some("Ada wants a demo"));
        assert_eq!(summary.history.last().unwrap().role, Role::System);
    }

    #[tokio::test]
    async fn test_evaluate_failure_leaves_state_unchanged() {
        let oracle = ScriptedOracle::new().with_json(interactive("Hi")).with_error(ChatflowError::Oracle("503".into()));
        let (mut session, _) = session(linear_graph(), &oracle);
        session.start().await.unwrap();
        let before = session.data().clone();

        let err = session.send_message("yes").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(session.data(), &before);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.state(), &SessionState::Active("A".into()));
    }

    #[tokio::test]
    async fn test_post_reply_failure_discards_reply() {
        let oracle = ScriptedOracle::new()
            .with_json(interactive("Hi"))
            .with_json(decision(false, None))
            .with_json(interactive("Tell me more"))
            .with_response("garbage");
        let (mut session, _) = session(linear_graph(), &oracle);
        session.start().await.unwrap();

        let err = session.send_message("hmm").await.unwrap_err();
        assert!(matches!(err, ChatflowError::OracleContract(_)));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_converse_and_stay() {
        let oracle = ScriptedOracle::new()
            .with_json(interactive("Hi"))
            .with_json(decision(false, None))
            .with_json(interactive("We sell widgets"))
            .with_json(decision(false, None));
        let (mut session, _) = session(linear_graph(), &oracle);
        session.start().await.unwrap();

        let outcome = session.send_message("what do you sell?").await.unwrap();
        assert_eq!(outcome.transition, None);
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[1].interactive.as_ref().unwrap().concise_text, "We sell widgets");
        assert_eq!(session.state(), &SessionState::Active("A".into()));
    }

    #[tokio::test]
    async fn test_agent_to_agent_transition_greets_once() {
        let graph = Graph::try_from(&GraphModel {
            version_id: "v1".into(),
            nodes: vec![NodeModel::agent("A", "Sales", "sales"), NodeModel::agent("B", "Support", "support")],
            edges: vec![EdgeModel::new("e1", "A", "B", "needs support")],
            ..Default::default()
        })
        .unwrap();
        let oracle = ScriptedOracle::new()
            .with_json(interactive("Sales here"))
            .with_json(decision(false, None))
            .with_json(interactive("Let me hand you over"))
            .with_json(decision(true, Some("B")))
            .with_json(interactive("Support here"));
        let (mut session, _) = session(graph, &oracle);
        session.start().await.unwrap();

        let outcome = session.send_message("my widget broke").await.unwrap();
        let texts: Vec<&str> = outcome.messages.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["my widget broke", "Let me hand you over", "Transitioning to: B", "Support here"]);
        assert_eq!(session.state(), &SessionState::Active("B".into()));
        assert_eq!(oracle.remaining(), 0);
    }

    #[tokio::test]
    async fn test_self_transition_is_ignored() {
        let graph = Graph::try_from(&GraphModel {
            version_id: "v1".into(),
            nodes: vec![NodeModel::agent("A", "Loop", "loop"), NodeModel::agent("B", "Other", "other")],
            edges: vec![EdgeModel::new("e0", "A", "A", "again"), EdgeModel::new("e1", "A", "B", "done")],
            ..Default::default()
        })
        .unwrap();
        let oracle = ScriptedOracle::new()
            .with_json(interactive("Hi"))
            .with_json(decision(true, Some("A")))
            .with_json(interactive("Again"))
            .with_json(decision(true, Some("A")));
        let (mut session, _) = session(graph, &oracle);
        session.start().await.unwrap();

        let outcome = session.send_message("again").await.unwrap();
        assert_eq!(outcome.transition, None);
        assert!(!session.history().iter().any(|m| m.is_system()));
    }

    #[tokio::test]
    async fn test_terminal_agent_never_evaluates() {
        let graph = Graph::try_from(&GraphModel {
            version_id: "v1".into(),
            nodes: vec![NodeModel::agent("A", "Solo", "solo")],
            ..Default::default()
        })
        .unwrap();
        let oracle = ScriptedOracle::new().with_json(interactive("Hi")).with_json(interactive("Sure"));
        let (mut session, _) = session(graph, &oracle);
        session.start().await.unwrap();

        session.send_message("hello").await.unwrap();
        assert_eq!(oracle.call_count(), 2);
        assert_eq!(session.history().len(), 3);
    }

    fn branching_graph() -> Graph {
        Graph::try_from(&GraphModel {
            version_id: "v1".into(),
            nodes: vec![
                name_form("F"),
                NodeModel::agent("Sales", "Sales", "Sell to @name"),
                NodeModel::report("R", json!({ "title": "Report", "systemPromptTemplate": "Only list what @name asked" })),
            ],
            edges: vec![EdgeModel::new("e1", "F", "Sales", "wants to buy"), EdgeModel::new("e2", "F", "R", "just browsing")],
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_form_start_needs_no_oracle() {
        let oracle = ScriptedOracle::new();
        let (mut session, _) = session(branching_graph(), &oracle);
        let outcome = session.start().await.unwrap();
        assert_eq!(outcome.state, SessionState::Active("F".into()));
        assert!(outcome.messages.is_empty());
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_branching_form_requires_choice() {
        let oracle = ScriptedOracle::new().with_json(interactive("Hello Ada, ready to buy?"));
        let (mut session, _) = session(branching_graph(), &oracle);
        session.start().await.unwrap();

        let outcome = session.submit_form(answers(&[("name", "Ada")])).await.unwrap();
        assert_eq!(outcome.transition, None);
        assert_eq!(outcome.choices.len(), 2);
        assert_eq!(session.state(), &SessionState::Active("F".into()));
        assert!(session.submit_form(answers(&[("name", "Ada")])).await.is_err());
        assert!(matches!(session.choose_transition("nowhere").await, Err(ChatflowError::Validation(_))));

        let outcome = session.choose_transition("Sales").await.unwrap();
        assert_eq!(outcome.messages[0], ChatMessage::system("Transitioning to: Sales"));
        assert_eq!(outcome.messages[1].text(), "Hello Ada, ready to buy?");
        assert!(outcome.choices.is_empty());
        assert!(oracle.calls()[0].system_instruction.as_ref().unwrap().starts_with("Sell to Ada"));
    }

    #[tokio::test]
    async fn test_failed_opening_rolls_back_form_submission() {
        let oracle = ScriptedOracle::new().with_response("no json here");
        let (mut session, _) = session(branching_graph(), &oracle);
        session.start().await.unwrap();
        session.submit_form(answers(&[("name", "Ada")])).await.unwrap();
        let before = session.data().clone();

        assert!(session.choose_transition("Sales").await.is_err());
        assert_eq!(session.data(), &before);
        assert_eq!(session.data().pending_choices.len(), 2);
    }

    #[tokio::test]
    async fn test_dead_end_form_is_terminal() {
        let graph = Graph::try_from(&GraphModel {
            version_id: "v1".into(),
            nodes: vec![name_form("F")],
            ..Default::default()
        })
        .unwrap();
        let (mut session, _) = session(graph, &ScriptedOracle::new());
        session.start().await.unwrap();

        let outcome = session.submit_form(answers(&[("name", "Ada")])).await.unwrap();
        assert_eq!(outcome.state, SessionState::Terminal("F".into()));
        assert!(session.send_message("hello?").await.is_err());
    }

    #[tokio::test]
    async fn test_form_answers_are_validated() {
        let (mut session, _) = session(branching_graph(), &ScriptedOracle::new());
        session.start().await.unwrap();

        assert!(matches!(session.submit_form(BTreeMap::new()).await, Err(ChatflowError::Validation(_))));
        assert!(matches!(session.submit_form(answers(&[("name", "Ada"), ("age", "3")])).await, Err(ChatflowError::Validation(_))));
        assert!(session.runtime_variables().is_empty());
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_report_retry_after_store_failure() {
        let oracle = ScriptedOracle::new().with_json(json!({ "summary": "short recap" }));
        let (mut session, sink) = session(branching_graph(), &oracle);
        session.start().await.unwrap();
        session.submit_form(answers(&[("name", "Ada")])).await.unwrap();
        session.choose_transition("R").await.unwrap();

        assert!(matches!(session.submit_report("not-an-email").await, Err(ChatflowError::Validation(_))));
        assert_eq!(oracle.call_count(), 0);

        sink.fail_next.store(true, Ordering::SeqCst);
        let err = session.submit_report("ada@example.com").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(session.state(), &SessionState::Active("R".into()));

        let outcome = session.submit_report("ada@example.com").await.unwrap();
        assert_eq!(outcome.report.as_deref(), Some("short recap"));
        assert_eq!(oracle.call_count(), 1);
        assert_eq!(sink.rows.lock().unwrap().len(), 1);
        assert!(oracle.calls()[0].contents[0].text.contains("Only list what Ada asked"));
    }

    #[tokio::test]
    async fn test_report_summary_fallback_still_saves() {
        let oracle = ScriptedOracle::new().with_error(ChatflowError::Timeout(10));
        let (mut session, sink) = session(branching_graph(), &oracle);
        session.start().await.unwrap();
        session.submit_form(answers(&[("name", "Ada")])).await.unwrap();
        session.choose_transition("R").await.unwrap();

        let outcome = session.submit_report("ada@example.com").await.unwrap();
        assert!(outcome.report.unwrap().starts_with("### Conversation Recap"));
        let rows = sink.rows.lock().unwrap();
        assert!(matches!(rows[0].2.variables["name"], StoredVariable::Captured(_)));
    }

    #[tokio::test]
    async fn test_operations_before_start() {
        let (mut session, _) = session(linear_graph(), &ScriptedOracle::new());
        assert!(matches!(session.send_message("hi").await, Err(ChatflowError::Session(_))));
        assert!(matches!(session.submit_report("a@b.co").await, Err(ChatflowError::Session(_))));
    }
}
