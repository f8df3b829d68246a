//! Chatflow engine - the main entry point for embedders.
//!
//! The engine wires the store, the oracle and the live session cache together:
//! - Opening visitor sessions from share tokens, or author previews from version ids
//! - Serializing turns per session and rejecting overlapping ones
//! - Broadcasting a [`Message`] for every observable step
//!
//! Authoring, public links and lead analytics are reachable through [`Engine::studio`],
//! [`Engine::gateway`] and [`Engine::journeys`].

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

use crate::{
    ChatflowError, GraphModel, Result, SessionConfig,
    common::{BroadcastQueue, MemCache},
    events::{Message, SessionEvent},
    gateway::PublicGateway,
    graph::Graph,
    journey::JourneyGateway,
    model::AnswerValue,
    oracle::OracleClient,
    runtime::{Session, SessionData, SessionId, TurnOutcome},
    store::Store,
    studio::{Identity, Studio},
    utils,
};

/// Size of the event broadcast buffer.
const EVENT_QUEUE_SIZE: usize = 1024;

/// The chatflow engine.
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().config(config).build()?;
///
/// let (sid, opening) = engine.start_session(&token).await?;
/// let outcome = engine.send_message(&sid, "Hi, I need a quote").await?;
/// ```
pub struct Engine {
    store: Arc<Store>,
    oracle: OracleClient,
    studio: Studio,
    gateway: PublicGateway,
    journeys: Arc<JourneyGateway>,
    /// Broadcast of session events.
    events: Arc<BroadcastQueue<Message>>,
    /// Live sessions, dropped after the configured idle timeout.
    sessions: MemCache<SessionId, Arc<Mutex<Session>>>,
}

impl Engine {
    pub fn new(
        store: Arc<Store>,
        oracle: OracleClient,
        config: &SessionConfig,
    ) -> Self {
        Self {
            studio: Studio::new(store.clone()),
            gateway: PublicGateway::new(store.clone()),
            journeys: Arc::new(JourneyGateway::new(store.clone())),
            events: BroadcastQueue::new(EVENT_QUEUE_SIZE),
            sessions: MemCache::new(config.session_capacity, Duration::from_secs(config.idle_timeout_secs)),
            store,
            oracle,
        }
    }

    /// Open a visitor session on the version behind a share token.
    ///
    /// Counts one visit. The returned outcome holds the opening line of an agent start node.
    pub async fn start_session(
        &self,
        token: &str,
    ) -> Result<(SessionId, TurnOutcome)> {
        let model = self.gateway.public_graph(token)?;
        self.open(model).await
    }

    /// Open an author preview of any version. No visit is recorded.
    pub async fn start_preview(
        &self,
        identity: Option<&Identity>,
        version_id: &str,
    ) -> Result<(SessionId, TurnOutcome)> {
        let model = self.studio.load_graph(identity, version_id)?;
        self.open(model).await
    }

    pub async fn send_message(
        &self,
        sid: &str,
        text: &str,
    ) -> Result<TurnOutcome> {
        let session = self.session(sid)?;
        let mut session = session.try_lock().map_err(|_| busy(sid))?;
        let result = session.send_message(text).await;
        self.settle(sid, result)
    }

    pub async fn submit_form(
        &self,
        sid: &str,
        answers: BTreeMap<String, AnswerValue>,
    ) -> Result<TurnOutcome> {
        let session = self.session(sid)?;
        let mut session = session.try_lock().map_err(|_| busy(sid))?;
        let result = session.submit_form(answers).await;
        self.settle(sid, result)
    }

    /// Pick one of the pending choices by target node key or edge key.
    pub async fn choose_transition(
        &self,
        sid: &str,
        target: &str,
    ) -> Result<TurnOutcome> {
        let session = self.session(sid)?;
        let mut session = session.try_lock().map_err(|_| busy(sid))?;
        let result = session.choose_transition(target).await;
        self.settle(sid, result)
    }

    pub async fn submit_report(
        &self,
        sid: &str,
        email: &str,
    ) -> Result<TurnOutcome> {
        let session = self.session(sid)?;
        let mut session = session.try_lock().map_err(|_| busy(sid))?;
        let result = session.submit_report(email).await;
        self.settle(sid, result)
    }

    /// Committed state of a session, waiting for an in-flight turn to settle.
    pub async fn view(
        &self,
        sid: &str,
    ) -> Result<SessionData> {
        let session = self.session(sid)?;
        let session = session.lock().await;
        Ok(session.data().clone())
    }

    /// Drop a live session. Returns false when it was unknown or already expired.
    pub fn end_session(
        &self,
        sid: &str,
    ) -> bool {
        let removed = self.sessions.remove(&sid.to_string()).is_some();
        if removed {
            info!(session = sid, "session closed");
        }
        removed
    }

    /// Subscribe to the events of every session.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.events.subscribe()
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }

    pub fn studio(&self) -> &Studio {
        &self.studio
    }

    pub fn gateway(&self) -> &PublicGateway {
        &self.gateway
    }

    pub fn journeys(&self) -> &JourneyGateway {
        &self.journeys
    }

    async fn open(
        &self,
        model: GraphModel,
    ) -> Result<(SessionId, TurnOutcome)> {
        let graph = Graph::try_from(&model)?;
        let sid = utils::longid();
        let mut session = Session::new(sid.clone(), graph, self.oracle.clone(), self.journeys.clone());

        let outcome = match session.start().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session = %sid, version = %model.version_id, error = %e, "session failed to start");
                self.publish(&sid, SessionEvent::failed(&e));
                return Err(e);
            }
        };

        self.publish(
            &sid,
            SessionEvent::Started {
                version_id: model.version_id.clone(),
            },
        );
        if let Some(node) = outcome.state.node() {
            self.publish(
                &sid,
                SessionEvent::NodeEntered {
                    node: node.to_string(),
                },
            );
        }
        for event in SessionEvent::from_outcome(&outcome) {
            self.publish(&sid, event);
        }

        self.sessions.set(sid.clone(), Arc::new(Mutex::new(session)));
        Ok((sid, outcome))
    }

    fn session(
        &self,
        sid: &str,
    ) -> Result<Arc<Mutex<Session>>> {
        self.sessions.get(&sid.to_string()).ok_or(ChatflowError::NotFound(format!("session '{}'", sid)))
    }

    /// Publish the events of a finished turn, or its failure.
    fn settle(
        &self,
        sid: &str,
        result: Result<TurnOutcome>,
    ) -> Result<TurnOutcome> {
        match &result {
            Ok(outcome) => {
                for event in SessionEvent::from_outcome(outcome) {
                    self.publish(sid, event);
                }
            }
            Err(e) => {
                warn!(session = sid, kind = e.kind().as_ref(), error = %e, "turn failed");
                self.publish(sid, SessionEvent::failed(e));
            }
        }
        result
    }

    fn publish(
        &self,
        sid: &str,
        event: SessionEvent,
    ) {
        self.events.send(Message::new(sid, event));
    }
}

fn busy(sid: &str) -> ChatflowError {
    ChatflowError::Session(format!("session '{}' is busy with another turn", sid))
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        model::{EdgeModel, NodeModel},
        oracle::ScriptedOracle,
        runtime::SessionState,
        store::{DbStore, MemStore},
    };

    fn engine(oracle: &ScriptedOracle) -> Engine {
        let store = Arc::new(Store::new());
        MemStore::new().init(&store).unwrap();
        Engine::new(store, OracleClient::new(Arc::new(oracle.clone())), &SessionConfig::default())
    }

    fn interactive(text: &str) -> Value {
        json!({ "concise_text": text, "buttons": [] })
    }

    /// Author a published A -> F -> R flow and return (version id, share token).
    fn publish_flow(engine: &Engine) -> (String, String) {
        let author = Identity::new("author");
        let who = Some(&author);
        let workspace = engine.studio().workspace(who, "p1", None).unwrap();
        let version_id = workspace.version.id;
        let form = NodeModel::form("F", json!({ "title": "Contact", "questions": [{ "id": "name", "text": "Your name?", "type": "text" }] }));
        engine
            .studio()
            .sync_workflow(
                who,
                &version_id,
                &[NodeModel::agent("A", "Guide", "You are a guide"), form, NodeModel::report("R", json!({ "title": "Report" }))],
                &[EdgeModel::new("e1", "A", "F", "user wants a quote"), EdgeModel::new("e2", "F", "R", "")],
            )
            .unwrap();
        engine.studio().publish_version(who, "p1", &version_id).unwrap();
        let token = engine.gateway().get_or_create_link(&version_id, false).unwrap();
        (version_id, token)
    }

    fn drain(rx: &mut broadcast::Receiver<Message>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            events.push(message.event);
        }
        events
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let engine = engine(&ScriptedOracle::new());
        let err = engine.start_session("missing").await.unwrap_err();
        assert!(matches!(err, ChatflowError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_visitor_flow_saves_journey() {
        let oracle = ScriptedOracle::new()
            .with_json(interactive("Hello!"))
            .with_json(json!({ "completed": true, "nextNodeKey": "F", "reason": "asked for a quote" }))
            .with_json(json!({ "summary": "Ada wants a quote" }));
        let engine = engine(&oracle);
        let (version_id, token) = publish_flow(&engine);
        let mut rx = engine.subscribe();

        let (sid, opening) = engine.start_session(&token).await.unwrap();
        assert_eq!(opening.messages[0].text(), "Hello!");
        assert_eq!(
            drain(&mut rx),
            vec![
                SessionEvent::Started {
                    version_id: version_id.clone()
                },
                SessionEvent::NodeEntered {
                    node: "A".into()
                },
                SessionEvent::AgentReplied {
                    text: "Hello!".into()
                },
            ]
        );

        let outcome = engine.send_message(&sid, "I need a quote").await.unwrap();
        assert_eq!(outcome.state, SessionState::Active("F".into()));

        let answers = BTreeMap::from([("name".to_string(), AnswerValue::from("Ada"))]);
        let outcome = engine.submit_form(&sid, answers).await.unwrap();
        assert_eq!(outcome.state, SessionState::Active("R".into()));

        let outcome = engine.submit_report(&sid, "ada@example.com").await.unwrap();
        assert_eq!(outcome.state, SessionState::Terminal("R".into()));
        let journey_id = outcome.journey_id.unwrap();
        assert!(drain(&mut rx).contains(&SessionEvent::JourneySaved {
            journey_id: journey_id.clone()
        }));

        let leads = engine.journeys().list_leads(&version_id).unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].id, journey_id);
        let analytics = engine.journeys().analytics(&version_id).unwrap();
        assert_eq!(analytics.total_visits, 1);
        assert_eq!(analytics.completion_rate, 100.0);

        assert_eq!(engine.view(&sid).await.unwrap().state, SessionState::Terminal("R".into()));
        assert!(engine.end_session(&sid));
        assert!(matches!(engine.view(&sid).await, Err(ChatflowError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_form_answer_overrides_project_variable() {
        let oracle = ScriptedOracle::new().with_json(interactive("Hello B"));
        let engine = engine(&oracle);
        let author = Identity::new("author");
        let who = Some(&author);
        engine.studio().upsert_variable(who, "p1", "name", "A").unwrap();
        let version_id = engine.studio().workspace(who, "p1", None).unwrap().version.id;
        let form = NodeModel::form("F", json!({ "title": "About you", "questions": [{ "id": "name", "text": "Your name?", "type": "text" }] }));
        engine
            .studio()
            .sync_workflow(who, &version_id, &[form, NodeModel::agent("S", "Greeter", "Hello @name")], &[EdgeModel::new("e1", "F", "S", "")])
            .unwrap();
        engine.studio().publish_version(who, "p1", &version_id).unwrap();
        let token = engine.gateway().get_or_create_link(&version_id, false).unwrap();

        let (sid, _) = engine.start_session(&token).await.unwrap();
        assert_eq!(oracle.call_count(), 0);
        let answers = BTreeMap::from([("name".to_string(), AnswerValue::from("B"))]);
        let outcome = engine.submit_form(&sid, answers).await.unwrap();
        assert_eq!(outcome.state, SessionState::Active("S".into()));

        let instruction = oracle.calls()[0].system_instruction.clone().unwrap();
        assert_eq!(instruction.lines().next(), Some("Hello B"));
    }

    #[tokio::test]
    async fn test_failed_turn_publishes_event() {
        let oracle = ScriptedOracle::new().with_json(interactive("Hello!")).with_error(ChatflowError::Oracle("503".into()));
        let engine = engine(&oracle);
        let (_, token) = publish_flow(&engine);
        let (sid, _) = engine.start_session(&token).await.unwrap();
        let mut rx = engine.subscribe();

        let err = engine.send_message(&sid, "hi").await.unwrap_err();
        assert!(err.is_retryable());
        let events = drain(&mut rx);
        assert!(matches!(&events[..], [SessionEvent::TurnFailed { retryable: true, .. }]));
        assert_eq!(engine.view(&sid).await.unwrap().history.len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_turn_is_rejected() {
        let oracle = ScriptedOracle::new()
            .with_json(interactive("Hello!"))
            .with_json(json!({ "completed": false, "nextNodeKey": null, "reason": "" }))
            .with_json(interactive("Sure"))
            .with_json(json!({ "completed": false, "nextNodeKey": null, "reason": "" }))
            .with_delay(Duration::from_millis(20));
        let engine = engine(&oracle);
        let (_, token) = publish_flow(&engine);
        let (sid, _) = engine.start_session(&token).await.unwrap();

        let (first, second) = tokio::join!(engine.send_message(&sid, "one"), engine.send_message(&sid, "two"));
        assert!(first.is_ok());
        assert!(matches!(second, Err(ChatflowError::Session(_))));
        assert_eq!(engine.view(&sid).await.unwrap().history.len(), 3);
    }

    #[tokio::test]
    async fn test_preview_requires_identity_and_skips_visits() {
        let oracle = ScriptedOracle::new().with_json(interactive("Hello!"));
        let engine = engine(&oracle);
        let (version_id, _) = publish_flow(&engine);

        assert!(matches!(engine.start_preview(None, &version_id).await, Err(ChatflowError::Unauthorized)));
        let author = Identity::new("author");
        let (_, opening) = engine.start_preview(Some(&author), &version_id).await.unwrap();
        assert_eq!(opening.state, SessionState::Active("A".into()));
        assert_eq!(engine.journeys().analytics(&version_id).unwrap().total_visits, 0);
    }
}
