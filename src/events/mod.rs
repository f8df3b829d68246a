//! Session events.
//!
//! The engine publishes a [`Message`] for every observable step of a session so that
//! embedders can stream transcripts, drive dashboards or audit failures.

use serde::{Deserialize, Serialize};

use crate::{
    ChatflowError,
    error::ErrorKind,
    model::{NodeKey, Role},
    runtime::{SessionId, TurnOutcome},
    utils::time,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        version_id: String,
    },
    NodeEntered {
        node: NodeKey,
    },
    AgentReplied {
        text: String,
    },
    Transitioned {
        from: NodeKey,
        to: NodeKey,
    },
    /// The visitor has to pick one of the listed target nodes.
    ChoiceRequired {
        choices: Vec<NodeKey>,
    },
    TurnFailed {
        kind: ErrorKind,
        error: String,
        retryable: bool,
    },
    JourneySaved {
        journey_id: String,
    },
    Ended {
        node: NodeKey,
    },
}

/// Event envelope carrying the session it belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub sid: SessionId,
    pub event: SessionEvent,
    /// milliseconds
    pub timestamp: i64,
}

impl Message {
    pub fn new(
        sid: &str,
        event: SessionEvent,
    ) -> Self {
        Self {
            sid: sid.to_string(),
            event,
            timestamp: time::time_millis(),
        }
    }
}

impl SessionEvent {
    /// Events describing what a successful turn did, in the order it happened.
    pub fn from_outcome(outcome: &TurnOutcome) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let mut transition = outcome.transition.as_ref();

        for message in &outcome.messages {
            match message.role {
                Role::Model => events.push(SessionEvent::AgentReplied {
                    text: message.text().to_string(),
                }),
                Role::System => {
                    if let Some(t) = transition.take() {
                        events.push(SessionEvent::Transitioned {
                            from: t.from.clone(),
                            to: t.to.clone(),
                        });
                        events.push(SessionEvent::NodeEntered {
                            node: t.to.clone(),
                        });
                    }
                }
                Role::User => {}
            }
        }
        // instant shifts carry no annotation message
        if let Some(t) = transition {
            events.push(SessionEvent::Transitioned {
                from: t.from.clone(),
                to: t.to.clone(),
            });
            events.push(SessionEvent::NodeEntered {
                node: t.to.clone(),
            });
        }

        if !outcome.choices.is_empty() {
            events.push(SessionEvent::ChoiceRequired {
                choices: outcome.choices.iter().map(|e| e.to.clone()).collect(),
            });
        }
        if let Some(journey_id) = &outcome.journey_id {
            events.push(SessionEvent::JourneySaved {
                journey_id: journey_id.clone(),
            });
        }
        if outcome.state.is_terminal()
            && let Some(node) = outcome.state.node()
        {
            events.push(SessionEvent::Ended {
                node: node.to_string(),
            });
        }
        events
    }

    pub fn failed(error: &ChatflowError) -> Self {
        SessionEvent::TurnFailed {
            kind: error.kind(),
            error: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::Edge,
        model::{ChatMessage, Interactive},
        runtime::{SessionState, Transition},
    };

    fn interactive(text: &str) -> Interactive {
        Interactive {
            concise_text: text.to_string(),
            buttons: vec![],
        }
    }

    #[test]
    fn test_transition_events_follow_message_order() {
        let outcome = TurnOutcome {
            messages: vec![
                ChatMessage::user("yes"),
                ChatMessage::model(interactive("Great")),
                ChatMessage::system("Transitioning to: B"),
                ChatMessage::model(interactive("Hi from B")),
            ],
            transition: Some(Transition {
                from: "A".into(),
                to: "B".into(),
            }),
            state: SessionState::Active("B".into()),
            ..Default::default()
        };

        assert_eq!(
            SessionEvent::from_outcome(&outcome),
            vec![
                SessionEvent::AgentReplied {
                    text: "Great".into()
                },
                SessionEvent::Transitioned {
                    from: "A".into(),
                    to: "B".into()
                },
                SessionEvent::NodeEntered {
                    node: "B".into()
                },
                SessionEvent::AgentReplied {
                    text: "Hi from B".into()
                },
            ]
        );
    }

    #[test]
    fn test_instant_shift_and_choices() {
        let outcome = TurnOutcome {
            messages: vec![ChatMessage::user("yes")],
            transition: Some(Transition {
                from: "A".into(),
                to: "F".into(),
            }),
            state: SessionState::Active("F".into()),
            ..Default::default()
        };
        let events = SessionEvent::from_outcome(&outcome);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SessionEvent::Transitioned { to, .. } if to == "F"));

        let outcome = TurnOutcome {
            choices: vec![Edge {
                key: "e1".into(),
                from: "F".into(),
                to: "X".into(),
                condition: "c".into(),
            }],
            state: SessionState::Active("F".into()),
            ..Default::default()
        };
        assert_eq!(
            SessionEvent::from_outcome(&outcome),
            vec![SessionEvent::ChoiceRequired {
                choices: vec!["X".into()]
            }]
        );
    }

    #[test]
    fn test_report_submission_events() {
        let outcome = TurnOutcome {
            state: SessionState::Terminal("R".into()),
            journey_id: Some("j1".into()),
            report: Some("summary".into()),
            ..Default::default()
        };
        assert_eq!(
            SessionEvent::from_outcome(&outcome),
            vec![
                SessionEvent::JourneySaved {
                    journey_id: "j1".into()
                },
                SessionEvent::Ended {
                    node: "R".into()
                }
            ]
        );
    }

    #[test]
    fn test_failed_event() {
        let event = SessionEvent::failed(&ChatflowError::Timeout(500));
        assert_eq!(
            event,
            SessionEvent::TurnFailed {
                kind: ErrorKind::Oracle,
                error: "oracle call timed out after 500ms".into(),
                retryable: true
            }
        );
    }
}
