//! # Chatflow
//!
//! Chatflow runs conversational funnels: authored graphs of AI agent, form and report
//! nodes that a visitor walks through by chatting. An LLM oracle writes the agent replies
//! and decides, from natural-language edge conditions, when to move to the next node.
//!
//! ## Core Features
//!
//! - **Versioned Authoring**: Draft and published graph versions with project variables
//! - **Public Links**: Share tokens, visit counting and lead analytics with CSV export
//! - **Atomic Turns**: A failed oracle call or store write never leaves a session half-updated
//! - **Pluggable Storage**: In-memory storage (testing) and PostgreSQL (production)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chatflow::{EngineBuilder, Identity};
//!
//! let engine = EngineBuilder::new().config(config).build()?;
//! let author = Identity::new("author-1");
//!
//! let workspace = engine.studio().workspace(Some(&author), "project-1", None)?;
//! engine.studio().sync_workflow(Some(&author), &workspace.version.id, &nodes, &edges)?;
//! engine.studio().publish_version(Some(&author), "project-1", &workspace.version.id)?;
//! let token = engine.gateway().get_or_create_link(&workspace.version.id, false)?;
//!
//! let (sid, opening) = engine.start_session(&token).await?;
//! let outcome = engine.send_message(&sid, "Hi!").await?;
//! ```

mod builder;
mod common;
mod config;
mod engine;
mod error;
pub mod events;
pub mod gateway;
pub mod graph;
pub mod journey;
mod model;
pub mod oracle;
pub mod runtime;
pub mod store;
pub mod studio;
mod utils;

use std::sync::{Arc, RwLock};

pub use builder::EngineBuilder;
pub use config::{Config, OracleConfig, PostgresConfig, SessionConfig, StoreConfig, StoreType};
pub use engine::Engine;
pub use error::{ChatflowError, ErrorKind};
pub use events::{Message, SessionEvent};
pub use gateway::PublicGateway;
pub use journey::{Analytics, JourneyGateway, JourneySink};
pub use model::*;
pub use runtime::{SessionData, SessionId, SessionState, TurnOutcome};
pub use studio::{Confirm, Identity, Studio, Workspace};

/// Result type alias for Chatflow operations.
pub type Result<T> = std::result::Result<T, ChatflowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
