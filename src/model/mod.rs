mod edge;
mod graph;
mod journey;
mod message;
mod node;
mod variable;

pub use edge::{DEFAULT_EDGE_CONDITION, EdgeModel};
pub use graph::GraphModel;
pub use journey::{JourneySummary, StoredVariable, TranscriptEntry};
pub use message::{Button, ChatMessage, Interactive, Part, Role};
pub use node::{DEFAULT_NODE_TITLE, NodeCategory, NodeKey, NodeModel, Position};
pub use variable::{AnswerValue, RuntimeVariable, RuntimeVariables};
