mod edge;
#[allow(clippy::module_inception)]
mod graph;
mod node;
pub mod template;

pub use edge::Edge;
pub use graph::Graph;
pub use node::{AgentConfig, FormConfig, Node, NodeKind, Question, QuestionOption, QuestionType, ReportConfig};
