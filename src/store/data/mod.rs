mod edge;
mod graph;
mod journey;
mod node;
mod variable;
mod version;

pub use edge::EdgeRow;
pub use graph::GraphRow;
pub use journey::JourneyRow;
pub use node::NodeRow;
pub use variable::VariableRow;
pub use version::{VersionRow, VersionStatus};
