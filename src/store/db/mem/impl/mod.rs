mod edge;
mod graph;
mod journey;
mod node;
mod variable;
mod version;
