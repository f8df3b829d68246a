//! Runtime graph representation.
//!
//! Wraps one graph version in a petgraph `DiGraph` so the session can answer the shape
//! queries it needs (start node, outgoing edges, terminality) without touching storage.
//! A `Graph` is immutable once built and cheap to clone.

use std::{collections::HashMap, sync::Arc};

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

use crate::{
    ChatflowError, GraphModel, Result,
    graph::{Edge, Node},
    model::NodeKey,
};

#[derive(Clone)]
pub struct Graph {
    version_id: String,
    graph: Arc<DiGraph<Node, Edge>>,
    index: Arc<HashMap<NodeKey, NodeIndex>>,
    /// project variables of the version
    variables: Arc<HashMap<String, String>>,
}

impl Graph {
    pub fn version_id(&self) -> &str {
        &self.version_id
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// get node by key
    pub fn get_node(
        &self,
        key: &str,
    ) -> Option<&Node> {
        self.index.get(key).map(|idx| &self.graph[*idx])
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_indices().map(|idx| &self.graph[idx])
    }

    /// The first node (in insertion order) that no edge points to.
    ///
    /// A fully cyclic graph falls back to the first node. An empty graph cannot be built,
    /// so this always yields a node.
    pub fn find_start_node(&self) -> Result<&Node> {
        let graph = &self.graph;
        graph
            .node_indices()
            .find(|idx| graph.neighbors_directed(*idx, Direction::Incoming).next().is_none())
            .or_else(|| graph.node_indices().next())
            .map(|idx| &graph[idx])
            .ok_or(ChatflowError::Graph("graph has no nodes".to_string()))
    }

    /// All edges leaving `key`, in the order they were defined.
    pub fn outgoing_edges(
        &self,
        key: &str,
    ) -> Vec<Edge> {
        let Some(idx) = self.index.get(key) else {
            return Vec::new();
        };

        // petgraph walks adjacency lists newest first
        let mut edges: Vec<_> = self.graph.edges_directed(*idx, Direction::Outgoing).collect();
        edges.sort_by_key(|e| e.id().index());
        edges.into_iter().map(|e| e.weight().clone()).collect()
    }

    /// check if node is terminal
    pub fn is_terminal(
        &self,
        key: &str,
    ) -> Result<bool> {
        let idx = self.index.get(key).ok_or(ChatflowError::Graph(format!("node '{}' not found", key)))?;
        Ok(self.graph.neighbors_directed(*idx, Direction::Outgoing).next().is_none())
    }

    /// Output a human-readable representation of the graph
    pub fn schema(&self) -> String {
        let graph = &self.graph;
        let mut lines = Vec::new();

        lines.push("=== Conversation Graph ===".to_string());
        lines.push(format!("Nodes: {}, Edges: {}", graph.node_count(), graph.edge_count()));
        lines.push(String::new());

        lines.push("--- Nodes ---".to_string());
        for node in self.nodes() {
            lines.push(format!("[{}] {} (category: {})", node.key, node.title, node.category().as_ref()));
        }
        lines.push(String::new());

        lines.push("--- Edges ---".to_string());
        for idx in graph.edge_indices() {
            let edge = &graph[idx];
            lines.push(format!("{} --[{}]--> {} (key: {})", edge.from, edge.condition, edge.to, edge.key));
        }
        lines.push(String::new());

        lines.push("--- Graph Structure ---".to_string());
        for node in self.nodes() {
            let outgoing: Vec<String> = self.outgoing_edges(&node.key).into_iter().map(|e| e.to).collect();
            if outgoing.is_empty() {
                lines.push(format!("{} -> (end)", node.key));
            } else {
                lines.push(format!("{} -> {}", node.key, outgoing.join(", ")));
            }
        }

        lines.join("\n")
    }
}

impl TryFrom<&GraphModel> for Graph {
    type Error = ChatflowError;

    fn try_from(model: &GraphModel) -> Result<Self> {
        if model.nodes.is_empty() {
            return Err(ChatflowError::Graph(format!("graph version '{}' has no nodes", model.version_id)));
        }

        let mut graph: DiGraph<Node, Edge> = DiGraph::new();
        let mut index = HashMap::new();

        for node_model in model.nodes.iter() {
            let node = Node::try_from(node_model)?;
            if index.contains_key(&node.key) {
                return Err(ChatflowError::Graph(format!("duplicate node key '{}'", node.key)));
            }
            let key = node.key.clone();
            let idx = graph.add_node(node);
            index.insert(key, idx);
        }

        for edge_model in model.edges.iter() {
            let edge = Edge::from(edge_model);
            let source = index.get(&edge.from).ok_or(ChatflowError::Graph(format!("source node '{}' of edge '{}' not found", edge.from, edge.key)))?;
            let target = index.get(&edge.to).ok_or(ChatflowError::Graph(format!("target node '{}' of edge '{}' not found", edge.to, edge.key)))?;
            graph.add_edge(*source, *target, edge);
        }

        Ok(Self {
            version_id: model.version_id.clone(),
            graph: Arc::new(graph),
            index: Arc::new(index),
            variables: Arc::new(model.variables.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::{EdgeModel, NodeCategory, NodeModel};

    fn model(
        nodes: Vec<NodeModel>,
        edges: Vec<EdgeModel>,
    ) -> GraphModel {
        GraphModel {
            version_id: "v1".to_string(),
            nodes,
            edges,
            ..Default::default()
        }
    }

    fn agent(key: &str) -> NodeModel {
        NodeModel::agent(key, key.to_uppercase(), format!("You are {}", key))
    }

    #[test]
    fn test_empty_graph_is_config_error() {
        let err = Graph::try_from(&model(vec![], vec![])).err().unwrap();
        assert!(matches!(err, ChatflowError::Graph(_)));
    }

    #[test]
    fn test_find_start_node_without_incoming_edge() {
        let graph = Graph::try_from(&model(
            vec![agent("b"), agent("a"), agent("c")],
            vec![EdgeModel::new("e1", "a", "b", "go"), EdgeModel::new("e2", "b", "c", "go")],
        ))
        .unwrap();
        assert_eq!(graph.find_start_node().unwrap().key, "a");
    }

    #[test]
    fn test_find_start_node_cyclic_falls_back_to_first() {
        let graph = Graph::try_from(&model(
            vec![agent("x"), agent("y")],
            vec![EdgeModel::new("e1", "x", "y", "go"), EdgeModel::new("e2", "y", "x", "back")],
        ))
        .unwrap();
        assert_eq!(graph.find_start_node().unwrap().key, "x");
    }

    #[test]
    fn test_outgoing_edges_keep_definition_order() {
        let graph = Graph::try_from(&model(
            vec![agent("a"), agent("b"), agent("c"), agent("d")],
            vec![
                EdgeModel::new("e1", "a", "b", "first"),
                EdgeModel::new("e2", "a", "c", "second"),
                EdgeModel::new("e3", "a", "d", ""),
            ],
        ))
        .unwrap();

        let edges = graph.outgoing_edges("a");
        let keys: Vec<&str> = edges.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["e1", "e2", "e3"]);
        assert_eq!(edges[2].condition, "Route to next node");
        assert!(graph.outgoing_edges("unknown").is_empty());
    }

    #[test]
    fn test_is_terminal() {
        let graph = Graph::try_from(&model(vec![agent("a"), agent("b")], vec![EdgeModel::new("e1", "a", "b", "go")])).unwrap();
        assert!(!graph.is_terminal("a").unwrap());
        assert!(graph.is_terminal("b").unwrap());
        assert!(graph.is_terminal("zzz").is_err());
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let err = Graph::try_from(&model(vec![agent("a")], vec![EdgeModel::new("e1", "a", "ghost", "go")])).err().unwrap();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_duplicate_node_key_rejected() {
        assert!(Graph::try_from(&model(vec![agent("a"), agent("a")], vec![])).is_err());
    }

    #[test]
    fn test_mixed_categories_and_schema() {
        let graph = Graph::try_from(&model(
            vec![
                agent("a"),
                NodeModel::form("f", json!({ "title": "Form", "questions": [{ "id": "q1", "text": "Name?", "type": "text" }] })),
                NodeModel::report("r", json!({ "title": "Report" })),
            ],
            vec![EdgeModel::new("e1", "a", "f", "user confirms"), EdgeModel::new("e2", "f", "r", "")],
        ))
        .unwrap();

        assert_eq!(graph.get_node("f").unwrap().category(), NodeCategory::Form);
        assert_eq!(graph.get_node("r").unwrap().category(), NodeCategory::Report);
        let schema = graph.schema();
        assert!(schema.contains("a --[user confirms]--> f"));
        assert!(schema.contains("r -> (end)"));
    }
}
