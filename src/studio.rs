//! Authoring operations over graphs, versions, nodes, edges and project variables.
//!
//! Every call takes the caller's identity and fails with `Unauthorized` before the store is
//! touched when there is none.

use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use regex::Regex;
use tracing::info;

use crate::{
    ChatflowError, GraphModel, Result,
    model::{DEFAULT_EDGE_CONDITION, DEFAULT_NODE_TITLE, EdgeModel, NodeModel},
    store::{
        Store,
        data::{EdgeRow, GraphRow, NodeRow, VariableRow, VersionRow, VersionStatus},
        query::Query,
    },
    utils::{self, time},
};

const DEFAULT_GRAPH_NAME: &str = "Default Workflow";

static VARIABLE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// An authenticated author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Asks the caller to confirm a destructive edit.
pub trait Confirm {
    fn confirm(
        &self,
        message: &str,
    ) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(
        &self,
        message: &str,
    ) -> bool {
        self(message)
    }
}

/// A version opened for editing.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub graph: GraphRow,
    pub version: VersionRow,
    pub nodes: Vec<NodeModel>,
    pub edges: Vec<EdgeModel>,
}

#[derive(Clone)]
pub struct Studio {
    store: Arc<Store>,
}

fn authorize(identity: Option<&Identity>) -> Result<&Identity> {
    match identity {
        Some(identity) if !identity.user_id.trim().is_empty() => Ok(identity),
        _ => Err(ChatflowError::Unauthorized),
    }
}

impl Studio {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
        }
    }

    /// The graph of a project, created on first access.
    pub fn graph(
        &self,
        identity: Option<&Identity>,
        project_id: &str,
    ) -> Result<GraphRow> {
        authorize(identity)?;
        if let Some(graph) = self.find_graph(project_id)? {
            return Ok(graph);
        }

        let graph = GraphRow {
            id: utils::longid(),
            project_id: project_id.to_string(),
            name: DEFAULT_GRAPH_NAME.to_string(),
            created_at: time::time_millis(),
        };
        self.store.graphs().create(&graph)?;
        info!(project = project_id, graph = %graph.id, "graph created");
        Ok(graph)
    }

    /// Open `version_id`, or the latest draft when absent, creating a draft if the graph has none.
    pub fn workspace(
        &self,
        identity: Option<&Identity>,
        project_id: &str,
        version_id: Option<&str>,
    ) -> Result<Workspace> {
        let graph = self.graph(identity, project_id)?;
        let versions = self.versions_of(&graph.id)?;

        let requested = version_id.and_then(|id| versions.iter().find(|v| v.id == id));
        let version = match requested.or_else(|| versions.iter().find(|v| v.status == VersionStatus::Draft)) {
            Some(version) => version.clone(),
            None => self.insert_version(&graph.id, next_version_number(&versions))?,
        };

        let nodes = self.store.version_nodes(&version.id)?.iter().map(NodeRow::model).collect::<Result<Vec<_>>>()?;
        let edges = self.store.version_edges(&version.id)?.iter().map(EdgeRow::model).collect();
        Ok(Workspace {
            graph,
            version,
            nodes,
            edges,
        })
    }

    /// Versions of a project's graph, newest version number first.
    pub fn list_versions(
        &self,
        identity: Option<&Identity>,
        project_id: &str,
    ) -> Result<Vec<VersionRow>> {
        authorize(identity)?;
        match self.find_graph(project_id)? {
            Some(graph) => self.versions_of(&graph.id),
            None => Ok(Vec::new()),
        }
    }

    /// Clone a node and edge set into a new draft numbered after the latest version.
    pub fn create_next_version(
        &self,
        identity: Option<&Identity>,
        project_id: &str,
        nodes: &[NodeModel],
        edges: &[EdgeModel],
    ) -> Result<VersionRow> {
        authorize(identity)?;
        let graph = self.find_graph(project_id)?.ok_or(ChatflowError::NotFound(format!("graph of project '{}'", project_id)))?;
        let (node_rows, edge_rows) = Self::workflow_rows("", nodes, edges)?;

        let version = self.insert_version(&graph.id, next_version_number(&self.versions_of(&graph.id)?))?;
        let node_rows = node_rows.into_iter().map(|row| NodeRow { version_id: version.id.clone(), ..row }).collect::<Vec<_>>();
        let edge_rows = edge_rows.into_iter().map(|row| EdgeRow { version_id: version.id.clone(), ..row }).collect::<Vec<_>>();
        self.store.atomic()?.replace_workflow(&version.id, &node_rows, &edge_rows)?;
        Ok(version)
    }

    /// Insert or update a node keyed by `(version, nodeKey)`.
    pub fn save_node(
        &self,
        identity: Option<&Identity>,
        version_id: &str,
        node: &NodeModel,
    ) -> Result<NodeRow> {
        authorize(identity)?;
        let node = normalize_node(node)?;
        self.editable_version(version_id)?;
        let existing = self.store.version_nodes(version_id)?;

        match existing.iter().find(|row| row.node_key == node.node_key) {
            Some(row) => {
                let updated = NodeRow {
                    id: row.id.clone(),
                    ..NodeRow::new(version_id, &node, row.seq)?
                };
                self.store.nodes().update(&updated)?;
                Ok(updated)
            }
            None => {
                let seq = existing.iter().map(|row| row.seq + 1).max().unwrap_or_default();
                let row = NodeRow::new(version_id, &node, seq)?;
                self.store.nodes().create(&row)?;
                Ok(row)
            }
        }
    }

    /// Insert or update an edge keyed by `(version, edgeKey)`.
    pub fn save_edge(
        &self,
        identity: Option<&Identity>,
        version_id: &str,
        edge: &EdgeModel,
    ) -> Result<EdgeRow> {
        authorize(identity)?;
        let edge = normalize_edge(edge)?;
        self.editable_version(version_id)?;
        let nodes = self.store.version_nodes(version_id)?;
        check_endpoints(&edge, |key| nodes.iter().any(|row| row.node_key == key))?;
        let existing = self.store.version_edges(version_id)?;

        match existing.iter().find(|row| row.edge_key == edge.edge_key) {
            Some(row) => {
                let updated = EdgeRow {
                    id: row.id.clone(),
                    ..EdgeRow::new(version_id, &edge, row.seq)
                };
                self.store.edges().update(&updated)?;
                Ok(updated)
            }
            None => {
                let seq = existing.iter().map(|row| row.seq + 1).max().unwrap_or_default();
                let row = EdgeRow::new(version_id, &edge, seq);
                self.store.edges().create(&row)?;
                Ok(row)
            }
        }
    }

    /// Delete a node together with every edge touching it, once the caller confirms.
    ///
    /// Returns false when the caller declined or the node does not exist.
    pub fn delete_node(
        &self,
        identity: Option<&Identity>,
        version_id: &str,
        node_key: &str,
        confirm: &dyn Confirm,
    ) -> Result<bool> {
        authorize(identity)?;
        self.editable_version(version_id)?;
        let nodes = self.store.version_nodes(version_id)?;
        if !nodes.iter().any(|row| row.node_key == node_key) {
            return Ok(false);
        }
        if !confirm.confirm(&format!("Delete node '{}' and its connections?", node_key)) {
            return Ok(false);
        }

        let nodes: Vec<NodeRow> = nodes.into_iter().filter(|row| row.node_key != node_key).collect();
        let edges: Vec<EdgeRow> =
            self.store.version_edges(version_id)?.into_iter().filter(|row| row.from_node_key != node_key && row.to_node_key != node_key).collect();
        self.store.atomic()?.replace_workflow(version_id, &nodes, &edges)?;
        info!(version = version_id, node = node_key, "node deleted");
        Ok(true)
    }

    pub fn delete_edge(
        &self,
        identity: Option<&Identity>,
        version_id: &str,
        edge_key: &str,
    ) -> Result<bool> {
        authorize(identity)?;
        self.editable_version(version_id)?;
        match self.store.version_edges(version_id)?.into_iter().find(|row| row.edge_key == edge_key) {
            Some(row) => self.store.edges().delete(&row.id),
            None => Ok(false),
        }
    }

    /// Replace every node and edge of a version in one step. Duplicate keys keep the last entry.
    pub fn sync_workflow(
        &self,
        identity: Option<&Identity>,
        version_id: &str,
        nodes: &[NodeModel],
        edges: &[EdgeModel],
    ) -> Result<()> {
        authorize(identity)?;
        self.editable_version(version_id)?;
        let (nodes, edges) = Self::workflow_rows(version_id, nodes, edges)?;
        self.store.atomic()?.replace_workflow(version_id, &nodes, &edges)?;
        info!(version = version_id, nodes = nodes.len(), edges = edges.len(), "workflow synced");
        Ok(())
    }

    /// Publish a version, reverting every other version of the graph to draft.
    pub fn publish_version(
        &self,
        identity: Option<&Identity>,
        project_id: &str,
        version_id: &str,
    ) -> Result<()> {
        authorize(identity)?;
        let graph = self.find_graph(project_id)?.ok_or(ChatflowError::NotFound(format!("graph of project '{}'", project_id)))?;
        if !self.store.atomic()?.publish_version(&graph.id, version_id)? {
            return Err(ChatflowError::NotFound(format!("version '{}'", version_id)));
        }
        info!(graph = %graph.id, version = version_id, "version published");
        Ok(())
    }

    pub fn unpublish_version(
        &self,
        identity: Option<&Identity>,
        project_id: &str,
        version_id: &str,
    ) -> Result<()> {
        authorize(identity)?;
        let graph = self.find_graph(project_id)?.ok_or(ChatflowError::NotFound(format!("graph of project '{}'", project_id)))?;
        let mut version = self.store.versions().find(version_id)?;
        if version.graph_id != graph.id {
            return Err(ChatflowError::NotFound(format!("version '{}'", version_id)));
        }
        if version.status == VersionStatus::Published {
            version.status = VersionStatus::Draft;
            self.store.versions().update(&version)?;
            info!(graph = %graph.id, version = version_id, "version unpublished");
        }
        Ok(())
    }

    /// Project variables ordered by key.
    pub fn list_variables(
        &self,
        identity: Option<&Identity>,
        project_id: &str,
    ) -> Result<Vec<VariableRow>> {
        authorize(identity)?;
        Ok(self.store.variables().query(&Query::new().filter("project_id", project_id).order_by("key", false))?.rows)
    }

    pub fn upsert_variable(
        &self,
        identity: Option<&Identity>,
        project_id: &str,
        key: &str,
        value: &str,
    ) -> Result<VariableRow> {
        authorize(identity)?;
        let key = check_variable_key(key)?;
        let existing = self.store.variables().query(&Query::new().filter("project_id", project_id).filter("key", key).set_limit(1))?.rows;

        match existing.into_iter().next() {
            Some(mut row) => {
                row.value = value.to_string();
                self.store.variables().update(&row)?;
                Ok(row)
            }
            None => {
                let row = VariableRow {
                    id: utils::longid(),
                    project_id: project_id.to_string(),
                    key: key.to_string(),
                    value: value.to_string(),
                };
                self.store.variables().create(&row)?;
                Ok(row)
            }
        }
    }

    pub fn rename_variable(
        &self,
        identity: Option<&Identity>,
        project_id: &str,
        id: &str,
        new_key: &str,
    ) -> Result<VariableRow> {
        authorize(identity)?;
        let new_key = check_variable_key(new_key)?;
        let mut row = self.project_variable(project_id, id)?;
        if row.key == new_key {
            return Ok(row);
        }
        let taken = self.store.variables().query(&Query::new().filter("project_id", project_id).filter("key", new_key).set_limit(1))?.count > 0;
        if taken {
            return Err(ChatflowError::Validation(format!("variable '{}' already exists", new_key)));
        }

        row.key = new_key.to_string();
        self.store.variables().update(&row)?;
        Ok(row)
    }

    pub fn delete_variable(
        &self,
        identity: Option<&Identity>,
        project_id: &str,
        id: &str,
    ) -> Result<bool> {
        authorize(identity)?;
        match self.project_variable(project_id, id) {
            Ok(_) => self.store.variables().delete(id),
            Err(ChatflowError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// A version with prompts and conditions resolved against the project variables.
    pub fn load_snapshot(
        &self,
        identity: Option<&Identity>,
        version_id: &str,
    ) -> Result<GraphModel> {
        authorize(identity)?;
        self.store.snapshot(version_id)
    }

    /// A version with its templates as authored, for running a preview session.
    pub fn load_graph(
        &self,
        identity: Option<&Identity>,
        version_id: &str,
    ) -> Result<GraphModel> {
        authorize(identity)?;
        self.store.version_graph(version_id)
    }

    fn find_graph(
        &self,
        project_id: &str,
    ) -> Result<Option<GraphRow>> {
        Ok(self.store.graphs().query(&Query::new().filter("project_id", project_id).set_limit(1))?.rows.into_iter().next())
    }

    fn versions_of(
        &self,
        graph_id: &str,
    ) -> Result<Vec<VersionRow>> {
        Ok(self.store.versions().query(&Query::new().filter("graph_id", graph_id).order_by("version_number", true))?.rows)
    }

    fn insert_version(
        &self,
        graph_id: &str,
        version_number: i32,
    ) -> Result<VersionRow> {
        let version = VersionRow {
            id: utils::longid(),
            graph_id: graph_id.to_string(),
            version_number,
            status: VersionStatus::Draft,
            public_token: None,
            visit_count: 0,
            created_at: time::time_millis(),
        };
        self.store.versions().create(&version)?;
        info!(graph = graph_id, version = %version.id, number = version_number, "version created");
        Ok(version)
    }

    fn project_variable(
        &self,
        project_id: &str,
        id: &str,
    ) -> Result<VariableRow> {
        let row = self.store.variables().find(id)?;
        if row.project_id != project_id {
            return Err(ChatflowError::NotFound(format!("variables '{}'", id)));
        }
        Ok(row)
    }

    /// The version, rejecting edits once it is published.
    fn editable_version(
        &self,
        version_id: &str,
    ) -> Result<VersionRow> {
        let version = self.store.versions().find(version_id)?;
        if version.is_published() {
            return Err(ChatflowError::Validation(format!(
                "version {} is published, unpublish it or create a new version to edit",
                version.version_number
            )));
        }
        Ok(version)
    }

    fn workflow_rows(
        version_id: &str,
        nodes: &[NodeModel],
        edges: &[EdgeModel],
    ) -> Result<(Vec<NodeRow>, Vec<EdgeRow>)> {
        let nodes = dedup_last_wins(nodes.iter().map(normalize_node).collect::<Result<Vec<_>>>()?, |n| n.node_key.clone());
        let edges = dedup_last_wins(edges.iter().map(normalize_edge).collect::<Result<Vec<_>>>()?, |e| e.edge_key.clone());
        for edge in &edges {
            check_endpoints(edge, |key| nodes.iter().any(|n| n.node_key == key))?;
        }

        let node_rows = nodes.iter().enumerate().map(|(seq, node)| NodeRow::new(version_id, node, seq as i64)).collect::<Result<Vec<_>>>()?;
        let edge_rows = edges.iter().enumerate().map(|(seq, edge)| EdgeRow::new(version_id, edge, seq as i64)).collect();
        Ok((node_rows, edge_rows))
    }
}

fn next_version_number(versions: &[VersionRow]) -> i32 {
    versions.iter().map(|v| v.version_number).max().unwrap_or_default() + 1
}

fn check_variable_key(key: &str) -> Result<&str> {
    let key = key.trim();
    if !VARIABLE_KEY_RE.is_match(key) {
        return Err(ChatflowError::Validation(format!("invalid variable key '{}'", key)));
    }
    Ok(key)
}

/// Both ends of an edge must be nodes of the same version.
fn check_endpoints(
    edge: &EdgeModel,
    has_node: impl Fn(&str) -> bool,
) -> Result<()> {
    for key in [&edge.from_node_key, &edge.to_node_key] {
        if !has_node(key.as_str()) {
            return Err(ChatflowError::Validation(format!("edge '{}' points at unknown node '{}'", edge.edge_key, key)));
        }
    }
    Ok(())
}

fn normalize_node(node: &NodeModel) -> Result<NodeModel> {
    let mut node = node.clone();
    node.node_key = node.node_key.trim().to_string();
    if node.node_key.is_empty() {
        return Err(ChatflowError::Validation("node key must not be empty".to_string()));
    }
    if node.title.trim().is_empty() {
        node.title = DEFAULT_NODE_TITLE.to_string();
    }
    node.category = Some(node.category());
    Ok(node)
}

fn normalize_edge(edge: &EdgeModel) -> Result<EdgeModel> {
    let mut edge = edge.clone();
    edge.edge_key = edge.edge_key.trim().to_string();
    if edge.edge_key.is_empty() {
        return Err(ChatflowError::Validation("edge key must not be empty".to_string()));
    }
    if edge.llm_prompt_template.trim().is_empty() {
        edge.llm_prompt_template = DEFAULT_EDGE_CONDITION.to_string();
    }
    Ok(edge)
}

/// Keep one item per key: the first position, the last value.
fn dedup_last_wins<T>(
    items: Vec<T>,
    key: impl Fn(&T) -> String,
) -> Vec<T> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        match index.get(&key(&item)) {
            Some(&i) => out[i] = item,
            None => {
                index.insert(key(&item), out.len());
                out.push(item);
            }
        }
    }
    out
}
