//! Storage layer for graphs, versions, project variables and journeys.
//!
//! Provides an abstraction over different storage backends:
//! - `MemStore`: In-memory storage for testing
//! - `PostgresStore`: PostgreSQL for production persistence

pub mod data;
mod db;
pub mod query;
#[allow(clippy::module_inception)]
mod store;

use std::error::Error;

use serde::{Deserialize, Serialize};
use strum::AsRefStr;

use crate::{ChatflowError, Result};

use query::*;

pub use db::{MemStore, PostgresStore};
pub use store::Store;

/// Maps database errors to ChatflowError.
fn map_db_err(err: impl Error) -> ChatflowError {
    ChatflowError::Store(err.to_string())
}

/// Identifiers for different storage collections.
#[derive(Debug, Clone, AsRefStr, PartialEq, Hash, Eq)]
pub enum StoreIden {
    /// Graph containers, one per project.
    #[strum(serialize = "graphs")]
    Graphs,
    /// Graph versions.
    #[strum(serialize = "versions")]
    Versions,
    /// Nodes of a version.
    #[strum(serialize = "nodes")]
    Nodes,
    /// Edges of a version.
    #[strum(serialize = "edges")]
    Edges,
    /// Project variables.
    #[strum(serialize = "variables")]
    Variables,
    /// Persisted visitor journeys.
    #[strum(serialize = "journeys")]
    Journeys,
}

/// Paginated query result.
#[derive(Debug, Deserialize, Serialize)]
pub struct PageData<T> {
    /// Total number of matching records.
    pub count: usize,
    /// Current page number (1-based).
    pub page_num: usize,
    /// Total number of pages.
    pub page_count: usize,
    /// Number of records per page.
    pub page_size: usize,
    /// Records in the current page.
    pub rows: Vec<T>,
}

/// Trait for types that can identify their storage collection.
pub trait DbCollectionIden {
    /// Returns the collection identifier for this type.
    fn iden() -> StoreIden;
}

/// Trait for database collection operations.
pub trait DbCollection: Send + Sync {
    /// The type of items stored in this collection.
    type Item;

    /// Checks if a record with the given ID exists.
    fn exists(
        &self,
        id: &str,
    ) -> Result<bool>;

    /// Finds a record by ID.
    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item>;

    /// Queries records with pagination and filtering.
    fn query(
        &self,
        query: &Query,
    ) -> Result<PageData<Self::Item>>;

    /// Creates a new record.
    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool>;

    /// Updates an existing record.
    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool>;

    /// Deletes a record by ID.
    fn delete(
        &self,
        id: &str,
    ) -> Result<bool>;
}

/// Multi-row operations that must be applied atomically.
pub trait DbAtomic: Send + Sync {
    /// Mark `version_id` published and every other version of `graph_id` draft.
    fn publish_version(
        &self,
        graph_id: &str,
        version_id: &str,
    ) -> Result<bool>;

    /// Increment the visit counter of the version holding `token`.
    ///
    /// Returns false when no version holds the token.
    fn record_visit(
        &self,
        token: &str,
    ) -> Result<bool>;

    /// Replace all nodes and edges of a version.
    fn replace_workflow(
        &self,
        version_id: &str,
        nodes: &[data::NodeRow],
        edges: &[data::EdgeRow],
    ) -> Result<()>;
}

/// Trait for database store initialization.
pub trait DbStore {
    /// Initializes the database and registers collections with the store.
    fn init(
        &self,
        s: &Store,
    ) -> Result<()>;
}
