mod edge;
mod graph;
mod journey;
mod node;
mod variable;
mod version;

use std::sync::Arc;

use sea_query::{Alias as SeaAlias, Condition, Expr as SeaExpr, SimpleExpr, Value as SeaValue};
use serde_json::Value as JsonValue;
use sqlx::Error as DbError;

use crate::{ChatflowError, store::query::Query};

use super::synclient::SynClient;

pub use edge::EdgeCollection;
pub use graph::GraphCollection;
pub use journey::JourneyCollection;
pub use node::NodeCollection;
pub use variable::VariableCollection;
pub use version::VersionCollection;

pub type DbConnection = Arc<SynClient>;

/// Translate the equality filters of a [`Query`] into a sea-query condition.
pub fn into_query(q: &Query) -> Condition {
    let mut cond = Condition::all();
    for (key, value) in q.filters() {
        let col = SeaExpr::col(SeaAlias::new(key));
        let expr: SimpleExpr = match value {
            JsonValue::Null => col.is_null(),
            JsonValue::Bool(b) => col.eq(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => col.eq(i),
                None => col.eq(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => col.eq(s.as_str()),
            other => col.eq(SeaValue::from(other.to_string())),
        };
        cond = cond.add(expr);
    }
    cond
}

pub fn map_db_err(err: impl std::error::Error) -> ChatflowError {
    ChatflowError::Store(err.to_string())
}

/// Like [`map_db_err`] but turns a missing row into `NotFound`.
pub fn map_find_err(
    name: &str,
    id: &str,
) -> impl FnOnce(DbError) -> ChatflowError {
    let what = format!("{} '{}'", name, id);
    move |err| match err {
        DbError::RowNotFound => ChatflowError::NotFound(what),
        err => map_db_err(err),
    }
}
