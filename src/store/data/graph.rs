use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GraphRow {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub created_at: i64,
}

impl DbCollectionIden for GraphRow {
    fn iden() -> StoreIden {
        StoreIden::Graphs
    }
}
