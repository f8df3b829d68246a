use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

/// A project variable, unique per `(project_id, key)`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct VariableRow {
    pub id: String,
    pub project_id: String,
    pub key: String,
    pub value: String,
}

impl DbCollectionIden for VariableRow {
    fn iden() -> StoreIden {
        StoreIden::Variables
    }
}
