use serde::{Deserialize, Serialize};

use crate::store::{DbCollectionIden, StoreIden};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VersionStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct VersionRow {
    pub id: String,
    pub graph_id: String,
    pub version_number: i32,
    pub status: VersionStatus,
    pub public_token: Option<String>,
    pub visit_count: i64,
    pub created_at: i64,
}

impl VersionRow {
    pub fn is_published(&self) -> bool {
        self.status == VersionStatus::Published
    }
}

impl DbCollectionIden for VersionRow {
    fn iden() -> StoreIden {
        StoreIden::Versions
    }
}
