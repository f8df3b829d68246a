use serde::{Deserialize, Serialize};

use crate::{
    Result,
    model::JourneySummary,
    store::{DbCollectionIden, StoreIden},
};

/// A persisted journey. `summary` holds the [`JourneySummary`] as JSON.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct JourneyRow {
    pub id: String,
    pub version_id: String,
    pub email: String,
    pub summary: String,
    pub created_at: i64,
}

impl JourneyRow {
    pub fn summary(&self) -> Result<JourneySummary> {
        Ok(serde_json::from_str(&self.summary)?)
    }
}

impl DbCollectionIden for JourneyRow {
    fn iden() -> StoreIden {
        StoreIden::Journeys
    }
}
