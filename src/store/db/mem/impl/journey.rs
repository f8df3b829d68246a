use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::JourneyRow, db::mem::DbDocument},
};

impl DbDocument for JourneyRow {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id.clone()));
        map.insert("version_id".to_string(), json!(self.version_id.clone()));
        map.insert("email".to_string(), json!(self.email.clone()));
        map.insert("created_at".to_string(), json!(self.created_at));
        Ok(map)
    }
}
