use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::VersionRow, db::mem::DbDocument},
};

impl DbDocument for VersionRow {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id.clone()));
        map.insert("graph_id".to_string(), json!(self.graph_id.clone()));
        map.insert("version_number".to_string(), json!(self.version_number));
        map.insert("status".to_string(), json!(self.status.as_ref()));
        map.insert("public_token".to_string(), json!(self.public_token.clone()));
        map.insert("visit_count".to_string(), json!(self.visit_count));
        map.insert("created_at".to_string(), json!(self.created_at));
        Ok(map)
    }

    fn unique_keys(&self) -> Vec<String> {
        let mut keys = vec![format!("version:{}:{}", self.graph_id, self.version_number)];
        if let Some(token) = &self.public_token {
            keys.push(format!("token:{}", token));
        }
        keys
    }
}
