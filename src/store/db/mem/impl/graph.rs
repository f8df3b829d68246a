use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::GraphRow, db::mem::DbDocument},
};

impl DbDocument for GraphRow {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id.clone()));
        map.insert("project_id".to_string(), json!(self.project_id.clone()));
        map.insert("name".to_string(), json!(self.name.clone()));
        map.insert("created_at".to_string(), json!(self.created_at));
        Ok(map)
    }

    fn unique_keys(&self) -> Vec<String> {
        vec![format!("project:{}", self.project_id)]
    }
}
