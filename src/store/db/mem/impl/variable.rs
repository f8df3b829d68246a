use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::VariableRow, db::mem::DbDocument},
};

impl DbDocument for VariableRow {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id.clone()));
        map.insert("project_id".to_string(), json!(self.project_id.clone()));
        map.insert("key".to_string(), json!(self.key.clone()));
        map.insert("value".to_string(), json!(self.value.clone()));
        Ok(map)
    }

    fn unique_keys(&self) -> Vec<String> {
        vec![format!("{}:{}", self.project_id, self.key)]
    }
}
