use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::NodeRow, db::mem::DbDocument},
};

impl DbDocument for NodeRow {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id.clone()));
        map.insert("version_id".to_string(), json!(self.version_id.clone()));
        map.insert("node_key".to_string(), json!(self.node_key.clone()));
        map.insert("title".to_string(), json!(self.title.clone()));
        map.insert("category".to_string(), json!(self.category.clone()));
        map.insert("data".to_string(), json!(self.data.clone()));
        map.insert("seq".to_string(), json!(self.seq));
        Ok(map)
    }

    fn unique_keys(&self) -> Vec<String> {
        vec![format!("{}:{}", self.version_id, self.node_key)]
    }
}
