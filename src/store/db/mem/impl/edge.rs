use std::collections::HashMap;

use serde_json::{Value as JsonValue, json};

use crate::{
    Result,
    store::{data::EdgeRow, db::mem::DbDocument},
};

impl DbDocument for EdgeRow {
    fn id(&self) -> &str {
        &self.id
    }

    fn doc(&self) -> Result<HashMap<String, JsonValue>> {
        let mut map = HashMap::new();
        map.insert("id".to_string(), json!(self.id.clone()));
        map.insert("version_id".to_string(), json!(self.version_id.clone()));
        map.insert("edge_key".to_string(), json!(self.edge_key.clone()));
        map.insert("from_node_key".to_string(), json!(self.from_node_key.clone()));
        map.insert("to_node_key".to_string(), json!(self.to_node_key.clone()));
        map.insert("llm_prompt_template".to_string(), json!(self.llm_prompt_template.clone()));
        map.insert("priority".to_string(), json!(self.priority));
        map.insert("fallback".to_string(), json!(self.fallback));
        map.insert("seq".to_string(), json!(self.seq));
        Ok(map)
    }

    fn unique_keys(&self) -> Vec<String> {
        vec![format!("{}:{}", self.version_id, self.edge_key)]
    }
}
