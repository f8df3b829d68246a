use serde::de::DeserializeOwned;

use crate::{ChatflowError, Result};

/// Parse the JSON object embedded in free oracle text.
///
/// Takes everything from the first `{` to the last `}`, so preambles and trailing
/// chatter around the object are tolerated. Anything else is a contract violation.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(ChatflowError::OracleContract("no JSON object in oracle response".to_string()));
    };
    if end < start {
        return Err(ChatflowError::OracleContract("no JSON object in oracle response".to_string()));
    }

    serde_json::from_str::<T>(&text[start..=end]).map_err(|e| ChatflowError::OracleContract(format!("malformed oracle response: {}", e)))
}
