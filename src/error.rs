//! Error types for Chatflow.
//!
//! All errors in Chatflow are represented by the `ChatflowError` enum.
//! The variants follow the runtime's failure taxonomy: configuration errors are
//! fatal to session start, oracle and store failures are turn-scoped and
//! retryable, and token failures always surface as `NotFound`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Chatflow operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum ChatflowError {
    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Graph definition errors (empty graph, dangling edges, invalid payloads).
    #[error("{0}")]
    Graph(String),

    /// The oracle call itself failed or was rejected.
    #[error("oracle call failed: {0}")]
    Oracle(String),

    /// The oracle answered, but not with the documented JSON contract.
    #[error("oracle contract violation: {0}")]
    OracleContract(String),

    /// An oracle call exceeded its time bound (milliseconds).
    #[error("oracle call timed out after {0}ms")]
    Timeout(u64),

    /// Storage operation errors.
    #[error("{0}")]
    Store(String),

    /// Unknown entity or share token.
    #[error("{0} not found")]
    NotFound(String),

    /// Authoring operation attempted without an identity.
    #[error("unauthorized")]
    Unauthorized,

    /// Invalid caller input.
    #[error("{0}")]
    Validation(String),

    /// Operation not valid in the session's current state.
    #[error("{0}")]
    Session(String),

    /// Data conversion errors (JSON, TOML).
    #[error("{0}")]
    Convert(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

/// Coarse error classification for visitor-facing layers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    OracleContract,
    Oracle,
    Persistence,
    Unauthorized,
    NotFound,
    InvalidInput,
    Internal,
}

impl ChatflowError {
    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatflowError::Config(_) | ChatflowError::Graph(_) => ErrorKind::Configuration,
            ChatflowError::OracleContract(_) => ErrorKind::OracleContract,
            ChatflowError::Oracle(_) | ChatflowError::Timeout(_) => ErrorKind::Oracle,
            ChatflowError::Store(_) => ErrorKind::Persistence,
            ChatflowError::Unauthorized => ErrorKind::Unauthorized,
            ChatflowError::NotFound(_) => ErrorKind::NotFound,
            ChatflowError::Validation(_) | ChatflowError::Session(_) => ErrorKind::InvalidInput,
            ChatflowError::Convert(_) | ChatflowError::IoError(_) => ErrorKind::Internal,
        }
    }

    /// Whether the visitor may simply retry the same action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatflowError::Oracle(_) | ChatflowError::OracleContract(_) | ChatflowError::Timeout(_) | ChatflowError::Store(_)
        )
    }
}

impl From<std::io::Error> for ChatflowError {
    fn from(error: std::io::Error) -> Self {
        ChatflowError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for ChatflowError {
    fn from(error: serde_json::Error) -> Self {
        ChatflowError::Convert(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for ChatflowError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        ChatflowError::Graph(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(ChatflowError::Graph("empty".into()).kind(), ErrorKind::Configuration);
        assert_eq!(ChatflowError::OracleContract("bad json".into()).kind(), ErrorKind::OracleContract);
        assert_eq!(ChatflowError::Timeout(10).kind(), ErrorKind::Oracle);
        assert_eq!(ChatflowError::Store("down".into()).kind(), ErrorKind::Persistence);
        assert_eq!(ChatflowError::NotFound("token".into()).kind(), ErrorKind::NotFound);
        assert_eq!(ErrorKind::OracleContract.as_ref(), "oracle_contract");
    }

    #[test]
    fn test_retryable() {
        assert!(ChatflowError::OracleContract("x".into()).is_retryable());
        assert!(ChatflowError::Store("x".into()).is_retryable());
        assert!(!ChatflowError::Unauthorized.is_retryable());
        assert!(!ChatflowError::Graph("x".into()).is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(ChatflowError::NotFound("public link".into()).to_string(), "public link not found");
    }
}
