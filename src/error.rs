//! Error types for idserver
//!
//! Provides a unified error type for all operations, plus the mapping onto
//! the error codes clients see on the wire.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using IdError
pub type Result<T> = std::result::Result<T, IdError>;

/// Unified error type for idserver operations
#[derive(Debug, Error)]
pub enum IdError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Request Validation Errors
    // -------------------------------------------------------------------------
    #[error("Invalid message ID")]
    InvalidMid,

    #[error("Invalid key")]
    InvalidKey,

    #[error("Not present or invalid number of required id's")]
    InvalidCount,

    #[error("Unknown command")]
    UnknownCommand(Option<String>),

    #[error("Answer to an unknown command")]
    UnknownAnswer(Option<String>),

    // -------------------------------------------------------------------------
    // Allocation Errors
    // -------------------------------------------------------------------------
    #[error("Error getting value for key '{key}'.")]
    Get { key: String, details: String },

    #[error("Error writing to the journal file")]
    JournalWrite(String),

    #[error("Unable to generate more id's for {0}")]
    Exhausted(String),

    // -------------------------------------------------------------------------
    // Journal / Snapshot Errors
    // -------------------------------------------------------------------------
    #[error("Journal corruption detected: {0}")]
    JournalCorruption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote error {}: {}", .0.code, .0.description)]
    Remote(ErrorBody),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IdError {
    /// Wire-level error code for this error
    pub fn code(&self) -> &str {
        match self {
            IdError::InvalidMid => "EINVMID",
            IdError::InvalidKey => "EINVKEY",
            IdError::InvalidCount => "ENONUM",
            IdError::UnknownCommand(_) => "EUNKNCMD",
            IdError::UnknownAnswer(_) => "EUNKNANS",
            IdError::Get { .. } => "EGET",
            IdError::JournalWrite(_) => "EJOUWR",
            IdError::Exhausted(_) => "EUNGENIDS",
            IdError::Remote(body) => &body.code,
            _ => "EINTERNAL",
        }
    }

    /// Render this error as the `error` object sent to clients
    pub fn to_body(&self) -> ErrorBody {
        let (command, details) = match self {
            IdError::UnknownCommand(command) | IdError::UnknownAnswer(command) => {
                (command.clone(), None)
            }
            IdError::Get { details, .. } => (None, Some(details.clone())),
            IdError::JournalWrite(details) => (None, Some(details.clone())),
            IdError::Remote(body) => return body.clone(),
            _ => (None, None),
        };

        ErrorBody {
            code: self.code().to_string(),
            description: self.to_string(),
            command,
            details,
        }
    }
}

/// The `error` object carried by protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub description: String,

    /// Offending command name, for unknown command/answer errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
