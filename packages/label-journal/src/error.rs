//! Error types for the label journal

use thiserror::Error;

pub type Result<T> = std::result::Result<T, JournalError>;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Example not labeled: {0}")]
    KeyNotFound(String),

    #[error("Reserved no-selection id '{0}' collides with a class id")]
    DuplicateReservedId(String),

    #[error("Invalid class id: {0:?}")]
    InvalidClassId(String),

    #[error("Unknown class id: {0}")]
    UnknownClass(String),

    #[error("Label for '{0}' serialized to the empty string (reserved for deletion)")]
    EmptyLabel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Tunnel closed")]
    TunnelClosed,

    #[error("Journal closed after a failed reopen; open the store again")]
    JournalClosed,
}

impl JournalError {
    /// Stable error code, used by the CLI exit report and tunnel replies
    pub fn code(&self) -> &'static str {
        match self {
            JournalError::MalformedRecord { .. } => "MALFORMED_RECORD",
            JournalError::KeyNotFound(_) => "KEY_NOT_FOUND",
            JournalError::DuplicateReservedId(_) => "DUPLICATE_RESERVED_ID",
            JournalError::InvalidClassId(_) => "INVALID_CLASS_ID",
            JournalError::UnknownClass(_) => "UNKNOWN_CLASS",
            JournalError::EmptyLabel(_) => "EMPTY_LABEL",
            JournalError::InvalidConfig(_) => "INVALID_CONFIG",
            JournalError::TunnelClosed => "TUNNEL_CLOSED",
            JournalError::JournalClosed => "JOURNAL_CLOSED",
            _ => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        JournalError::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }
}
