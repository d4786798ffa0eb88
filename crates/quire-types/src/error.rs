use thiserror::Error;

/// Errors produced by type conversions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("expected a JSON object for a record, got {0}")]
    NotAnObject(String),

    #[error("value cannot be used as an entry id: {0}")]
    InvalidId(String),
}
