//! Attribute storage errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttributeError {
    /// The raw value did not pass the attribute's parser. Nothing was written.
    #[error("Invalid value {value:?} for {attribute}: {reason}")]
    Validation {
        attribute: String,
        value: String,
        reason: String,
    },

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for AttributeError {
    fn from(e: std::io::Error) -> Self {
        AttributeError::Storage(e.to_string())
    }
}
