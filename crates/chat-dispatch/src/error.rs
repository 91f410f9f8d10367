//! Dispatch and handler errors.

use attribute_store::AttributeError;
use std::time::Duration;
use thiserror::Error;

/// Reply sent when a handler fails without a message meant for users.
pub const GENERIC_FAILURE: &str = "Sorry, something went wrong.";

/// Route registration errors. Raised at startup only.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Route {name} duplicates {existing} (same pattern, priority and preconditions)")]
    DuplicateRoute { name: String, existing: String },

    #[error("Invalid pattern for route {name}: {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors a handler may return. Converted to a reply line by the dispatcher.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Bad input value; the message is shown to the user.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Query over an empty collection.
    #[error("{0}")]
    Empty(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A capture group did not hold the expected kind of value.
    #[error("Invalid {name}: {value:?}")]
    InvalidCapture { name: String, value: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Text for the invoking user, or `None` when only the generic failure
    /// line should be shown.
    pub fn user_message(&self) -> Option<String> {
        match self {
            HandlerError::Validation(msg)
            | HandlerError::NotFound(msg)
            | HandlerError::Empty(msg) => Some(msg.clone()),
            HandlerError::Timeout(_) => Some("Sorry, that took too long. Try again later.".into()),
            HandlerError::InvalidCapture { .. }
            | HandlerError::Storage(_)
            | HandlerError::Other(_) => None,
        }
    }
}

impl From<AttributeError> for HandlerError {
    fn from(e: AttributeError) -> Self {
        match e {
            AttributeError::Validation { reason, .. } => HandlerError::Validation(reason),
            AttributeError::UnknownAttribute(name) => {
                HandlerError::Other(anyhow::anyhow!("unknown attribute {name}"))
            }
            AttributeError::Storage(msg) => HandlerError::Storage(msg),
            AttributeError::Serialization(e) => HandlerError::Storage(e.to_string()),
        }
    }
}
