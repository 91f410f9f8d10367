//! Application error types.

use thiserror::Error;

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Relay error: {0}")]
    Relay(#[from] relay_client::RelayError),

    #[error("Route error: {0}")]
    Dispatch(#[from] chat_dispatch::DispatchError),

    #[error("Attribute store error: {0}")]
    Attributes(#[from] attribute_store::AttributeError),

    #[error("Quote ledger error: {0}")]
    Ledger(#[from] quote_ledger::LedgerError),
}

/// Result type alias for application errors.
pub type AppResult<T> = Result<T, AppError>;
