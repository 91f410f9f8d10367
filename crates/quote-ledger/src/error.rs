//! Quote ledger errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Quote not found: {0}")]
    NotFound(i64),

    /// The (filtered) ledger has no quotes.
    #[error("No matching quotes")]
    Empty,

    /// An imported record failed validation.
    #[error("Invalid quote record: {0}")]
    Invalid(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}
