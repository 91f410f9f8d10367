//! Durable quote collection.
//!
//! Quotes are appended with a store-assigned id and can only be removed as a
//! whole. Backed by SQLite.

mod error;
mod ledger;
mod types;

pub use error::LedgerError;
pub use ledger::QuoteLedger;
pub use types::*;
