//! Scoped, validated attribute storage.
//!
//! Values are keyed by `(scope, entity, attribute)` where scope is a user or
//! a channel. Every attribute has a parser that rejects invalid input at
//! write time, so anything read back is known to be valid.

mod error;
mod store;
mod types;
pub mod validators;

pub use error::AttributeError;
pub use store::AttributeStore;
pub use types::*;

/// Attribute holding an IANA timezone name.
pub const TIMEZONE: &str = "timezone";

/// Attribute holding a strftime-style format string.
pub const TIME_FORMAT: &str = "time_format";
