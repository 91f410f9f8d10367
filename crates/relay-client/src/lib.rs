//! HTTP client for the chat line relay.

mod client;
mod error;
mod receiver;
mod types;

pub use client::RelayClient;
pub use error::RelayError;
pub use receiver::LineReceiver;
pub use types::*;
