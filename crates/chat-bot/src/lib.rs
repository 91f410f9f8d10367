//! Chat bot with clock, help, quote and query commands.

pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod transport;

pub use bot::Bot;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use transport::{deliver, Transport};
