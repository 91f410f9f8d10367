//! Bot command modules and route registration.

pub mod clock;
pub mod guess_tz;
pub mod help;
pub mod query;
pub mod quote;
pub mod recent_lines;

pub use clock::{ClockAction, ClockHandler};
pub use guess_tz::{GuessAction, GuessTzHandler, TimeRequests};
pub use help::HelpHandler;
pub use query::{HttpQueryBackend, QueryBackend, QueryError, QueryHandler};
pub use quote::{QuoteAction, QuoteHandler, QuoteModule};

use crate::config::Config;
use attribute_store::{validators, AttributeSpec, TIMEZONE, TIME_FORMAT};
use chat_dispatch::{DispatchError, Dispatcher};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Attributes the command modules store, with the configured defaults.
pub fn attribute_specs(config: &Config) -> Result<Vec<AttributeSpec>, String> {
    Ok(vec![
        AttributeSpec::new(TIMEZONE, validators::timezone)
            .with_default(&config.clock.default_timezone)?,
        AttributeSpec::new(TIME_FORMAT, validators::time_format)
            .with_default(&config.clock.default_time_format)?,
    ])
}

/// Register every command module on `dispatcher`.
///
/// Help goes first so its low-priority routes win over the quote line
/// collector, which must be the last low-priority route.
pub fn register_all(
    dispatcher: &mut Dispatcher,
    config: &Config,
    quotes: Arc<QuoteModule>,
    time_requests: Arc<TimeRequests>,
    backend: Arc<dyn QueryBackend>,
) -> Result<(), DispatchError> {
    let prefix = config.bot.command_prefix.as_str();
    let catalog = dispatcher.catalog();

    dispatcher.register_all(help::routes(prefix, &config.bot.nick, catalog)?)?;
    dispatcher.register_all(clock::routes(prefix)?)?;
    dispatcher.register_all(guess_tz::routes(prefix, time_requests)?)?;
    dispatcher.register_all(query::routes(
        prefix,
        backend,
        config.query.timeout,
        config.query.max_reply_len,
    )?)?;
    dispatcher.register_all(quote::routes(quotes)?)?;

    info!("Registered {} routes", dispatcher.route_names().len());
    Ok(())
}

/// Whether something opened at `since` is older than `ttl` at `now`.
pub(crate) fn is_expired(since: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    (now - since).to_std().is_ok_and(|age| age > ttl)
}
