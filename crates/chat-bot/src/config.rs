//! Application configuration loaded from environment variables.

use anyhow::{bail, Context, Result};
use attribute_store::{validators, Identifier};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Bot identity and worker settings
    #[serde(default)]
    pub bot: BotConfig,

    /// Line relay configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Clock defaults
    #[serde(default)]
    pub clock: ClockConfig,

    /// Attribute store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Quote database configuration
    #[serde(default)]
    pub quote: QuoteConfig,

    /// Query backend configuration
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Nick the bot answers to
    #[serde(default = "default_nick")]
    pub nick: String,

    /// Prefix for commands, e.g. "." for ".time"
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Lines handled at the same time
    #[serde(default = "default_max_concurrent_lines")]
    pub max_concurrent_lines: usize,

    /// Comma-separated admin nicks
    #[serde(default)]
    pub admins: String,

    /// How long import sessions and time requests stay open
    #[serde(default = "default_session_ttl", with = "humantime_serde")]
    pub session_ttl: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Relay HTTP endpoint
    #[serde(default = "default_relay_service")]
    pub service_url: String,

    /// Poll interval for incoming lines
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Request timeout
    #[serde(default = "default_relay_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClockConfig {
    /// Zone used when neither the user nor the channel set one
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// strftime format used when neither the user nor the channel set one
    #[serde(default = "default_time_format")]
    pub default_time_format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// JSON file holding user and channel attributes
    #[serde(default = "default_attributes_path")]
    pub attributes_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
    /// SQLite database file
    #[serde(default = "default_quote_filename")]
    pub filename: String,

    /// Recent lines of a nick are forgotten after this long without a new one
    #[serde(default = "default_recent_line_ttl", with = "humantime_serde")]
    pub recent_line_ttl: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Plain-text answer endpoint
    #[serde(default = "default_query_url")]
    pub base_url: String,

    /// Application id sent with each query
    #[serde(default)]
    pub app_id: Option<SecretString>,

    /// Query timeout
    #[serde(default = "default_query_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Answers are cut to this many characters
    #[serde(default = "default_max_reply_len")]
    pub max_reply_len: usize,
}

// Default implementations
impl Default for BotConfig {
    fn default() -> Self {
        Self {
            nick: default_nick(),
            command_prefix: default_command_prefix(),
            log_level: default_log_level(),
            max_concurrent_lines: default_max_concurrent_lines(),
            admins: String::new(),
            session_ttl: default_session_ttl(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            service_url: default_relay_service(),
            poll_interval: default_poll_interval(),
            timeout: default_relay_timeout(),
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            default_time_format: default_time_format(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            attributes_path: default_attributes_path(),
        }
    }
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            filename: default_quote_filename(),
            recent_line_ttl: default_recent_line_ttl(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            base_url: default_query_url(),
            app_id: None,
            timeout: default_query_timeout(),
            max_reply_len: default_max_reply_len(),
        }
    }
}

// Default value functions
fn default_nick() -> String {
    "quotebot".into()
}

fn default_command_prefix() -> String {
    ".".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_max_concurrent_lines() -> usize {
    16
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_relay_service() -> String {
    "http://chat-relay:8080".into()
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(200)
}

fn default_relay_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_timezone() -> String {
    "UTC".into()
}

fn default_time_format() -> String {
    "%Y-%m-%d - %T%Z".into()
}

fn default_attributes_path() -> PathBuf {
    PathBuf::from("attributes.json")
}

fn default_quote_filename() -> String {
    "quotes.db".into()
}

fn default_recent_line_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_query_url() -> String {
    "https://api.wolframalpha.com/v1/result".into()
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_reply_len() -> usize {
    450
}

impl BotConfig {
    /// Configured admins as nick identities.
    pub fn admin_list(&self) -> Vec<Identifier> {
        self.admins
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(Identifier::new)
            .collect()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::build(config::Environment::default())
    }

    /// Load configuration from an explicit set of variables instead of the
    /// process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::build(config::Environment::default().source(Some(vars)))
    }

    fn build(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                environment
                    .separator("__")
                    // Keep strings as strings; formats like "%H" must not be coerced.
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        validators::timezone(&self.clock.default_timezone).map_err(|reason| {
            anyhow::anyhow!(
                "CLOCK__DEFAULT_TIMEZONE {:?} is invalid: {}",
                self.clock.default_timezone,
                reason
            )
        })?;

        validators::time_format(&self.clock.default_time_format).map_err(|reason| {
            anyhow::anyhow!(
                "CLOCK__DEFAULT_TIME_FORMAT {:?} is invalid: {}",
                self.clock.default_time_format,
                reason
            )
        })?;

        if self.bot.command_prefix.is_empty() || self.bot.command_prefix.contains(char::is_whitespace) {
            bail!("BOT__COMMAND_PREFIX must be non-empty and contain no whitespace");
        }

        if self.bot.nick.trim().is_empty() {
            bail!("BOT__NICK must not be empty");
        }

        if self.bot.session_ttl.is_zero() {
            bail!("BOT__SESSION_TTL must be longer than zero");
        }

        if self.bot.max_concurrent_lines == 0 {
            bail!("BOT__MAX_CONCURRENT_LINES must be at least 1");
        }

        Ok(())
    }
}
