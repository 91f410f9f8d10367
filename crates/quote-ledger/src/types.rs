//! Quote records.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest accepted quote or source line.
pub const MAX_QUOTE_LEN: usize = 512;

/// Longest accepted nick or channel name.
pub const MAX_NAME_LEN: usize = 64;

/// A stored quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: i64,
    pub user: String,
    pub channel: String,
    pub quote_text: String,
    /// The original line the quote was matched against.
    pub source_text: String,
    pub submitter: String,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub(crate) fn from_row(row: QuoteRow) -> Self {
        let (id, user, channel, quote_text, source_text, submitter, timestamp) = row;
        Self {
            id,
            user,
            channel,
            quote_text,
            source_text,
            submitter,
            timestamp: Utc
                .timestamp_opt(timestamp, 0)
                .single()
                .unwrap_or_default(),
        }
    }

    /// The record without its id, as exported to another bot.
    pub fn to_new(&self) -> NewQuote {
        NewQuote {
            user: self.user.clone(),
            channel: self.channel.clone(),
            quote_text: self.quote_text.clone(),
            source_text: self.source_text.clone(),
            submitter: self.submitter.clone(),
            timestamp: self.timestamp,
        }
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id, self.quote_text)
    }
}

pub(crate) type QuoteRow = (i64, String, String, String, String, String, i64);

/// A quote that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewQuote {
    pub user: String,
    pub channel: String,
    pub quote_text: String,
    pub source_text: String,
    pub submitter: String,
    pub timestamp: DateTime<Utc>,
}

impl NewQuote {
    /// Check a record received from outside, e.g. another bot's export.
    pub fn validate(&self) -> Result<(), String> {
        check_name("user", &self.user)?;
        check_name("channel", &self.channel)?;
        check_name("submitter", &self.submitter)?;
        check_line("quote", &self.quote_text)?;
        check_line("source", &self.source_text)?;
        if self.timestamp > Utc::now() + chrono::Duration::days(1) {
            return Err("timestamp is in the future".into());
        }
        Ok(())
    }
}

fn check_name(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} is empty"));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(format!("{field} is too long"));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("{field} contains whitespace or control characters"));
    }
    Ok(())
}

fn check_line(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} is empty"));
    }
    if value.len() > MAX_QUOTE_LEN {
        return Err(format!("{field} is too long"));
    }
    // \x01 marks ACTION lines and is the only control character allowed.
    if value.chars().any(|c| c.is_control() && c != '\x01') {
        return Err(format!("{field} contains control characters"));
    }
    Ok(())
}

/// Which quotes a query considers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteFilter {
    All,
    ByUser(String),
}

impl QuoteFilter {
    pub fn user(user: Option<&str>) -> Self {
        match user {
            Some(user) => QuoteFilter::ByUser(user.to_string()),
            None => QuoteFilter::All,
        }
    }
}
