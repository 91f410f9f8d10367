//! Relay API types.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Privilege the relay reports for the sender in the line's channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderPrivilege {
    #[default]
    None,
    Voice,
    Operator,
    Admin,
}

/// Line as delivered by the relay.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingEvent {
    pub sender: String,
    /// Channel name, or the bot's own nick for private messages.
    pub target: String,
    pub text: String,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub privilege: SenderPrivilege,
}

/// Outgoing line request.
#[derive(Debug, Clone, Serialize)]
pub struct SendRequest {
    pub target: String,
    pub message: String,
}

/// Parsed line for bot processing.
#[derive(Debug, Clone)]
pub struct ChatLine {
    /// Nick that sent the line.
    pub sender: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
    /// Channel the line was sent to, `None` for private messages.
    pub channel: Option<String>,
    pub privilege: SenderPrivilege,
}

impl ChatLine {
    /// Build a line from a relay event. Events without text are dropped.
    pub fn from_incoming(event: &IncomingEvent) -> Option<Self> {
        if event.text.is_empty() {
            return None;
        }

        let channel = is_channel_name(&event.target).then(|| event.target.clone());
        let received_at = Utc
            .timestamp_millis_opt(event.timestamp)
            .single()
            .unwrap_or_else(Utc::now);

        Some(Self {
            sender: event.sender.clone(),
            text: event.text.clone(),
            received_at,
            channel,
            privilege: event.privilege,
        })
    }

    pub fn is_private(&self) -> bool {
        self.channel.is_none()
    }

    /// Where replies go: the channel, or the sender for private lines.
    pub fn reply_target(&self) -> &str {
        self.channel.as_deref().unwrap_or(&self.sender)
    }
}

/// Whether `name` names a channel rather than a nick.
pub fn is_channel_name(name: &str) -> bool {
    name.starts_with(['#', '&', '+', '!'])
}
