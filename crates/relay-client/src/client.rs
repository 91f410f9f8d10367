//! Relay HTTP client.

use crate::error::RelayError;
use crate::types::*;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Client for the line relay that fronts the chat network.
#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
    nick: String,
}

impl RelayClient {
    /// Create a new relay client for the bot nick `nick`.
    pub fn new(
        base_url: impl Into<String>,
        nick: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            nick: nick.into(),
        })
    }

    /// The nick the bot is connected as.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Check if the relay is reachable.
    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/v1/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Fetch pending lines.
    #[instrument(skip(self))]
    pub async fn receive(&self) -> Result<Vec<IncomingEvent>, RelayError> {
        let response = self
            .client
            .get(format!("{}/v1/receive", self.base_url))
            .query(&[("nick", self.nick.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let msg = response.text().await.unwrap_or_default();
            return Err(RelayError::Api(msg));
        }

        let events: Vec<IncomingEvent> = response.json().await?;
        debug!("Received {} lines", events.len());
        Ok(events)
    }

    /// Send a line to a channel or nick.
    #[instrument(skip(self, message))]
    pub async fn send(&self, target: &str, message: &str) -> Result<(), RelayError> {
        let request = SendRequest {
            target: target.to_string(),
            message: message.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/v1/send", self.base_url))
            .query(&[("nick", self.nick.as_str())])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let msg = response.text().await.unwrap_or_default();
            warn!("Send failed: {}", msg);
            return Err(RelayError::SendFailed(msg));
        }

        debug!("Sent line to {}", target);
        Ok(())
    }
}
