//! Outgoing line delivery.

use async_trait::async_trait;
use chat_dispatch::Reply;
use relay_client::{RelayClient, RelayError};
use tracing::error;

/// Something that can put a line on the chat network.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, target: &str, text: &str) -> Result<(), RelayError>;
}

#[async_trait]
impl Transport for RelayClient {
    async fn send(&self, target: &str, text: &str) -> Result<(), RelayError> {
        RelayClient::send(self, target, text).await
    }
}

/// Send every line of `reply`, in order. Unaddressed lines go to
/// `default_target`. Returns the number of lines sent.
///
/// A failed line is logged and does not stop the rest.
pub async fn deliver(transport: &dyn Transport, reply: &Reply, default_target: &str) -> usize {
    let mut sent = 0;
    for (target, text) in reply.addressed(default_target) {
        match transport.send(target, text).await {
            Ok(()) => sent += 1,
            Err(e) => error!(target = %target, "Failed to send reply: {}", e),
        }
    }
    sent
}
