//! Line receiver with polling.

use crate::client::RelayClient;
use crate::types::*;
use std::time::Duration;
use tokio::time::sleep;
use tokio_stream::Stream;
use tracing::{debug, error};

/// Delay before polling again after a failed receive.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Polls the relay and yields incoming lines.
pub struct LineReceiver {
    client: RelayClient,
    poll_interval: Duration,
}

impl LineReceiver {
    pub fn new(client: RelayClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Start receiving lines as an async stream. Lines sent by the bot
    /// itself are skipped.
    pub fn stream(self) -> impl Stream<Item = ChatLine> {
        async_stream::stream! {
            loop {
                match self.client.receive().await {
                    Ok(events) => {
                        for event in events {
                            if event.sender.eq_ignore_ascii_case(self.client.nick()) {
                                continue;
                            }
                            if let Some(line) = ChatLine::from_incoming(&event) {
                                debug!(
                                    "Received: {} from {}",
                                    line.text.chars().take(50).collect::<String>(),
                                    line.sender
                                );
                                yield line;
                            }
                        }
                    }
                    Err(e) => {
                        error!("Receive error: {}", e);
                        sleep(ERROR_BACKOFF).await;
                        continue;
                    }
                }

                sleep(self.poll_interval).await;
            }
        }
    }
}
