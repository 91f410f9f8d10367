//! Per-line processing: envelope construction, dispatch and delivery.

use crate::transport::{deliver, Transport};
use attribute_store::Identifier;
use chat_dispatch::{Dispatch, Dispatcher, Envelope, Privilege};
use relay_client::{ChatLine, SenderPrivilege};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, instrument};

/// Glue between the relay and the dispatcher.
pub struct Bot {
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn Transport>,
    admins: Vec<Identifier>,
}

impl Bot {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        transport: Arc<dyn Transport>,
        admins: Vec<Identifier>,
    ) -> Self {
        Self {
            dispatcher,
            transport,
            admins,
        }
    }

    /// Envelope for a relay line. Configured admins are admins everywhere.
    pub fn envelope_for(&self, line: &ChatLine) -> Envelope {
        let relayed = match line.privilege {
            SenderPrivilege::None | SenderPrivilege::Voice => Privilege::None,
            SenderPrivilege::Operator => Privilege::Operator,
            SenderPrivilege::Admin => Privilege::Admin,
        };

        let sender = Identifier::new(line.sender.as_str());
        let privilege = if self.admins.contains(&sender) {
            Privilege::Admin
        } else {
            relayed
        };

        let envelope = match &line.channel {
            Some(channel) => Envelope::channel(&line.sender, channel),
            None => Envelope::private(&line.sender),
        };
        envelope
            .with_privilege(privilege)
            .with_received_at(line.received_at)
    }

    /// Dispatch one line and send the reply. Returns the number of lines sent.
    #[instrument(skip(self, line), fields(sender = %line.sender, target = %line.reply_target()))]
    pub async fn handle_line(&self, line: &ChatLine) -> usize {
        let envelope = self.envelope_for(line);

        match self.dispatcher.dispatch(&line.text, &envelope).await {
            Dispatch::NoMatch => 0,
            Dispatch::Handled { route, reply } => {
                debug!(route = %route, lines = reply.lines().len(), "Handled line");
                deliver(self.transport.as_ref(), &reply, line.reply_target()).await
            }
        }
    }

    /// Hand lines to worker tasks, as many at once as `permits` allows,
    /// until the lines run out or `shutdown` completes. Shutdown is noticed
    /// while every worker is busy. Returns the number of lines taken.
    pub async fn serve<S, F>(self: Arc<Self>, lines: S, permits: Arc<Semaphore>, shutdown: F) -> usize
    where
        S: Stream<Item = ChatLine>,
        F: Future<Output = ()>,
    {
        tokio::pin!(lines);
        tokio::pin!(shutdown);
        let mut taken = 0;

        loop {
            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = &mut shutdown => break,
            };

            let line = tokio::select! {
                line = lines.next() => match line {
                    Some(line) => line,
                    None => break,
                },
                _ = &mut shutdown => break,
            };

            taken += 1;
            let bot = self.clone();
            tokio::spawn(async move {
                bot.handle_line(&line).await;
                drop(permit);
            });
        }

        taken
    }
}
