//! Common test utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use attribute_store::AttributeStore;
use chat_bot::commands::{self, QueryBackend, QueryError, QuoteModule, TimeRequests};
use chat_bot::Config;
use chat_dispatch::{Dispatch, Dispatcher, Envelope, Privilege};
use quote_ledger::QuoteLedger;
use std::collections::HashMap;
use std::sync::Arc;

/// Answers every question with the same text.
pub struct FixedBackend(pub &'static str);

#[async_trait]
impl QueryBackend for FixedBackend {
    async fn query(&self, _question: &str) -> Result<Option<String>, QueryError> {
        Ok(Some(self.0.to_string()))
    }
}

/// Configuration used by the tests: defaults plus one admin.
pub fn test_config() -> Config {
    let mut vars = HashMap::new();
    vars.insert("BOT__ADMINS".to_string(), "root".to_string());
    Config::from_vars(vars).unwrap()
}

/// A fully wired dispatcher over in-memory storage.
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub store: Arc<AttributeStore>,
    pub quotes: Arc<QuoteModule>,
    pub time_requests: Arc<TimeRequests>,
    pub config: Config,
}

impl Harness {
    pub async fn new() -> Self {
        let config = test_config();
        let store = AttributeStore::in_memory(commands::attribute_specs(&config).unwrap());
        Self::with_store(config, store).await
    }

    pub async fn with_store(config: Config, store: Arc<AttributeStore>) -> Self {
        let ledger = QuoteLedger::open(":memory:").await.unwrap();
        let quotes = Arc::new(QuoteModule::new(
            ledger,
            &config.bot.command_prefix,
            &config.bot.nick,
        ));
        let time_requests = Arc::new(TimeRequests::default());

        let mut dispatcher = Dispatcher::new(store.clone());
        commands::register_all(
            &mut dispatcher,
            &config,
            quotes.clone(),
            time_requests.clone(),
            Arc::new(FixedBackend("42")),
        )
        .unwrap();

        Self {
            dispatcher,
            store,
            quotes,
            time_requests,
            config,
        }
    }

    pub async fn dispatch(&self, envelope: &Envelope, text: &str) -> Dispatch {
        self.dispatcher.dispatch(text, envelope).await
    }

    /// Reply texts for a channel line.
    pub async fn say(&self, nick: &str, channel: &str, text: &str) -> Vec<String> {
        texts(self.dispatch(&Envelope::channel(nick, channel), text).await)
    }

    /// Reply texts for a channel line from an operator.
    pub async fn say_as_op(&self, nick: &str, channel: &str, text: &str) -> Vec<String> {
        let envelope = Envelope::channel(nick, channel).with_privilege(Privilege::Operator);
        texts(self.dispatch(&envelope, text).await)
    }

    /// Reply texts for a private line.
    pub async fn pm(&self, nick: &str, text: &str) -> Vec<String> {
        texts(self.dispatch(&Envelope::private(nick), text).await)
    }
}

pub fn texts(result: Dispatch) -> Vec<String> {
    result
        .reply()
        .map(|r| r.texts().into_iter().map(String::from).collect())
        .unwrap_or_default()
}
