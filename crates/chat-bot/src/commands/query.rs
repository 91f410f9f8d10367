//! Third-party question answering.

use async_trait::async_trait;
use attribute_store::AttributeStore;
use chat_dispatch::{
    command_pattern, CommandDoc, DispatchError, Handler, HandlerError, InvocationContext, Reply,
    Route,
};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

const GROUP: &str = "query";

const CANNOT_ANSWER: &str = "I'm sorry, I'm afraid I can't do that.";

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Answers free-text questions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// `Ok(None)` means the backend understood the request but has no answer.
    async fn query(&self, question: &str) -> Result<Option<String>, QueryError>;
}

/// Backend for plain-text answer APIs taking `appid` and `i` query parameters.
pub struct HttpQueryBackend {
    client: Client,
    base_url: String,
    app_id: Option<SecretString>,
}

impl HttpQueryBackend {
    pub fn new(
        base_url: impl Into<String>,
        app_id: Option<SecretString>,
    ) -> Result<Self, QueryError> {
        // The handler enforces its own timeout; this one only bounds stuck sockets.
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            app_id,
        })
    }
}

#[async_trait]
impl QueryBackend for HttpQueryBackend {
    #[instrument(skip(self))]
    async fn query(&self, question: &str) -> Result<Option<String>, QueryError> {
        let mut request = self.client.get(&self.base_url).query(&[("i", question)]);
        if let Some(app_id) = &self.app_id {
            request = request.query(&[("appid", app_id.expose_secret().as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();

        // No short answer for this input.
        if status == StatusCode::NOT_IMPLEMENTED {
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        debug!("Answer is {} bytes", text.len());
        Ok(Some(text).filter(|t| !t.trim().is_empty()))
    }
}

pub struct QueryHandler {
    backend: Arc<dyn QueryBackend>,
    timeout: Duration,
    max_len: usize,
}

impl QueryHandler {
    pub fn new(backend: Arc<dyn QueryBackend>, timeout: Duration, max_len: usize) -> Self {
        Self {
            backend,
            timeout,
            max_len,
        }
    }
}

#[async_trait]
impl Handler for QueryHandler {
    async fn handle(
        &self,
        ctx: &InvocationContext,
        _store: &AttributeStore,
    ) -> Result<Reply, HandlerError> {
        let question = ctx
            .capture("args")
            .ok_or_else(|| HandlerError::Validation("No question received.".into()))?;

        let answer = match timeout(self.timeout, self.backend.query(question)).await {
            Err(_) => return Err(HandlerError::Timeout(self.timeout)),
            Ok(Err(e)) => {
                warn!(question = %question, "Query failed: {}", e);
                None
            }
            Ok(Ok(answer)) => answer,
        };

        let Some(answer) = answer else {
            return Ok(Reply::say(CANNOT_ANSWER));
        };

        let truncated: String = answer.chars().take(self.max_len).collect();
        Ok(truncated
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .collect())
    }
}

pub fn routes(
    prefix: &str,
    backend: Arc<dyn QueryBackend>,
    timeout: Duration,
    max_len: usize,
) -> Result<Vec<Route>, DispatchError> {
    Ok(vec![Route::builder("query.wa", command_pattern(prefix, &["wa", "wolfram"]))
        .doc(
            CommandDoc::new(GROUP, &["wa", "wolfram"])
                .line("Ask a question and get a short answer.")
                .example(&format!("{prefix}wa distance to the moon")),
        )
        .build(Arc::new(QueryHandler::new(backend, timeout, max_len)))?])
}
