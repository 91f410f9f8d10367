//! Per-line invocation context.

use crate::error::HandlerError;
use attribute_store::Identifier;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::str::FromStr;

/// Privilege of the actor in the scope the line came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Privilege {
    #[default]
    None,
    Operator,
    Admin,
}

/// Who sent a line and where. Supplied by the transport for each line.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub actor: String,
    /// Channel name, or the actor's own nick for private messages.
    pub scope_id: String,
    pub is_private: bool,
    pub privilege: Privilege,
    /// When the line was sent. Defaults to the time the envelope was built.
    pub received_at: DateTime<Utc>,
}

impl Envelope {
    pub fn channel(actor: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            scope_id: channel.into(),
            is_private: false,
            privilege: Privilege::None,
            received_at: Utc::now(),
        }
    }

    pub fn private(actor: impl Into<String>) -> Self {
        let actor = actor.into();
        Self {
            scope_id: actor.clone(),
            actor,
            is_private: true,
            privilege: Privilege::None,
            received_at: Utc::now(),
        }
    }

    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    pub fn with_received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }
}

/// Everything a handler knows about the line it is handling.
///
/// Built fresh for each matched route and never mutated.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    raw_text: String,
    actor: Identifier,
    scope_id: String,
    is_private: bool,
    privilege: Privilege,
    captures: HashMap<String, String>,
    received_at: DateTime<Utc>,
}

impl InvocationContext {
    pub fn new(raw_text: &str, envelope: &Envelope, captures: HashMap<String, String>) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            actor: Identifier::new(envelope.actor.as_str()),
            scope_id: envelope.scope_id.clone(),
            is_private: envelope.is_private,
            privilege: envelope.privilege,
            captures,
            received_at: envelope.received_at,
        }
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn actor(&self) -> &Identifier {
        &self.actor
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn is_private(&self) -> bool {
        self.is_private
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    pub fn is_admin(&self) -> bool {
        self.privilege >= Privilege::Admin
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// A named capture, trimmed. Empty captures count as absent.
    pub fn capture(&self, name: &str) -> Option<&str> {
        self.captures
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// A named capture parsed into `T`.
    pub fn parse_capture<T: FromStr>(&self, name: &str) -> Result<Option<T>, HandlerError> {
        match self.capture(name) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| HandlerError::InvalidCapture {
                    name: name.to_string(),
                    value: value.to_string(),
                }),
        }
    }
}
