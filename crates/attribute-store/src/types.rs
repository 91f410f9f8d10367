//! Keys, identities and attribute definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// What an attribute is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    User,
    Channel,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::User => f.write_str("user"),
            Scope::Channel => f.write_str("channel"),
        }
    }
}

/// A nick or channel name compared case-insensitively.
///
/// Uses the rfc1459 case mapping, where `{}|~` are the lower-case forms of
/// `[]\^`. The original spelling is kept for display.
#[derive(Debug, Clone)]
pub struct Identifier {
    display: String,
    canonical: String,
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        let display = name.into();
        let canonical = canonicalize(&display);
        Self { display, canonical }
    }

    /// Lower-cased form used for storage keys and comparisons.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Channel names start with `#` or `&`.
    pub fn is_channel(&self) -> bool {
        self.display.starts_with('#') || self.display.starts_with('&')
    }
}

fn canonicalize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '^' => '~',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Storage key of one attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeKey {
    pub scope: Scope,
    /// Canonical entity id (see [`Identifier::canonical`]).
    pub entity: String,
    pub attribute: String,
}

impl AttributeKey {
    pub fn new(scope: Scope, entity: &str, attribute: &str) -> Self {
        Self {
            scope,
            entity: canonicalize(entity),
            attribute: attribute.to_string(),
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scope, self.entity, self.attribute)
    }
}

/// Parses a raw value into its canonical serialized form.
///
/// Returning `Ok` means the value is valid and the returned string is what
/// gets stored; parsing the returned string again must yield the same string.
pub trait Validator: Send + Sync {
    fn parse(&self, raw: &str) -> Result<String, String>;
}

impl<F> Validator for F
where
    F: Fn(&str) -> Result<String, String> + Send + Sync,
{
    fn parse(&self, raw: &str) -> Result<String, String> {
        self(raw)
    }
}

/// Definition of a storable attribute.
#[derive(Clone)]
pub struct AttributeSpec {
    pub name: String,
    validator: Arc<dyn Validator>,
    default: Option<String>,
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>, validator: impl Validator + 'static) -> Self {
        Self {
            name: name.into(),
            validator: Arc::new(validator),
            default: None,
        }
    }

    /// Set the fallback used by `resolve_effective`.
    ///
    /// The default goes through the same parser as stored values.
    pub fn with_default(mut self, default: &str) -> Result<Self, String> {
        self.default = Some(self.validator.parse(default)?);
        Ok(self)
    }

    pub fn parse(&self, raw: &str) -> Result<String, String> {
        self.validator.parse(raw)
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }
}

impl fmt::Debug for AttributeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSpec")
            .field("name", &self.name)
            .field("default", &self.default)
            .finish()
    }
}

/// One persisted record, as written to the store file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub scope: Scope,
    pub entity: String,
    pub attribute: String,
    pub value: String,
}
