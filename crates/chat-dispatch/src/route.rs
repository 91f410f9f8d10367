//! Routes and their registration metadata.

use crate::context::{Envelope, Privilege};
use crate::error::DispatchError;
use crate::handler::Handler;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Route priority. Higher priorities are tried first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// A condition a line must meet before a route may fire.
///
/// A failed precondition skips the route without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Precondition {
    RequiresChannel,
    RequiresPrivate,
    RequiresAdmin,
    RequiresMinPrivilege(Privilege),
}

impl Precondition {
    pub fn check(&self, envelope: &Envelope) -> bool {
        match self {
            Precondition::RequiresChannel => !envelope.is_private,
            Precondition::RequiresPrivate => envelope.is_private,
            Precondition::RequiresAdmin => envelope.privilege >= Privilege::Admin,
            Precondition::RequiresMinPrivilege(level) => envelope.privilege >= *level,
        }
    }
}

/// Help text for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDoc {
    /// Module the command belongs to, e.g. `clock`.
    pub group: String,
    /// Trigger names; the first is the primary one.
    pub names: Vec<String>,
    pub doc: Vec<String>,
    pub example: Option<String>,
}

impl CommandDoc {
    pub fn new(group: &str, names: &[&str]) -> Self {
        Self {
            group: group.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
            doc: Vec::new(),
            example: None,
        }
    }

    pub fn line(mut self, text: &str) -> Self {
        self.doc.push(text.to_string());
        self
    }

    pub fn example(mut self, example: &str) -> Self {
        self.example = Some(example.to_string());
        self
    }

    /// Primary trigger name.
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or_default()
    }

    pub fn answers_to(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

/// A registered route.
pub struct Route {
    pub(crate) name: String,
    pub(crate) pattern: Regex,
    pub(crate) priority: Priority,
    pub(crate) preconditions: Vec<Precondition>,
    pub(crate) doc: Option<CommandDoc>,
    pub(crate) handler: Arc<dyn Handler>,
}

impl Route {
    pub fn builder(name: impl Into<String>, pattern: impl Into<String>) -> RouteBuilder {
        RouteBuilder {
            name: name.into(),
            pattern: pattern.into(),
            priority: Priority::default(),
            preconditions: Vec::new(),
            doc: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn preconditions(&self) -> &[Precondition] {
        &self.preconditions
    }

    /// Identity used for duplicate detection.
    pub(crate) fn signature(&self) -> (&str, Priority, BTreeSet<Precondition>) {
        (
            self.pattern.as_str(),
            self.priority,
            self.preconditions.iter().copied().collect(),
        )
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("priority", &self.priority)
            .field("preconditions", &self.preconditions)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Route`].
pub struct RouteBuilder {
    name: String,
    pattern: String,
    priority: Priority,
    preconditions: Vec<Precondition>,
    doc: Option<CommandDoc>,
}

impl RouteBuilder {
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Add a precondition. Preconditions are checked in the order added.
    pub fn require(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn doc(mut self, doc: CommandDoc) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn build(self, handler: Arc<dyn Handler>) -> Result<Route, DispatchError> {
        let pattern = Regex::new(&self.pattern).map_err(|source| DispatchError::Pattern {
            name: self.name.clone(),
            source,
        })?;

        Ok(Route {
            name: self.name,
            pattern,
            priority: self.priority,
            preconditions: self.preconditions,
            doc: self.doc,
            handler,
        })
    }
}

/// Pattern for a prefixed command with an optional trailing `args` capture.
///
/// `command_pattern(".", &["t", "time"])` matches `.t`, `.TIME Europe/Berlin`.
pub fn command_pattern(prefix: &str, names: &[&str]) -> String {
    let names: Vec<String> = names.iter().map(|n| regex::escape(n)).collect();
    format!(
        r"(?i)^{}(?:{})(?:\s+(?P<args>.*?))?\s*$",
        regex::escape(prefix),
        names.join("|")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_pattern() {
        let re = Regex::new(&command_pattern(".", &["t", "time"])).unwrap();

        assert!(re.is_match(".t"));
        assert!(re.is_match(".TIME"));
        let caps = re.captures(".time  Europe/Berlin ").unwrap();
        assert_eq!(&caps["args"], "Europe/Berlin");

        assert!(!re.is_match(".timer"));
        assert!(!re.is_match("time"));
        assert!(!re.is_match("x.t"));
    }

    #[test]
    fn test_command_pattern_escapes_prefix() {
        let re = Regex::new(&command_pattern("?", &["help"])).unwrap();
        assert!(re.is_match("?help"));
        assert!(!re.is_match("help"));
    }

    #[test]
    fn test_preconditions() {
        let chan = Envelope::channel("alice", "#chan");
        let op = Envelope::channel("alice", "#chan").with_privilege(Privilege::Operator);
        let private = Envelope::private("alice").with_privilege(Privilege::Admin);

        assert!(Precondition::RequiresChannel.check(&chan));
        assert!(!Precondition::RequiresChannel.check(&private));
        assert!(Precondition::RequiresPrivate.check(&private));
        assert!(!Precondition::RequiresAdmin.check(&op));
        assert!(Precondition::RequiresAdmin.check(&private));
        assert!(Precondition::RequiresMinPrivilege(Privilege::Operator).check(&op));
        assert!(!Precondition::RequiresMinPrivilege(Privilege::Operator).check(&chan));
    }

    #[test]
    fn test_command_doc() {
        let doc = CommandDoc::new("clock", &["settz", "settimezone"])
            .line("Set your timezone.")
            .example(".settz Europe/Berlin");
        assert_eq!(doc.name(), "settz");
        assert!(doc.answers_to("SetTimeZone"));
        assert!(!doc.answers_to("gettz"));
    }
}
