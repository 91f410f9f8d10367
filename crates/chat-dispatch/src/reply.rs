//! Handler replies.

/// One outgoing line. `target: None` means "back where the line came from".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    pub target: Option<String>,
    pub text: String,
}

/// Ordered lines produced by a handler. Empty means "say nothing".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    lines: Vec<ReplyLine>,
}

impl Reply {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn say(text: impl Into<String>) -> Self {
        Self::none().and(text)
    }

    /// Append a line for the originating scope.
    pub fn and(mut self, text: impl Into<String>) -> Self {
        self.lines.push(ReplyLine {
            target: None,
            text: text.into(),
        });
        self
    }

    /// Append a line for a specific target.
    pub fn and_to(mut self, target: impl Into<String>, text: impl Into<String>) -> Self {
        self.lines.push(ReplyLine {
            target: Some(target.into()),
            text: text.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[ReplyLine] {
        &self.lines
    }

    /// Just the text of each line.
    pub fn texts(&self) -> Vec<&str> {
        self.lines.iter().map(|l| l.text.as_str()).collect()
    }

    /// `(target, text)` pairs with unaddressed lines sent to `default_target`.
    pub fn addressed<'a>(&'a self, default_target: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.lines.iter().map(move |line| {
            (
                line.target.as_deref().unwrap_or(default_target),
                line.text.as_str(),
            )
        })
    }
}

impl<S: Into<String>> FromIterator<S> for Reply {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        iter.into_iter().fold(Reply::none(), Reply::and)
    }
}
