//! Short per-nick history of channel lines, used to check quotes.

use attribute_store::Identifier;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use std::collections::VecDeque;

/// Lines kept per (channel, nick).
pub const LINES_PER_NICK: usize = 10;

const ACTION_PREFIX: &str = "\x01ACTION ";

/// A remembered line that matched a quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedLine {
    /// The line as it was said, ACTION marker included.
    pub line: String,
    pub is_action: bool,
}

#[derive(Debug)]
struct History {
    lines: VecDeque<String>,
    last_seen: DateTime<Utc>,
}

/// Recent lines by channel and nick.
#[derive(Default)]
pub struct RecentLines {
    lines: DashMap<(Identifier, Identifier), History>,
}

impl RecentLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a line. Command lines and `s/` substitutions are skipped and
    /// the trailing marker of an ACTION line is dropped.
    pub fn record(&self, channel: &str, nick: &str, line: &str, command_prefix: &str) {
        if line.starts_with("s/") || line.starts_with(command_prefix) {
            return;
        }

        let line = if line.starts_with("\x01ACTION") {
            line.strip_suffix('\x01').unwrap_or(line)
        } else {
            line
        };

        let mut history = self
            .lines
            .entry((Identifier::new(channel), Identifier::new(nick)))
            .or_insert_with(|| History {
                lines: VecDeque::with_capacity(LINES_PER_NICK),
                last_seen: Utc::now(),
            });
        history.lines.push_back(line.to_string());
        while history.lines.len() > LINES_PER_NICK {
            history.lines.pop_front();
        }
        history.last_seen = Utc::now();
    }

    /// Forget nicks that said nothing since `cutoff`. Returns how many
    /// histories were dropped.
    pub fn evict_idle(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.lines.len();
        self.lines
            .retain(|_, history| history.last_seen > cutoff);
        before - self.lines.len()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Most recent line of `nick` in `channel` that `quote` matches.
    pub fn find(&self, channel: &str, nick: &str, quote: &str) -> Option<MatchedLine> {
        let pattern = quote_pattern(quote).ok()?;
        let key = (Identifier::new(channel), Identifier::new(nick));
        let history = self.lines.get(&key)?;

        history.lines.iter().rev().find_map(|line| {
            let (text, is_action) = match line.strip_prefix(ACTION_PREFIX) {
                Some(text) => (text, true),
                None => (line.as_str(), false),
            };
            pattern.is_match(text).then(|| MatchedLine {
                line: line.clone(),
                is_action,
            })
        })
    }

    #[cfg(test)]
    fn history(&self, channel: &str, nick: &str) -> Vec<String> {
        self.lines
            .get(&(Identifier::new(channel), Identifier::new(nick)))
            .map(|h| h.lines.iter().cloned().collect())
            .unwrap_or_default()
    }
}

enum Piece {
    Literal(String),
    Wildcard,
    Optional(String),
}

/// Turn quote shorthand into a regex anchored at the start of a line.
///
/// `_` stands for any text and `[word]` for an optional fragment (spaces
/// around it are optional too). Everything else is literal.
pub fn quote_pattern(quote: &str) -> Result<Regex, regex::Error> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut rest = quote;

    while let Some(c) = rest.chars().next() {
        match c {
            '_' => {
                flush(&mut pieces, &mut literal);
                pieces.push(Piece::Wildcard);
                rest = &rest[1..];
            }
            '[' => match rest[1..].find(']') {
                Some(end) if end > 0 => {
                    flush(&mut pieces, &mut literal);
                    pieces.push(Piece::Optional(rest[1..=end].to_string()));
                    rest = &rest[end + 2..];
                }
                _ => {
                    literal.push(c);
                    rest = &rest[1..];
                }
            },
            c => {
                literal.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    flush(&mut pieces, &mut literal);

    let mut pattern = String::from("^");
    if quote.starts_with(|c: char| c.is_alphanumeric()) {
        pattern.push_str(r"\b");
    }

    for (i, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Literal(text) => {
                let mut text = text.as_str();
                if i > 0 && matches!(pieces[i - 1], Piece::Optional(_)) {
                    text = text.strip_prefix(' ').unwrap_or(text);
                }
                if matches!(pieces.get(i + 1), Some(Piece::Optional(_))) {
                    text = text.strip_suffix(' ').unwrap_or(text);
                }
                pattern.push_str(&regex::escape(text));
            }
            Piece::Wildcard => pattern.push_str("(.*)"),
            Piece::Optional(text) => {
                pattern.push_str(&format!(r"\s?(?:{})?\s?", regex::escape(text)));
            }
        }
    }

    if quote.ends_with(|c: char| c.is_alphanumeric()) {
        pattern.push_str(r"\b");
    }

    Regex::new(&pattern)
}

fn flush(pieces: &mut Vec<Piece>, literal: &mut String) {
    if !literal.is_empty() {
        pieces.push(Piece::Literal(std::mem::take(literal)));
    }
}
