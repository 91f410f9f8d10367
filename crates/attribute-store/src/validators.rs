//! Built-in attribute parsers.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt::Write;

/// Longest accepted free-text value.
pub const MAX_TEXT_LEN: usize = 400;

/// Accepts IANA zone names such as `America/New_York` or `UTC`, in any
/// case. The stored form is the database spelling.
pub fn timezone(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("timezone is empty".into());
    }
    parse_zone(raw)
        .map(|tz| tz.name().to_string())
        .ok_or_else(|| format!("unknown timezone {raw}"))
}

/// Accepts strftime-style format strings that chrono can render.
pub fn time_format(raw: &str) -> Result<String, String> {
    if raw.trim().is_empty() {
        return Err("time format is empty".into());
    }
    if StrftimeItems::new(raw).any(|item| matches!(item, Item::Error)) {
        return Err(format!("unsupported format specifier in {raw:?}"));
    }
    // Rendering once catches specifiers that parse but cannot be displayed.
    format_time(raw, &Utc::now())?;
    Ok(raw.to_string())
}

/// Accepts any non-empty single line of bounded length.
pub fn text(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("value is empty".into());
    }
    if trimmed.len() > MAX_TEXT_LEN {
        return Err(format!("value is longer than {MAX_TEXT_LEN} bytes"));
    }
    if trimmed.contains(['\r', '\n']) {
        return Err("value spans multiple lines".into());
    }
    Ok(trimmed.to_string())
}

/// Render `at` with a strftime-style format without panicking on bad input.
pub fn format_time<T>(format: &str, at: &DateTime<T>) -> Result<String, String>
where
    T: TimeZone,
    T::Offset: std::fmt::Display,
{
    let mut out = String::new();
    write!(out, "{}", at.format_with_items(StrftimeItems::new(format)))
        .map_err(|_| format!("cannot render format {format:?}"))?;
    Ok(out)
}

/// Look up a zone by name, ignoring case.
pub fn parse_zone(name: &str) -> Option<Tz> {
    Tz::from_str_insensitive(name).ok()
}
