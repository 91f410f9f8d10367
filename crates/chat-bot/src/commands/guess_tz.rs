//! Guess a nick's time zone from the local time their client reports.
//!
//! `guesstz` sends a CTCP TIME request and remembers where the answer should
//! be announced. When the answer comes back as a private `\x01TIME ...\x01`
//! line, the UTC offset is rounded to 15 minutes and mapped to the first
//! common zone with that offset at the moment.

use crate::commands::is_expired;
use async_trait::async_trait;
use attribute_store::{validators, AttributeStore, Identifier, Scope, TIMEZONE};
use chat_dispatch::{
    CommandDoc, DispatchError, Handler, HandlerError, InvocationContext, Precondition, Priority,
    Reply, Route,
};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const GROUP: &str = "clock";

const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(10 * 60);

/// Offsets are rounded to this many seconds.
const OFFSET_STEP: i64 = 15 * 60;

/// Candidate zones, tried in order.
pub const COMMON_TIMEZONES: &[&str] = &[
    "Europe/London",
    "Europe/Berlin",
    "Africa/Cairo",
    "Europe/Moscow",
    "Asia/Dubai",
    "Asia/Tehran",
    "Indian/Maldives",
    "Asia/Kabul",
    "Antarctica/Vostok",
    "Asia/Calcutta",
    "Asia/Bangkok",
    "Asia/Rangoon",
    "Asia/Singapore",
    "Asia/Tokyo",
    "Asia/Pyongyang",
    "Australia/Eucla",
    "Australia/Queensland",
    "Australia/North",
    "Australia/Sydney",
    "Australia/South",
    "Pacific/Wallis",
    "Pacific/Auckland",
    "US/Hawaii",
    "Pacific/Chatham",
    "US/Alaska",
    "Pacific/Marquesas",
    "America/Los_Angeles",
    "America/Phoenix",
    "America/Chicago",
    "America/New_York",
    "Etc/GMT+4",
    "Etc/GMT+3",
    "Canada/Newfoundland",
    "Etc/GMT+2",
    "Etc/GMT+1",
];

/// Formats that carry their own offset.
const ZONED_FORMATS: &[&str] = &[
    "%a %b %e %H:%M:%S %Y %z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%a, %d %b %Y %H:%M:%S %z",
];

/// Local-time formats, compared against the current UTC time.
const LOCAL_FORMATS: &[&str] = &[
    "%a %b %e %H:%M:%S %Y",
    "%a %b %e %H:%M:%S %Z %Y",
    "%a, %d %b %Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d %b %Y %H:%M:%S",
];

/// A pending CTCP TIME request.
#[derive(Debug, Clone)]
pub struct TimeRequest {
    /// Where the result is announced.
    pub reply_to: String,
    pub requested_by: String,
    pub opened_at: DateTime<Utc>,
}

/// Outstanding time requests keyed by the nick that was asked.
pub struct TimeRequests {
    pending: DashMap<Identifier, TimeRequest>,
    ttl: Duration,
}

impl Default for TimeRequests {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TTL)
    }
}

impl TimeRequests {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ttl,
        }
    }

    pub fn open(&self, nick: &str, request: TimeRequest) {
        self.pending.insert(Identifier::new(nick), request);
    }

    /// Take the request for `nick` if one is open at `now`.
    pub fn take(&self, nick: &Identifier, now: DateTime<Utc>) -> Option<TimeRequest> {
        self.pending
            .remove(nick)
            .map(|(_, request)| request)
            .filter(|r| !is_expired(r.opened_at, now, self.ttl))
    }

    pub fn is_pending(&self, nick: &str) -> bool {
        self.pending.contains_key(&Identifier::new(nick))
    }

    /// Drop requests nobody answered. Returns how many were dropped.
    pub fn expire(&self, now: DateTime<Utc>) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, r| !is_expired(r.opened_at, now, self.ttl));
        before - self.pending.len()
    }
}

/// UTC offset in seconds of a reported local time.
///
/// Times with an explicit offset use it. Bare local times are compared with
/// `now` and the difference is rounded to 15 minutes.
pub fn guess_offset(date: &str, now: DateTime<Utc>) -> Option<i32> {
    let date = date.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(date)
        .or_else(|_| DateTime::parse_from_rfc2822(date))
    {
        return Some(parsed.offset().local_minus_utc());
    }
    if let Some(parsed) = ZONED_FORMATS
        .iter()
        .find_map(|f| DateTime::parse_from_str(date, f).ok())
    {
        return Some(parsed.offset().local_minus_utc());
    }

    let local = LOCAL_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(date, f).ok())?;
    let seconds = (local - now.naive_utc()).num_seconds();
    let rounded = (seconds + OFFSET_STEP / 2).div_euclid(OFFSET_STEP) * OFFSET_STEP;
    i32::try_from(rounded).ok()
}

/// First common zone whose offset at `now` is `offset` seconds.
pub fn zone_for_offset(offset: i32, now: DateTime<Utc>) -> Option<Tz> {
    COMMON_TIMEZONES
        .iter()
        .filter_map(|name| validators::parse_zone(name))
        .find(|tz| {
            tz.offset_from_utc_datetime(&now.naive_utc())
                .fix()
                .local_minus_utc()
                == offset
        })
}

fn describe_offset(offset: i32) -> String {
    FixedOffset::east_opt(offset)
        .map(|o| o.to_string())
        .unwrap_or_else(|| format!("{offset}s"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessAction {
    /// `guesstz [nick [date]]`
    Request,
    /// A CTCP TIME answer arriving in private.
    Answer,
}

pub struct GuessTzHandler {
    action: GuessAction,
    requests: Arc<TimeRequests>,
}

impl GuessTzHandler {
    pub fn new(action: GuessAction, requests: Arc<TimeRequests>) -> Self {
        Self { action, requests }
    }

    async fn request(
        &self,
        ctx: &InvocationContext,
        store: &AttributeStore,
    ) -> Result<Reply, HandlerError> {
        let user = ctx.capture("user");
        if user.is_some() && !ctx.is_admin() {
            return Err(HandlerError::Validation(
                "Only admins can guess someone else's time zone.".into(),
            ));
        }

        if let (Some(nick), Some(date)) = (user, ctx.capture("date")) {
            let text = guess_and_store(store, nick, date, ctx.received_at()).await?;
            return Ok(Reply::say(text));
        }

        let nick = user.unwrap_or(ctx.actor().as_str());
        self.requests.open(
            nick,
            TimeRequest {
                reply_to: ctx.scope_id().to_string(),
                requested_by: ctx.actor().as_str().to_string(),
                opened_at: ctx.received_at(),
            },
        );
        debug!(nick = %nick, by = %ctx.actor(), "Sent time request");

        Ok(Reply::say(format!("Sending CTCP TIME to {nick}."))
            .and_to(nick, "\x01TIME\x01"))
    }

    /// Answers nobody asked for are ignored.
    async fn answer(
        &self,
        ctx: &InvocationContext,
        store: &AttributeStore,
    ) -> Result<Reply, HandlerError> {
        let Some(request) = self.requests.take(ctx.actor(), ctx.received_at()) else {
            debug!(nick = %ctx.actor(), "Unrequested time answer");
            return Ok(Reply::none());
        };
        let date = ctx.capture("date").unwrap_or_default();

        let text = match guess_and_store(store, ctx.actor().as_str(), date, ctx.received_at()).await
        {
            Ok(text) => text,
            Err(HandlerError::Validation(text)) => text,
            Err(e) => return Err(e),
        };
        Ok(Reply::none().and_to(request.reply_to, text))
    }
}

async fn guess_and_store(
    store: &AttributeStore,
    nick: &str,
    date: &str,
    now: DateTime<Utc>,
) -> Result<String, HandlerError> {
    let offset = guess_offset(date, now).ok_or_else(|| {
        HandlerError::Validation(format!("Cannot parse {nick}'s date string {date}."))
    })?;
    let zone = zone_for_offset(offset, now).ok_or_else(|| {
        HandlerError::Validation(format!(
            "Could not find a time zone for UTC offset {}.",
            describe_offset(offset)
        ))
    })?;

    let zone = store.set(Scope::User, nick, TIMEZONE, zone.name()).await?;
    info!(nick = %nick, zone = %zone, "Guessed time zone");
    Ok(format!("Set the time zone of {nick} to {zone}."))
}

#[async_trait]
impl Handler for GuessTzHandler {
    async fn handle(
        &self,
        ctx: &InvocationContext,
        store: &AttributeStore,
    ) -> Result<Reply, HandlerError> {
        match self.action {
            GuessAction::Request => self.request(ctx, store).await,
            GuessAction::Answer => self.answer(ctx, store).await,
        }
    }
}

/// Routes for `guesstz` and CTCP TIME answers.
pub fn routes(prefix: &str, requests: Arc<TimeRequests>) -> Result<Vec<Route>, DispatchError> {
    let request = format!(
        r"(?i)^{}guesstz(?:\s+(?P<user>\S+)(?:\s+(?P<date>.+?))?)?\s*$",
        regex::escape(prefix)
    );

    Ok(vec![
        Route::builder("clock.guesstz", request)
            .doc(
                CommandDoc::new(GROUP, &["guesstz"])
                    .line("Guess your time zone from the time your client reports.")
                    .line("Admins can name a nick, and give a date string to skip asking.")
                    .example(&format!("{prefix}guesstz")),
            )
            .build(Arc::new(GuessTzHandler::new(
                GuessAction::Request,
                requests.clone(),
            )))?,
        Route::builder("clock.timeanswer", r"^\x01TIME\s+(?P<date>[^\x01]+)\x01?$")
            .priority(Priority::High)
            .require(Precondition::RequiresPrivate)
            .build(Arc::new(GuessTzHandler::new(GuessAction::Answer, requests)))?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_offset_from_local_time_is_rounded() {
        assert_eq!(guess_offset("Mon Jan 15 21:00:07 2024", noon()), Some(9 * 3600));
        assert_eq!(guess_offset("2024-01-15 17:40:00", noon()), Some(5 * 3600 + 45 * 60));
        assert_eq!(guess_offset("2024-01-15 06:53:00", noon()), Some(-5 * 3600));
    }

    #[test]
    fn test_offset_from_zoned_time() {
        assert_eq!(
            guess_offset("2024-01-15T17:30:00+05:30", noon()),
            Some(5 * 3600 + 30 * 60)
        );
        assert_eq!(guess_offset("2024-01-15 07:00:00 -0500", noon()), Some(-5 * 3600));
    }

    #[test]
    fn test_unparseable_date() {
        assert_eq!(guess_offset("sometime tomorrow", noon()), None);
    }

    #[test]
    fn test_zone_for_offset_takes_first_match() {
        assert_eq!(zone_for_offset(9 * 3600, noon()), Some(Tz::Asia__Tokyo));
        assert_eq!(zone_for_offset(0, noon()), Some(Tz::Europe__London));
        assert_eq!(
            zone_for_offset(5 * 3600 + 30 * 60, noon()).map(|tz| tz.name()),
            Some("Asia/Calcutta")
        );
        assert_eq!(zone_for_offset(3600 + 15 * 60, noon()), None);
    }

    #[test]
    fn test_every_common_zone_exists() {
        for name in COMMON_TIMEZONES {
            assert!(validators::parse_zone(name).is_some(), "{name}");
        }
    }

    #[test]
    fn test_requests_expire() {
        let requests = TimeRequests::new(Duration::from_secs(60));
        let request = TimeRequest {
            reply_to: "#chan".into(),
            requested_by: "alice".into(),
            opened_at: noon(),
        };

        requests.open("Bob", request.clone());
        assert!(requests.is_pending("bob"));
        assert_eq!(requests.expire(noon() + chrono::Duration::seconds(30)), 0);
        assert_eq!(requests.expire(noon() + chrono::Duration::minutes(2)), 1);
        assert!(!requests.is_pending("bob"));

        requests.open("bob", request);
        let late = noon() + chrono::Duration::minutes(5);
        assert!(requests.take(&Identifier::new("bob"), late).is_none());
    }
}
