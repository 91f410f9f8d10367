//! Time and timezone commands.
//!
//! Users and channels can each store a timezone and a time format. The
//! effective value for a line is the user's, then the channel's, then the
//! configured default.

use async_trait::async_trait;
use attribute_store::{
    validators, AttributeError, AttributeStore, Identifier, Scope, TIMEZONE, TIME_FORMAT,
};
use chat_dispatch::{
    command_pattern, CommandDoc, DispatchError, Handler, HandlerError, InvocationContext,
    Precondition, Privilege, Reply, Route,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::debug;

const GROUP: &str = "clock";

/// Used only when the store has no default registered.
const FALLBACK_FORMAT: &str = "%Y-%m-%d - %T%Z";

/// Zone names this short are usually abbreviations without DST rules.
const SHORT_ZONE_NAME: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockAction {
    Time,
    SetUserZone,
    GetUserZone,
    SetUserFormat,
    GetUserFormat,
    SetChannelZone,
    GetChannelZone,
    SetChannelFormat,
    GetChannelFormat,
}

pub struct ClockHandler {
    action: ClockAction,
    prefix: String,
}

impl ClockHandler {
    pub fn new(action: ClockAction, prefix: &str) -> Self {
        Self {
            action,
            prefix: prefix.to_string(),
        }
    }

    async fn time(&self, ctx: &InvocationContext, store: &AttributeStore) -> Result<Reply, HandlerError> {
        let now = ctx.received_at();
        let format = effective_format(ctx, store).await;

        let Some(arg) = ctx.capture("args") else {
            let zone = effective_zone(ctx, store).await;
            return Ok(Reply::say(render(&format, zone, now)?));
        };

        if let Some(zone) = validators::parse_zone(arg) {
            return Ok(Reply::say(render(&format, zone, now)?));
        }

        let scope = if Identifier::new(arg).is_channel() {
            Scope::Channel
        } else {
            Scope::User
        };
        let stored_zone = store
            .get(scope, arg, TIMEZONE)
            .await
            .and_then(|z| validators::parse_zone(&z));
        if let Some(zone) = stored_zone {
            return Ok(Reply::say(render(&format, zone, now)?));
        }

        let zone = effective_zone(ctx, store).await;
        Ok(Reply::say(render(&format, zone, now)?).and(format!(
            "{arg} is not a valid timezone and has not used {}settz, falling back to your defaults.",
            self.prefix
        )))
    }

    async fn set_zone(
        &self,
        ctx: &InvocationContext,
        store: &AttributeStore,
        scope: Scope,
    ) -> Result<Reply, HandlerError> {
        let raw = ctx.capture("args").ok_or_else(|| {
            HandlerError::Validation(
                "What timezone do you want to set? Try a name like America/New_York.".into(),
            )
        })?;

        let entity = entity_for(ctx, scope);
        let zone = store
            .set(scope, entity, TIMEZONE, raw)
            .await
            .map_err(|e| rejected(e, || format!("I don't know the time zone {raw}. Try a name like America/New_York.")))?;

        debug!(scope = %scope, entity = %entity, zone = %zone, "Timezone set");

        if zone.len() < SHORT_ZONE_NAME {
            return Ok(Reply::say(format!(
                "Okay, {}, but you should use a region/city name like Europe/Berlin if you use DST.",
                ctx.actor()
            )));
        }

        Ok(Reply::say(match scope {
            Scope::User => format!("I now have you in the {zone} time zone."),
            Scope::Channel => format!("{} is now in the {zone} time zone.", ctx.scope_id()),
        }))
    }

    /// Store a format, render it once in the entity's zone and put the old
    /// value back if rendering fails.
    async fn set_format(
        &self,
        ctx: &InvocationContext,
        store: &AttributeStore,
        scope: Scope,
    ) -> Result<Reply, HandlerError> {
        let raw = ctx.capture("args").ok_or_else(|| {
            HandlerError::Validation(
                "What format do you want me to use? Try a strftime format like %Y-%m-%d %H:%M.".into(),
            )
        })?;

        let entity = entity_for(ctx, scope);
        let zone = match scope {
            Scope::User => effective_zone(ctx, store).await,
            Scope::Channel => zone_or_default(
                store
                    .resolve_effective(TIMEZONE, &[(Scope::Channel, entity)])
                    .await,
            ),
        };

        let _guard = store.lock(scope, entity, TIME_FORMAT).await;
        let previous = store.get(scope, entity, TIME_FORMAT).await;

        let format = store
            .set(scope, entity, TIME_FORMAT, raw)
            .await
            .map_err(|e| rejected(e, || "That format doesn't work. Try a strftime format like %Y-%m-%d %H:%M.".to_string()))?;

        let rendered = match render(&format, zone, ctx.received_at()).and_then(sendable) {
            Ok(rendered) => rendered,
            Err(e) => {
                store.restore(scope, entity, TIME_FORMAT, previous.as_deref()).await?;
                debug!(scope = %scope, entity = %entity, format = %format, "Time format reverted");
                return Err(e);
            }
        };

        Ok(Reply::say(match scope {
            Scope::User => format!(
                "Got it. Your time will now appear as {rendered}. (If the timezone is wrong, try {}settz)",
                self.prefix
            ),
            Scope::Channel => format!(
                "Got it. Times in {} will now appear as {rendered}. (If the timezone is wrong, try {}setctz)",
                ctx.scope_id(),
                self.prefix
            ),
        }))
    }

    async fn get(
        &self,
        ctx: &InvocationContext,
        store: &AttributeStore,
        scope: Scope,
        attribute: &str,
    ) -> Result<Reply, HandlerError> {
        let entity = match (ctx.capture("args"), scope) {
            (Some(name), _) => name,
            (None, Scope::User) => ctx.actor().as_str(),
            (None, Scope::Channel) if !ctx.is_private() => ctx.scope_id(),
            (None, Scope::Channel) => {
                return Err(HandlerError::Validation("Which channel?".into()));
            }
        };

        let what = if attribute == TIMEZONE {
            "time zone"
        } else {
            "time format"
        };

        Ok(Reply::say(match store.get(scope, entity, attribute).await {
            Some(value) => format!("{entity}'s {what} is {value}."),
            None if scope == Scope::User => format!("{entity} has not set their {what}."),
            None => format!("{entity} has no preferred {what}."),
        }))
    }
}

#[async_trait]
impl Handler for ClockHandler {
    async fn handle(
        &self,
        ctx: &InvocationContext,
        store: &AttributeStore,
    ) -> Result<Reply, HandlerError> {
        match self.action {
            ClockAction::Time => self.time(ctx, store).await,
            ClockAction::SetUserZone => self.set_zone(ctx, store, Scope::User).await,
            ClockAction::GetUserZone => self.get(ctx, store, Scope::User, TIMEZONE).await,
            ClockAction::SetUserFormat => self.set_format(ctx, store, Scope::User).await,
            ClockAction::GetUserFormat => self.get(ctx, store, Scope::User, TIME_FORMAT).await,
            ClockAction::SetChannelZone => self.set_zone(ctx, store, Scope::Channel).await,
            ClockAction::GetChannelZone => self.get(ctx, store, Scope::Channel, TIMEZONE).await,
            ClockAction::SetChannelFormat => self.set_format(ctx, store, Scope::Channel).await,
            ClockAction::GetChannelFormat => {
                self.get(ctx, store, Scope::Channel, TIME_FORMAT).await
            }
        }
    }
}

fn entity_for(ctx: &InvocationContext, scope: Scope) -> &str {
    match scope {
        Scope::User => ctx.actor().as_str(),
        Scope::Channel => ctx.scope_id(),
    }
}

/// Candidates for a line: the actor, then the channel unless private.
async fn effective(ctx: &InvocationContext, store: &AttributeStore, attribute: &str) -> Option<String> {
    let actor = (Scope::User, ctx.actor().canonical());
    if ctx.is_private() {
        store.resolve_effective(attribute, &[actor]).await
    } else {
        store
            .resolve_effective(attribute, &[actor, (Scope::Channel, ctx.scope_id())])
            .await
    }
}

async fn effective_zone(ctx: &InvocationContext, store: &AttributeStore) -> Tz {
    zone_or_default(effective(ctx, store, TIMEZONE).await)
}

async fn effective_format(ctx: &InvocationContext, store: &AttributeStore) -> String {
    effective(ctx, store, TIME_FORMAT)
        .await
        .unwrap_or_else(|| FALLBACK_FORMAT.to_string())
}

fn zone_or_default(name: Option<String>) -> Tz {
    name.and_then(|z| validators::parse_zone(&z)).unwrap_or(Tz::UTC)
}

fn render(format: &str, zone: Tz, at: DateTime<Utc>) -> Result<String, HandlerError> {
    validators::format_time(format, &at.with_timezone(&zone)).map_err(HandlerError::Validation)
}

/// A rendered time has to fit on one chat line.
fn sendable(rendered: String) -> Result<String, HandlerError> {
    if rendered.trim().is_empty() || rendered.contains(['\r', '\n']) {
        return Err(HandlerError::Validation(
            "That format doesn't fit on one line. Try a strftime format like %Y-%m-%d %H:%M.".into(),
        ));
    }
    Ok(rendered)
}

/// Validation failures get a friendlier message; everything else passes through.
fn rejected(e: AttributeError, message: impl FnOnce() -> String) -> HandlerError {
    match e {
        AttributeError::Validation { .. } => HandlerError::Validation(message()),
        other => other.into(),
    }
}

/// Routes for the clock commands.
pub fn routes(prefix: &str) -> Result<Vec<Route>, DispatchError> {
    let operator = Precondition::RequiresMinPrivilege(Privilege::Operator);

    let table: Vec<(ClockAction, &[&str], CommandDoc, Vec<Precondition>)> = vec![
        (
            ClockAction::Time,
            &["t", "time"],
            CommandDoc::new(GROUP, &["t", "time"])
                .line("Returns the current time, in a zone or for a nick if given.")
                .example(&format!("{prefix}t America/New_York")),
            vec![],
        ),
        (
            ClockAction::SetUserZone,
            &["settz", "settimezone"],
            CommandDoc::new(GROUP, &["settz", "settimezone"])
                .line("Set your preferred time zone.")
                .line("Use a region/city name from the IANA tz database.")
                .example(&format!("{prefix}settz America/New_York")),
            vec![],
        ),
        (
            ClockAction::GetUserZone,
            &["gettz", "gettimezone"],
            CommandDoc::new(GROUP, &["gettz", "gettimezone"])
                .line("Gets a user's preferred time zone, yours if no nick is given.")
                .example(&format!("{prefix}gettz [nick]")),
            vec![],
        ),
        (
            ClockAction::SetUserFormat,
            &["settf", "settimeformat"],
            CommandDoc::new(GROUP, &["settf", "settimeformat"])
                .line("Sets your preferred format for time, using strftime specifiers.")
                .example(&format!("{prefix}settf %Y-%m-%dT%T%z")),
            vec![],
        ),
        (
            ClockAction::GetUserFormat,
            &["gettf", "gettimeformat"],
            CommandDoc::new(GROUP, &["gettf", "gettimeformat"])
                .line("Gets a user's preferred time format, yours if no nick is given.")
                .example(&format!("{prefix}gettf [nick]")),
            vec![],
        ),
        (
            ClockAction::SetChannelZone,
            &["setctz", "setchanneltz"],
            CommandDoc::new(GROUP, &["setctz", "setchanneltz"])
                .line("Set the preferred time zone for this channel. Operators only.")
                .example(&format!("{prefix}setctz America/New_York")),
            vec![Precondition::RequiresChannel, operator],
        ),
        (
            ClockAction::GetChannelZone,
            &["getctz", "getchanneltz"],
            CommandDoc::new(GROUP, &["getctz", "getchanneltz"])
                .line("Gets a channel's preferred time zone, this channel's if none is given.")
                .example(&format!("{prefix}getctz [channel]")),
            vec![],
        ),
        (
            ClockAction::SetChannelFormat,
            &["setctf", "setchanneltimeformat"],
            CommandDoc::new(GROUP, &["setctf", "setchanneltimeformat"])
                .line("Sets the preferred time format for this channel. Operators only.")
                .example(&format!("{prefix}setctf %Y-%m-%dT%T%z")),
            vec![Precondition::RequiresChannel, operator],
        ),
        (
            ClockAction::GetChannelFormat,
            &["getctf", "getchanneltimeformat"],
            CommandDoc::new(GROUP, &["getctf", "getchanneltimeformat"])
                .line("Gets a channel's preferred time format, this channel's if none is given.")
                .example(&format!("{prefix}getctf [channel]")),
            vec![],
        ),
    ];

    table
        .into_iter()
        .map(|(action, names, doc, preconditions)| {
            let builder = Route::builder(format!("{GROUP}.{}", names[0]), command_pattern(prefix, names))
                .doc(doc);
            preconditions
                .into_iter()
                .fold(builder, |b, p| b.require(p))
                .build(Arc::new(ClockHandler::new(action, prefix)))
        })
        .collect()
}
