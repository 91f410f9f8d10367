//! Quote commands.
//!
//! Quotes are checked against what the quoted nick recently said in the
//! channel before they are stored. Whole collections can be copied between
//! bots with `quote importfrom`, which opens an import session for the other
//! bot and asks it to send its quotes as JSON records.

use crate::commands::is_expired;
use crate::commands::recent_lines::RecentLines;
use async_trait::async_trait;
use attribute_store::{AttributeStore, Identifier};
use chat_dispatch::{
    CommandDoc, DispatchError, Handler, HandlerError, InvocationContext, Precondition, Priority,
    Reply, Route,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use quote_ledger::{LedgerError, NewQuote, Quote, QuoteFilter, QuoteLedger};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const GROUP: &str = "quote";

/// Longest line sent by `quote list`.
const MAX_LIST_LINE: usize = 400;

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_RECENT_LINE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// An open import from another bot.
#[derive(Debug, Clone)]
pub struct ImportSession {
    pub opened_by: String,
    pub opened_at: DateTime<Utc>,
    pub imported: usize,
}

/// State shared by all quote handlers.
pub struct QuoteModule {
    ledger: QuoteLedger,
    recent: RecentLines,
    sessions: DashMap<Identifier, ImportSession>,
    session_ttl: Duration,
    recent_line_ttl: Duration,
    prefix: String,
    bot_nick: String,
}

impl QuoteModule {
    pub fn new(ledger: QuoteLedger, prefix: &str, bot_nick: &str) -> Self {
        Self {
            ledger,
            recent: RecentLines::new(),
            sessions: DashMap::new(),
            session_ttl: DEFAULT_SESSION_TTL,
            recent_line_ttl: DEFAULT_RECENT_LINE_TTL,
            prefix: prefix.to_string(),
            bot_nick: bot_nick.to_string(),
        }
    }

    /// Set how long import sessions stay open and how long an idle nick's
    /// lines are kept.
    pub fn with_expiry(mut self, session_ttl: Duration, recent_line_ttl: Duration) -> Self {
        self.session_ttl = session_ttl;
        self.recent_line_ttl = recent_line_ttl;
        self
    }

    pub fn ledger(&self) -> &QuoteLedger {
        &self.ledger
    }

    pub fn recent(&self) -> &RecentLines {
        &self.recent
    }

    /// Whether `nick` may currently send `quote import` lines.
    pub fn is_importing(&self, nick: &str) -> bool {
        self.open_session(&Identifier::new(nick), Utc::now())
    }

    fn open_session(&self, importer: &Identifier, now: DateTime<Utc>) -> bool {
        self.sessions
            .get(importer)
            .is_some_and(|s| !is_expired(s.opened_at, now, self.session_ttl))
    }

    /// Drop import sessions that timed out and histories of nicks that went
    /// quiet. Returns the number of sessions dropped.
    pub fn expire(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|importer, session| {
            let keep = !is_expired(session.opened_at, now, self.session_ttl);
            if !keep {
                info!(importer = %importer, imported = session.imported, "Import session expired");
            }
            keep
        });
        let sessions = before - self.sessions.len();

        let histories = chrono::Duration::from_std(self.recent_line_ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .map_or(0, |cutoff| self.recent.evict_idle(cutoff));
        if histories > 0 {
            debug!(histories, "Forgot idle nicks");
        }

        sessions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteAction {
    Collect,
    Add,
    ForceAdd,
    Random,
    List,
    Show,
    Info,
    Delete,
    Find,
    ImportFrom,
    ExportListTo,
    Import,
    ImportDone,
}

pub struct QuoteHandler {
    action: QuoteAction,
    module: Arc<QuoteModule>,
}

impl QuoteHandler {
    pub fn new(action: QuoteAction, module: Arc<QuoteModule>) -> Self {
        Self { action, module }
    }

    fn collect(&self, ctx: &InvocationContext) -> Reply {
        self.module.recent.record(
            ctx.scope_id(),
            ctx.actor().as_str(),
            ctx.raw_text(),
            &self.module.prefix,
        );
        Reply::none()
    }

    async fn add(&self, ctx: &InvocationContext) -> Result<Reply, HandlerError> {
        let quote = required(ctx, "quote")?;
        let channel = ctx.scope_id();

        let (user, matched) = match ctx.capture("user") {
            Some(user) => {
                let matched = self.module.recent.find(channel, user, quote);
                (user, matched)
            }
            None => {
                let actor = ctx.actor().as_str();
                (actor, self.module.recent.find(channel, actor, quote))
            }
        };

        let matched = matched.ok_or_else(|| {
            HandlerError::Validation(format!("I cannot validate {user} said {quote}"))
        })?;

        let new = NewQuote {
            user: user.to_string(),
            channel: channel.to_string(),
            quote_text: quote.to_string(),
            source_text: matched.line,
            submitter: ctx.actor().as_str().to_string(),
            timestamp: ctx.received_at(),
        };
        let id = self.module.ledger.append(&new).await.map_err(ledger_error)?;

        debug!(id, user = %user, action = matched.is_action, "Quote added");
        Ok(Reply::say(format!("Quote #{id} added: {quote}")))
    }

    async fn force_add(&self, ctx: &InvocationContext) -> Result<Reply, HandlerError> {
        let quote = required(ctx, "quote")?;
        let user = ctx.capture("user").unwrap_or(ctx.actor().as_str());

        let new = NewQuote {
            user: user.to_string(),
            channel: ctx.scope_id().to_string(),
            quote_text: quote.to_string(),
            source_text: quote.to_string(),
            submitter: ctx.actor().as_str().to_string(),
            timestamp: ctx.received_at(),
        };
        let id = self.module.ledger.append(&new).await.map_err(ledger_error)?;

        Ok(Reply::say(format!("Quote #{id} added: {quote}")))
    }

    async fn random(&self, ctx: &InvocationContext) -> Result<Reply, HandlerError> {
        let user = ctx.capture("user");
        let quote = self
            .module
            .ledger
            .find_random(&QuoteFilter::user(user))
            .await
            .map_err(|e| empty_as(e, no_quotes(user)))?;

        Ok(Reply::say(quote.to_string()))
    }

    async fn list(&self, ctx: &InvocationContext) -> Result<Reply, HandlerError> {
        let user = ctx.capture("user");
        let quotes = self
            .module
            .ledger
            .list(&QuoteFilter::user(user))
            .await
            .map_err(ledger_error)?;

        if quotes.is_empty() {
            return Err(HandlerError::Empty(no_quotes(user)));
        }

        Ok(pack(quotes.iter().map(Quote::to_string), ", ", MAX_LIST_LINE)
            .into_iter()
            .collect())
    }

    async fn show(&self, ctx: &InvocationContext) -> Result<Reply, HandlerError> {
        let quote = self.by_id(ctx).await?;
        Ok(Reply::say(quote.to_string()))
    }

    async fn info(&self, ctx: &InvocationContext) -> Result<Reply, HandlerError> {
        let quote = self.by_id(ctx).await?;
        Ok(Reply::say(format!(
            "Quote #{} by {} in {}, added by {} on {}.",
            quote.id,
            quote.user,
            quote.channel,
            quote.submitter,
            quote.timestamp.format("%Y-%m-%d %H:%M UTC")
        ))
        .and(format!("Original line: {}", quote.source_text)))
    }

    async fn delete(&self, ctx: &InvocationContext) -> Result<Reply, HandlerError> {
        let id = required_id(ctx)?;
        self.module.ledger.remove(id).await.map_err(ledger_error)?;
        info!(id, by = %ctx.actor(), "Quote deleted");
        Ok(Reply::say(format!("Deleted quote #{id}.")))
    }

    async fn find(&self, ctx: &InvocationContext) -> Result<Reply, HandlerError> {
        let text = required(ctx, "search")?;
        let quote = self
            .module
            .ledger
            .search(text)
            .await
            .map_err(|e| empty_as(e, format!("No quote matches {text}.")))?;

        Ok(Reply::say(quote.to_string()))
    }

    fn import_from(&self, ctx: &InvocationContext) -> Result<Reply, HandlerError> {
        let source = required(ctx, "user")?;

        self.module.sessions.insert(
            Identifier::new(source),
            ImportSession {
                opened_by: ctx.actor().as_str().to_string(),
                opened_at: ctx.received_at(),
                imported: 0,
            },
        );
        info!(source = %source, by = %ctx.actor(), "Import session opened");

        Ok(Reply::none()
            .and_to(
                source,
                format!("{}quote exportlistto {}", self.module.prefix, self.module.bot_nick),
            )
            .and(format!("Asked {source} to send me their quotes.")))
    }

    async fn export_list_to(&self, ctx: &InvocationContext) -> Result<Reply, HandlerError> {
        let receiver = ctx.capture("user").unwrap_or(ctx.actor().as_str());
        let quotes = self
            .module
            .ledger
            .list(&QuoteFilter::All)
            .await
            .map_err(ledger_error)?;

        let mut reply = Reply::none();
        for quote in &quotes {
            let record = serde_json::to_string(&quote.to_new())
                .map_err(|e| HandlerError::Other(e.into()))?;
            reply = reply.and_to(receiver, format!("{}quote import {record}", self.module.prefix));
        }
        reply = reply.and_to(receiver, format!("{}quote importdone", self.module.prefix));

        info!(receiver = %receiver, count = quotes.len(), "Exporting quotes");
        Ok(reply)
    }

    async fn import(&self, ctx: &InvocationContext) -> Result<Reply, HandlerError> {
        let importer = ctx.actor();
        if !self.module.open_session(importer, ctx.received_at()) {
            warn!(nick = %importer, "Rejected quote import without a session");
            return Err(HandlerError::Validation(format!("{importer} is not an importer")));
        }

        let record = required(ctx, "record")?;
        let quote: NewQuote = serde_json::from_str(record)
            .map_err(|e| HandlerError::Validation(format!("Malformed quote record: {e}")))?;

        let id = self
            .module
            .ledger
            .import(&quote)
            .await
            .map_err(ledger_error)?;

        if let Some(mut session) = self.module.sessions.get_mut(importer) {
            session.imported += 1;
        }
        debug!(id, importer = %importer, "Imported quote");
        Ok(Reply::none())
    }

    fn import_done(&self, ctx: &InvocationContext) -> Result<Reply, HandlerError> {
        let importer = ctx.actor();
        let session = self
            .module
            .sessions
            .remove(importer)
            .map(|(_, session)| session)
            .filter(|s| !is_expired(s.opened_at, ctx.received_at(), self.module.session_ttl))
            .ok_or_else(|| HandlerError::Validation(format!("{importer} is not an importer")))?;

        info!(
            importer = %importer,
            opened_by = %session.opened_by,
            imported = session.imported,
            "Import done"
        );
        Ok(Reply::say(format!("Imported {} quotes.", session.imported)))
    }

    async fn by_id(&self, ctx: &InvocationContext) -> Result<Quote, HandlerError> {
        let id = required_id(ctx)?;
        self.module.ledger.get(id).await.map_err(ledger_error)
    }
}

#[async_trait]
impl Handler for QuoteHandler {
    async fn handle(
        &self,
        ctx: &InvocationContext,
        _store: &AttributeStore,
    ) -> Result<Reply, HandlerError> {
        match self.action {
            QuoteAction::Collect => Ok(self.collect(ctx)),
            QuoteAction::Add => self.add(ctx).await,
            QuoteAction::ForceAdd => self.force_add(ctx).await,
            QuoteAction::Random => self.random(ctx).await,
            QuoteAction::List => self.list(ctx).await,
            QuoteAction::Show => self.show(ctx).await,
            QuoteAction::Info => self.info(ctx).await,
            QuoteAction::Delete => self.delete(ctx).await,
            QuoteAction::Find => self.find(ctx).await,
            QuoteAction::ImportFrom => self.import_from(ctx),
            QuoteAction::ExportListTo => self.export_list_to(ctx).await,
            QuoteAction::Import => self.import(ctx).await,
            QuoteAction::ImportDone => self.import_done(ctx),
        }
    }
}

fn required<'a>(ctx: &'a InvocationContext, name: &str) -> Result<&'a str, HandlerError> {
    ctx.capture(name)
        .ok_or_else(|| HandlerError::Validation(format!("Missing {name}.")))
}

fn required_id(ctx: &InvocationContext) -> Result<i64, HandlerError> {
    ctx.parse_capture::<i64>("idx")?
        .ok_or_else(|| HandlerError::Validation("Which quote?".into()))
}

fn no_quotes(user: Option<&str>) -> String {
    match user {
        Some(user) => format!("There are no quotes from {user} in the database."),
        None => "There are no quotes in the database.".to_string(),
    }
}

fn ledger_error(e: LedgerError) -> HandlerError {
    match e {
        LedgerError::NotFound(id) => HandlerError::NotFound(format!("There is no quote #{id}.")),
        LedgerError::Empty => HandlerError::Empty(no_quotes(None)),
        LedgerError::Invalid(reason) => HandlerError::Validation(format!("Rejected quote: {reason}")),
        LedgerError::Storage(e) => HandlerError::Storage(e.to_string()),
    }
}

fn empty_as(e: LedgerError, message: String) -> HandlerError {
    match e {
        LedgerError::Empty => HandlerError::Empty(message),
        other => ledger_error(other),
    }
}

/// Join `items` with `sep` into lines no longer than `max` bytes. An item
/// longer than `max` gets a line of its own.
fn pack(items: impl Iterator<Item = String>, sep: &str, max: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for item in items {
        if !current.is_empty() && current.len() + sep.len() + item.len() > max {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str(sep);
        }
        current.push_str(&item);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn quote_command(prefix: &str, verbs: &str, tail: &str) -> String {
    format!(
        r"(?i)^{}quote\s+(?:{verbs}){tail}\s*$",
        regex::escape(prefix)
    )
}

/// Routes for the quote commands. The line collector comes last and should
/// be registered after every other low-priority route.
pub fn routes(module: Arc<QuoteModule>) -> Result<Vec<Route>, DispatchError> {
    let prefix = module.prefix.clone();
    let p = prefix.as_str();

    // Optional "nick:" / "nick," / "nick" before the quote text.
    let nick_then_quote = r"(?:\s+(?P<user>[^\s:,]+)[:,]?)?\s+(?P<quote>.+?)";
    let optional_nick = r"(?:\s+(?P<user>\S+))?";
    let id = r"\s+(?P<idx>\S+)";

    let handler = |action| Arc::new(QuoteHandler::new(action, module.clone()));

    Ok(vec![
        Route::builder("quote.add", quote_command(p, "add", nick_then_quote))
            .require(Precondition::RequiresChannel)
            .doc(
                CommandDoc::new(GROUP, &["quote add"])
                    .line("Quote something a nick said recently in this channel.")
                    .line("Put the nick first to quote someone else, otherwise you quote yourself.")
                    .line("_ matches any text and [word] marks an optional word.")
                    .example(&format!("{p}quote add Skye: are you a goddess?")),
            )
            .build(handler(QuoteAction::Add))?,
        Route::builder("quote.forceadd", quote_command(p, "forceadd", nick_then_quote))
            .require(Precondition::RequiresChannel)
            .require(Precondition::RequiresAdmin)
            .doc(
                CommandDoc::new(GROUP, &["quote forceadd"])
                    .line("Add a quote without checking it. Admins only.")
                    .example(&format!("{p}quote forceadd RX14: .blame maxpowa")),
            )
            .build(handler(QuoteAction::ForceAdd))?,
        Route::builder("quote.random", quote_command(p, "random", optional_nick))
            .require(Precondition::RequiresChannel)
            .doc(
                CommandDoc::new(GROUP, &["quote random"])
                    .line("Show a random quote, optionally from one nick.")
                    .example(&format!("{p}quote random Vi")),
            )
            .build(handler(QuoteAction::Random))?,
        Route::builder("quote.list", quote_command(p, "list", optional_nick))
            .require(Precondition::RequiresChannel)
            .doc(
                CommandDoc::new(GROUP, &["quote list"])
                    .line("List quotes, optionally from one nick.")
                    .example(&format!("{p}quote list Vi")),
            )
            .build(handler(QuoteAction::List))?,
        Route::builder("quote.show", quote_command(p, "show", id))
            .require(Precondition::RequiresChannel)
            .doc(
                CommandDoc::new(GROUP, &["quote show"])
                    .line("Show a quote by number.")
                    .example(&format!("{p}quote show 43")),
            )
            .build(handler(QuoteAction::Show))?,
        Route::builder("quote.info", quote_command(p, "info", id))
            .require(Precondition::RequiresChannel)
            .doc(
                CommandDoc::new(GROUP, &["quote info"])
                    .line("Show who said and who added a quote, and the line it came from.")
                    .example(&format!("{p}quote info 43")),
            )
            .build(handler(QuoteAction::Info))?,
        Route::builder("quote.delete", quote_command(p, "delete|remove", id))
            .require(Precondition::RequiresChannel)
            .doc(
                CommandDoc::new(GROUP, &["quote delete", "quote remove"])
                    .line("Delete a quote by number.")
                    .example(&format!("{p}quote delete 69")),
            )
            .build(handler(QuoteAction::Delete))?,
        Route::builder("quote.find", quote_command(p, "find|search", r"\s+(?P<search>.+?)"))
            .require(Precondition::RequiresChannel)
            .doc(
                CommandDoc::new(GROUP, &["quote find", "quote search"])
                    .line("Show the most recent quote containing some text.")
                    .example(&format!("{p}quote find lewd")),
            )
            .build(handler(QuoteAction::Find))?,
        Route::builder("quote.importfrom", quote_command(p, "importfrom", r"\s+(?P<user>\S+)"))
            .require(Precondition::RequiresAdmin)
            .doc(
                CommandDoc::new(GROUP, &["quote importfrom"])
                    .line("Copy every quote from another bot. Admins only.")
                    .example(&format!("{p}quote importfrom otherbot")),
            )
            .build(handler(QuoteAction::ImportFrom))?,
        Route::builder("quote.exportlistto", quote_command(p, "exportlistto", optional_nick))
            .require(Precondition::RequiresPrivate)
            .doc(
                CommandDoc::new(GROUP, &["quote exportlistto"])
                    .line("Send every quote to a nick as import lines.")
                    .example(&format!("{p}quote exportlistto otherbot")),
            )
            .build(handler(QuoteAction::ExportListTo))?,
        Route::builder("quote.import", quote_command(p, "import", r"\s+(?P<record>\{.*\})"))
            .priority(Priority::High)
            .require(Precondition::RequiresPrivate)
            .build(handler(QuoteAction::Import))?,
        Route::builder("quote.importdone", quote_command(p, "importdone", ""))
            .priority(Priority::High)
            .require(Precondition::RequiresPrivate)
            .build(handler(QuoteAction::ImportDone))?,
        Route::builder("quote.collect", r"(?s)^.+$")
            .priority(Priority::Low)
            .require(Precondition::RequiresChannel)
            .build(handler(QuoteAction::Collect))?,
    ])
}
