//! Help command - lists commands and shows their documentation.

use async_trait::async_trait;
use attribute_store::AttributeStore;
use chat_dispatch::{
    command_pattern, CommandCatalog, CommandDoc, DispatchError, Handler, HandlerError,
    InvocationContext, Priority, Reply, Route,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const GROUP: &str = "help";

/// Docs longer than this many lines go to the asker privately.
const PRIVATE_THRESHOLD: usize = 3;

/// Minimum width of the group column in the command list.
const MIN_GROUP_WIDTH: usize = 6;

pub struct HelpHandler {
    catalog: CommandCatalog,
    prefix: String,
}

impl HelpHandler {
    pub fn new(catalog: CommandCatalog, prefix: &str) -> Self {
        Self {
            catalog,
            prefix: prefix.to_string(),
        }
    }

    fn list(&self) -> Reply {
        let docs = self.catalog.read();

        let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for doc in docs.iter() {
            let names = groups.entry(doc.group.as_str()).or_default();
            if !names.contains(&doc.name()) {
                names.push(doc.name());
            }
        }

        let width = groups
            .keys()
            .map(|g| g.len())
            .max()
            .unwrap_or(0)
            .max(MIN_GROUP_WIDTH);

        let reply: Reply = groups
            .iter()
            .map(|(group, names)| {
                format!("{:<width$}  {}", group.to_uppercase(), names.join("  "))
            })
            .collect();

        reply.and(format!(
            "You can see more info about any of these commands by doing {p}help <command> (e.g. {p}help time)",
            p = self.prefix
        ))
    }

    fn show(&self, ctx: &InvocationContext, name: &str) -> Result<Reply, HandlerError> {
        let name = name.trim_end_matches('?');
        let doc = {
            let docs = self.catalog.read();
            docs.iter().find(|d| d.answers_to(name)).cloned()
        };
        let doc = doc.ok_or_else(|| {
            HandlerError::NotFound(format!("I don't know a command called {name}."))
        })?;

        let mut lines = doc.doc.clone();
        if let Some(example) = &doc.example {
            lines.push(format!("e.g. {example}"));
        }

        if lines.len() <= PRIVATE_THRESHOLD || ctx.is_private() {
            return Ok(lines.into_iter().collect());
        }

        let nick = ctx.actor().as_str();
        let reply = Reply::say(
            "The documentation for this command is too long; I'm sending it to you in a private message.",
        );
        Ok(lines
            .into_iter()
            .fold(reply, |reply, line| reply.and_to(nick, line)))
    }
}

#[async_trait]
impl Handler for HelpHandler {
    async fn handle(
        &self,
        ctx: &InvocationContext,
        _store: &AttributeStore,
    ) -> Result<Reply, HandlerError> {
        match ctx.capture("args") {
            Some(name) => self.show(ctx, name),
            None => Ok(self.list()),
        }
    }
}

/// `version`, and `info` which adds a short description.
struct AboutHandler {
    nick: String,
    prefix: String,
    info: bool,
}

#[async_trait]
impl Handler for AboutHandler {
    async fn handle(
        &self,
        _ctx: &InvocationContext,
        _store: &AttributeStore,
    ) -> Result<Reply, HandlerError> {
        let version = format!("{} - version {}", self.nick, env!("CARGO_PKG_VERSION"));
        if !self.info {
            return Ok(Reply::say(version));
        }

        Ok(Reply::say(format!(
            "{version} - a chat bot that keeps time zones and quotes for its channels."
        ))
        .and(format!(
            "For a list of commands, use '{}commands' with no parameters.",
            self.prefix
        )))
    }
}

/// Routes for help, version and info. `catalog` is read on every request, so
/// routes registered later still show up.
pub fn routes(prefix: &str, nick: &str, catalog: CommandCatalog) -> Result<Vec<Route>, DispatchError> {
    let help = Arc::new(HelpHandler::new(catalog, prefix));

    Ok(vec![
        Route::builder("help.help", command_pattern(prefix, &["help", "commands"]))
            .priority(Priority::Low)
            .doc(
                CommandDoc::new(GROUP, &["help", "commands"])
                    .line("Shows a command's documentation, and possibly an example.")
                    .example(&format!("{prefix}help time")),
            )
            .build(help.clone())?,
        Route::builder(
            "help.addressed",
            format!(
                r"(?i)^{}[:,]?\s+(?:help|doc)\s+(?P<args>[A-Za-z]+)\??\s*$",
                regex::escape(nick)
            ),
        )
        .priority(Priority::Low)
        .build(help)?,
        Route::builder("help.version", command_pattern(prefix, &["version"]))
            .doc(CommandDoc::new(GROUP, &["version"]).line("Shows the bot's version."))
            .build(Arc::new(AboutHandler {
                nick: nick.to_string(),
                prefix: prefix.to_string(),
                info: false,
            }))?,
        Route::builder("help.info", command_pattern(prefix, &["info"]))
            .priority(Priority::Low)
            .doc(
                CommandDoc::new(GROUP, &["info"])
                    .line("Tells you what the bot is and where to find its commands.")
                    .example(&format!("{prefix}info")),
            )
            .build(Arc::new(AboutHandler {
                nick: nick.to_string(),
                prefix: prefix.to_string(),
                info: true,
            }))?,
    ])
}
