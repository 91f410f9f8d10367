//! Trigger-routing dispatcher.

use crate::context::{Envelope, InvocationContext};
use crate::error::{DispatchError, HandlerError, GENERIC_FAILURE};
use crate::reply::Reply;
use crate::route::{CommandDoc, Route};
use attribute_store::AttributeStore;
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared, read-only view of registered command docs.
pub type CommandCatalog = Arc<RwLock<Vec<CommandDoc>>>;

/// Outcome of dispatching one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// No route matched, or every matching route failed a precondition.
    NoMatch,
    Handled { route: String, reply: Reply },
}

impl Dispatch {
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            Dispatch::NoMatch => None,
            Dispatch::Handled { reply, .. } => Some(reply),
        }
    }

    pub fn route(&self) -> Option<&str> {
        match self {
            Dispatch::NoMatch => None,
            Dispatch::Handled { route, .. } => Some(route),
        }
    }
}

/// Routes each line to at most one handler.
///
/// Routes are kept sorted by priority (highest first); routes of equal
/// priority keep registration order. The first route whose pattern matches
/// and whose preconditions all pass is run.
pub struct Dispatcher {
    routes: Vec<Route>,
    store: Arc<AttributeStore>,
    catalog: CommandCatalog,
}

impl Dispatcher {
    pub fn new(store: Arc<AttributeStore>) -> Self {
        Self {
            routes: Vec::new(),
            store,
            catalog: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a route. Fails when a route with the same pattern, priority and
    /// precondition set is already registered.
    pub fn register(&mut self, route: Route) -> Result<(), DispatchError> {
        if let Some(existing) = self
            .routes
            .iter()
            .find(|r| r.signature() == route.signature())
        {
            return Err(DispatchError::DuplicateRoute {
                name: route.name.clone(),
                existing: existing.name.clone(),
            });
        }

        if let Some(doc) = &route.doc {
            self.catalog.write().push(doc.clone());
        }

        let at = self
            .routes
            .partition_point(|r| r.priority >= route.priority);
        debug!(route = %route.name, priority = ?route.priority, "Registered route");
        self.routes.insert(at, route);
        Ok(())
    }

    /// Register several routes, stopping at the first failure.
    pub fn register_all(
        &mut self,
        routes: impl IntoIterator<Item = Route>,
    ) -> Result<(), DispatchError> {
        routes.into_iter().try_for_each(|r| self.register(r))
    }

    /// Handle one incoming line.
    pub async fn dispatch(&self, raw_text: &str, envelope: &Envelope) -> Dispatch {
        for route in &self.routes {
            let Some(captures) = route.pattern.captures(raw_text) else {
                continue;
            };

            if let Some(failed) = route.preconditions.iter().find(|p| !p.check(envelope)) {
                debug!(route = %route.name, precondition = ?failed, "Precondition failed, skipping");
                continue;
            }

            let captures: HashMap<String, String> = route
                .pattern
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|m| (name.to_string(), m.as_str().to_string()))
                })
                .collect();

            let ctx = InvocationContext::new(raw_text, envelope, captures);
            let reply = self.invoke(route, &ctx).await;

            return Dispatch::Handled {
                route: route.name.clone(),
                reply,
            };
        }

        Dispatch::NoMatch
    }

    async fn invoke(&self, route: &Route, ctx: &InvocationContext) -> Reply {
        let outcome = AssertUnwindSafe(route.handler.handle(ctx, &self.store))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                match &e {
                    HandlerError::Validation(_) | HandlerError::NotFound(_) | HandlerError::Empty(_) => {
                        info!(route = %route.name, input = %ctx.raw_text(), "Handler declined: {}", e)
                    }
                    HandlerError::Timeout(_) => {
                        warn!(route = %route.name, input = %ctx.raw_text(), "Handler timed out: {}", e)
                    }
                    _ => error!(route = %route.name, input = %ctx.raw_text(), "Handler error: {}", e),
                }
                Reply::say(e.user_message().unwrap_or_else(|| GENERIC_FAILURE.to_string()))
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(route = %route.name, input = %ctx.raw_text(), "Handler panicked: {}", detail);
                Reply::say(GENERIC_FAILURE)
            }
        }
    }

    /// Command docs of every registered route, in registration order.
    pub fn catalog(&self) -> CommandCatalog {
        self.catalog.clone()
    }

    /// Route names in dispatch order.
    pub fn route_names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn store(&self) -> &Arc<AttributeStore> {
        &self.store
    }
}
