//! Trigger routing for chat commands.
//!
//! A [`Dispatcher`] holds [`Route`]s sorted by priority. Each incoming line is
//! matched against them in order and at most one handler runs. Handler
//! failures never escape: they are logged and turned into a single reply line.

mod context;
mod dispatcher;
mod error;
mod handler;
mod reply;
mod route;

pub use context::{Envelope, InvocationContext, Privilege};
pub use dispatcher::{CommandCatalog, Dispatch, Dispatcher};
pub use error::{DispatchError, HandlerError, GENERIC_FAILURE};
pub use handler::Handler;
pub use reply::{Reply, ReplyLine};
pub use route::{command_pattern, CommandDoc, Precondition, Priority, Route, RouteBuilder};
