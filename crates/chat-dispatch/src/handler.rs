//! Handler trait.

use crate::context::InvocationContext;
use crate::error::HandlerError;
use crate::reply::Reply;
use async_trait::async_trait;
use attribute_store::AttributeStore;

/// Code run when a route fires.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one matched line.
    async fn handle(
        &self,
        ctx: &InvocationContext,
        store: &AttributeStore,
    ) -> Result<Reply, HandlerError>;
}
