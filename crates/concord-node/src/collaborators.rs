//! Application-supplied collaborators.
//!
//! - `Stage`: behavior of one context type, called on lifecycle and event
//!   hooks of every context of that type
//! - `Activity`: extension registered on a context, torn down with it
//! - `Protocol`: network front-end bound to the node, e.g. a websocket server
//!
//! Hook failures are reported as `ConcordError::Hook`.

use crate::context::Context;
use crate::node::NodeHandle;
use async_trait::async_trait;
use concord_core::{Event, Result};
use std::sync::Arc;

/// Behavior attached to every context of one type.
///
/// All hooks default to no-ops.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Context finished wiring its channels and is about to become ready
    async fn on_init(&self, _context: &Arc<Context>) -> Result<()> {
        Ok(())
    }

    /// Context is being disposed
    async fn on_dispose(&self, _context: &Arc<Context>) -> Result<()> {
        Ok(())
    }

    /// An event (local or remote) was delivered to the context
    async fn on_emit(&self, _context: &Arc<Context>, _event: &Event) -> Result<()> {
        Ok(())
    }
}

/// Extension owned by a context.
#[async_trait]
pub trait Activity: Send + Sync {
    /// Release everything the activity holds
    async fn dispose(&self) -> Result<()>;
}

/// Network-facing front-end enabled on a node.
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Start serving; `node` stays valid for as long as the node is alive
    async fn start(&self, node: NodeHandle) -> Result<()>;

    /// Stop serving and release resources
    async fn dispose(&self) -> Result<()>;
}
