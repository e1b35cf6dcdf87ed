//! Synchronization bundle for one context on one node.
//!
//! Groups the event channel, the state channel and the scoped data storage of
//! a context. One live instance exists per (node, context).

use crate::channels::{context_topic, EventBroker, StateBroker, EVENTS_CHANNEL, STATE_CHANNEL};
use crate::storage::DataStorage;
use concord_core::{ConcordError, ContextId, KeyValueEffects, PubSubEffects, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncPhase {
    Created,
    Ready,
    Disposed,
}

/// Event channel, state channel and data storage of one context.
#[derive(Debug)]
pub struct ContextSync {
    context_id: ContextId,
    events: EventBroker,
    state: StateBroker,
    data: DataStorage,
    phase: Mutex<SyncPhase>,
}

impl ContextSync {
    /// Bind the context's channels and storage to the given adapters
    pub fn new(
        context_id: ContextId,
        kv: Arc<dyn KeyValueEffects>,
        pubsub: Arc<dyn PubSubEffects>,
    ) -> Self {
        Self {
            events: EventBroker::new(
                Arc::clone(&pubsub),
                context_topic(&context_id, EVENTS_CHANNEL),
            ),
            state: StateBroker::new(pubsub, context_topic(&context_id, STATE_CHANNEL)),
            data: DataStorage::new(kv, context_id.clone()),
            context_id,
            phase: Mutex::new(SyncPhase::Created),
        }
    }

    /// Context this bundle belongs to
    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    /// Causally ordered event channel
    pub fn events(&self) -> &EventBroker {
        &self.events
    }

    /// Best-effort state channel
    pub fn state(&self) -> &StateBroker {
        &self.state
    }

    /// Scoped key-value storage
    pub fn data(&self) -> &DataStorage {
        &self.data
    }

    /// Prepare the bundle for use; fails when called twice.
    pub async fn initialize(&self) -> Result<()> {
        let mut phase = self.phase.lock();
        match *phase {
            SyncPhase::Created => {
                *phase = SyncPhase::Ready;
                debug!(context_id = %self.context_id, "Context sync ready");
                Ok(())
            }
            other => Err(ConcordError::invalid_lifecycle(format!(
                "context sync '{}' cannot initialize from {other:?}",
                self.context_id
            ))),
        }
    }

    /// Release both channels and the storage handle.
    ///
    /// Idempotent and safe after a partial `initialize`. Every release is
    /// attempted; the first failure is reported as `DisposeFailure`.
    pub async fn dispose(&self) -> Result<()> {
        {
            let mut phase = self.phase.lock();
            if *phase == SyncPhase::Disposed {
                return Ok(());
            }
            *phase = SyncPhase::Disposed;
        }

        let mut first_error: Option<ConcordError> = None;
        for (channel, result) in [
            (EVENTS_CHANNEL, self.events.dispose().await),
            (STATE_CHANNEL, self.state.dispose().await),
        ] {
            if let Err(e) = result {
                warn!(context_id = %self.context_id, channel, error = %e, "Channel dispose failed");
                first_error.get_or_insert(e);
            }
        }
        self.data.release();

        match first_error {
            Some(e) => Err(ConcordError::dispose_failure(
                format!("context sync '{}'", self.context_id),
                e.to_string(),
            )),
            None => Ok(()),
        }
    }

    /// Whether `initialize` succeeded and `dispose` has not run
    pub fn is_ready(&self) -> bool {
        *self.phase.lock() == SyncPhase::Ready
    }
}
