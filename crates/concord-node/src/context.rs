//! One live context on one node.
//!
//! A `Context` wires the context's sync bundle to its `Stage`, keeps the
//! node's vector clock for the context, and fans incoming traffic out to
//! local listeners.
//!
//! Lifecycle is linear: `Created → Initializing → Ready → Disposing →
//! Disposed`. There is no way back; a disposed context is replaced by a new
//! instance.
//!
//! Incoming events only ever `update` the clock. Only `emit` ticks it.

use crate::collaborators::{Activity, Stage};
use async_trait::async_trait;
use concord_core::{
    ConcordError, ContextId, Event, KeyValueEffects, NodeId, PubSubEffects, Result, StateEntry,
    SubscriptionId, VectorClock, VectorClockSnapshot,
};
use concord_sync::{ContextSync, DataStorage, MessageHandler};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, trace, warn, Instrument, Span};

/// Lifecycle position of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed, nothing wired yet
    Created,
    /// `initialize` in progress
    Initializing,
    /// Serving traffic
    Ready,
    /// `dispose` in progress
    Disposing,
    /// Fully released
    Disposed,
}

impl LifecycleState {
    /// Whether the instance can still serve, now or after initialization
    pub fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::Initializing | Self::Ready)
    }
}

/// Local notification kinds a listener can subscribe to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextTopic {
    /// Context became ready
    Init,
    /// Context was disposed
    Dispose,
    /// An event was delivered
    Emit,
    /// A state entry with this key was delivered
    State(String),
}

/// Payload handed to local listeners
#[derive(Debug, Clone, PartialEq)]
pub enum ContextNotification {
    /// Context became ready
    Init,
    /// Context was disposed
    Dispose,
    /// An event was delivered
    Emit(Event),
    /// A state entry was delivered
    State(StateEntry),
}

impl ContextNotification {
    fn matches(&self, topic: &ContextTopic) -> bool {
        match (self, topic) {
            (Self::Init, ContextTopic::Init)
            | (Self::Dispose, ContextTopic::Dispose)
            | (Self::Emit(_), ContextTopic::Emit) => true,
            (Self::State(entry), ContextTopic::State(key)) => entry.key == *key,
            _ => false,
        }
    }
}

/// Token returned by `Context::on`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ContextNotification) + Send + Sync>;

struct ListenerEntry {
    id: ListenerId,
    topic: ContextTopic,
    listener: Listener,
}

#[derive(Default)]
struct InternalSubscriptions {
    events: Option<SubscriptionId>,
    state: Option<SubscriptionId>,
}

/// A context instance living on this node.
pub struct Context {
    id: ContextId,
    context_type: String,
    node_id: NodeId,
    sync: ContextSync,
    stage: Arc<dyn Stage>,
    clock: Mutex<VectorClock>,
    lifecycle: watch::Sender<LifecycleState>,
    listeners: Mutex<Vec<ListenerEntry>>,
    next_listener: AtomicU64,
    activities: Mutex<Vec<(String, Arc<dyn Activity>)>>,
    subscriptions: Mutex<InternalSubscriptions>,
    init_error: Mutex<Option<ConcordError>>,
    span: Span,
}

impl Context {
    /// Build a context bound to the node's adapters
    pub fn new(
        id: ContextId,
        context_type: impl Into<String>,
        node_id: NodeId,
        kv: Arc<dyn KeyValueEffects>,
        pubsub: Arc<dyn PubSubEffects>,
        stage: Arc<dyn Stage>,
    ) -> Arc<Self> {
        let context_type = context_type.into();
        let span = tracing::info_span!(
            "context",
            context_id = %id,
            context_type = %context_type,
            node_id = %node_id,
        );
        let (lifecycle, _) = watch::channel(LifecycleState::Created);

        Arc::new(Self {
            sync: ContextSync::new(id.clone(), kv, pubsub),
            clock: Mutex::new(VectorClock::new(node_id.clone())),
            id,
            context_type,
            node_id,
            stage,
            lifecycle,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            activities: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(InternalSubscriptions::default()),
            init_error: Mutex::new(None),
            span,
        })
    }

    /// Context id
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// Stage type this context was created with
    pub fn context_type(&self) -> &str {
        &self.context_type
    }

    /// Node hosting this instance
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.lifecycle.borrow()
    }

    /// Whether the instance can still serve
    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    /// Snapshot of this node's clock for the context
    pub fn clock(&self) -> VectorClockSnapshot {
        self.clock.lock().snapshot()
    }

    /// Shared per-context key-value storage
    pub fn data(&self) -> &DataStorage {
        self.sync.data()
    }

    /// Underlying sync bundle
    pub fn sync(&self) -> &ContextSync {
        &self.sync
    }

    /// Tracing span carrying the context's id and type
    pub fn span(&self) -> &Span {
        &self.span
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Wire channels, run `Stage::on_init` and become ready.
    ///
    /// On failure everything wired so far is released and the context ends
    /// up `Disposed`.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        self.transition(LifecycleState::Created, LifecycleState::Initializing)?;

        let result = self.wire().instrument(self.span.clone()).await;
        match result {
            Ok(()) => {
                self.notify(&ContextNotification::Init);
                self.lifecycle.send_replace(LifecycleState::Ready);
                debug!(parent: &self.span, "Context ready");
                Ok(())
            }
            Err(e) => {
                warn!(parent: &self.span, error = %e, "Context initialization failed");
                if let Err(cleanup) = self.release(false).instrument(self.span.clone()).await {
                    warn!(
                        parent: &self.span,
                        error = %cleanup,
                        "Cleanup after failed initialization"
                    );
                }
                *self.init_error.lock() = Some(e.clone());
                self.lifecycle.send_replace(LifecycleState::Disposed);
                Err(e)
            }
        }
    }

    async fn wire(self: &Arc<Self>) -> Result<()> {
        self.sync.initialize().await?;

        let weak = Arc::downgrade(self);
        let events = self
            .sync
            .events()
            .subscribe(Arc::new(EventRelay {
                context: weak.clone(),
            }))
            .await?;
        self.subscriptions.lock().events = Some(events);

        let state = self
            .sync
            .state()
            .subscribe(Arc::new(StateRelay { context: weak }))
            .await?;
        self.subscriptions.lock().state = Some(state);

        self.stage
            .on_init(self)
            .await
            .map_err(|e| hook_error("on_init", e))
    }

    /// Tear the context down.
    ///
    /// Every step runs even when an earlier one fails; the first failure is
    /// returned as `DisposeFailure` once all steps ran. Disposing twice is a
    /// no-op, and disposing during initialization waits for it to finish.
    /// Listeners receive `Dispose` and are then dropped.
    pub async fn dispose(self: &Arc<Self>) -> Result<()> {
        let was_ready = loop {
            match self.state() {
                LifecycleState::Disposing | LifecycleState::Disposed => {
                    self.wait_for(|s| s == LifecycleState::Disposed).await;
                    return Ok(());
                }
                LifecycleState::Initializing => {
                    self.wait_until_settled().await;
                }
                current => {
                    if self.transition(current, LifecycleState::Disposing).is_ok() {
                        break current == LifecycleState::Ready;
                    }
                }
            }
        };

        let result = self.release(was_ready).instrument(self.span.clone()).await;
        self.notify(&ContextNotification::Dispose);
        self.listeners.lock().clear();
        self.lifecycle.send_replace(LifecycleState::Disposed);
        debug!(parent: &self.span, "Context disposed");
        result
    }

    async fn release(self: &Arc<Self>, run_stage_hook: bool) -> Result<()> {
        let mut failures: Vec<(String, ConcordError)> = Vec::new();

        let activities: Vec<_> = self.activities.lock().drain(..).collect();
        for (key, activity) in activities {
            if let Err(e) = activity.dispose().await {
                warn!(activity = %key, error = %e, "Activity dispose failed");
                failures.push((format!("activity '{key}'"), e));
            }
        }

        if run_stage_hook {
            if let Err(e) = self.stage.on_dispose(self).await {
                warn!(error = %e, "Stage on_dispose failed");
                failures.push(("stage".to_string(), hook_error("on_dispose", e)));
            }
        }

        let InternalSubscriptions { events, state } =
            std::mem::take(&mut *self.subscriptions.lock());
        if let Some(id) = events {
            if let Err(e) = self.sync.events().unsubscribe(id).await {
                warn!(error = %e, "Event channel unsubscribe failed");
                failures.push(("event channel".to_string(), e));
            }
        }
        if let Some(id) = state {
            if let Err(e) = self.sync.state().unsubscribe(id).await {
                warn!(error = %e, "State channel unsubscribe failed");
                failures.push(("state channel".to_string(), e));
            }
        }

        if let Err(e) = self.sync.dispose().await {
            warn!(error = %e, "Context sync dispose failed");
            failures.push(("context sync".to_string(), e));
        }

        match failures.into_iter().next() {
            Some((resource, e)) => Err(ConcordError::dispose_failure(
                format!("context '{}' {resource}", self.id),
                e.to_string(),
            )),
            None => Ok(()),
        }
    }

    /// Error that made `initialize` fail, if it did
    pub fn initialization_error(&self) -> Option<ConcordError> {
        self.init_error.lock().clone()
    }

    /// Wait until initialization has finished, successfully or not
    pub async fn wait_until_settled(&self) -> LifecycleState {
        self.wait_for(|s| !matches!(s, LifecycleState::Created | LifecycleState::Initializing))
            .await
    }

    async fn wait_for(&self, predicate: impl Fn(LifecycleState) -> bool) -> LifecycleState {
        let mut receiver = self.lifecycle.subscribe();
        let reached = match receiver.wait_for(|s| predicate(*s)).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        reached
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<()> {
        let mut observed = from;
        let moved = self.lifecycle.send_if_modified(|state| {
            observed = *state;
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            Ok(())
        } else {
            Err(ConcordError::invalid_lifecycle(format!(
                "context '{}' cannot move to {to:?} from {observed:?}",
                self.id
            )))
        }
    }

    fn ensure_active(&self, operation: &str) -> Result<()> {
        match self.state() {
            LifecycleState::Initializing | LifecycleState::Ready => Ok(()),
            other => Err(ConcordError::invalid_lifecycle(format!(
                "cannot {operation} on context '{}' in state {other:?}",
                self.id
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Traffic
    // ------------------------------------------------------------------

    /// Publish a new event originating from this node.
    ///
    /// The local copy is processed through the same subscription as remote
    /// events.
    pub async fn emit(&self, event_type: impl Into<String>, payload: Value) -> Result<Event> {
        self.ensure_active("emit")?;
        let snapshot = self.clock.lock().tick();
        let event = Event::new(event_type, payload, snapshot, self.node_id.clone());
        self.sync
            .events()
            .publish(&event)
            .instrument(self.span.clone())
            .await?;
        trace!(
            parent: &self.span,
            event_id = %event.id,
            event_type = %event.event_type,
            "Emitted event"
        );
        Ok(event)
    }

    /// Publish a best-effort state entry
    pub async fn broadcast_state(&self, key: impl Into<String>, data: Value) -> Result<()> {
        self.ensure_active("broadcast state")?;
        let entry = StateEntry::new(key, data);
        self.sync.state().publish(&entry).await
    }

    /// Process an event delivered on the event channel.
    ///
    /// Merges the event's clock, runs `Stage::on_emit` and notifies `Emit`
    /// listeners. Events arriving after disposal started are dropped.
    pub async fn handle_event(self: &Arc<Self>, event: Event) {
        if !matches!(
            self.state(),
            LifecycleState::Initializing | LifecycleState::Ready
        ) {
            trace!(parent: &self.span, event_id = %event.id, "Dropping event for inactive context");
            return;
        }

        self.clock.lock().update(&event.vector_clock);
        if let Err(e) = self.stage.on_emit(self, &event).await {
            warn!(parent: &self.span, event_id = %event.id, error = %e, "Stage on_emit failed");
        }
        self.notify(&ContextNotification::Emit(event));
    }

    /// Process a state entry delivered on the state channel
    pub fn handle_state(&self, entry: StateEntry) {
        if !self.is_live() {
            return;
        }
        self.notify(&ContextNotification::State(entry));
    }

    // ------------------------------------------------------------------
    // Local notifications
    // ------------------------------------------------------------------

    /// Register a listener for `topic`
    pub fn on<F>(&self, topic: ContextTopic, listener: F) -> ListenerId
    where
        F: Fn(&ContextNotification) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(ListenerEntry {
            id,
            topic,
            listener: Arc::new(listener),
        });
        id
    }

    /// Remove a listener; returns whether it was registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        listeners.len() != before
    }

    fn notify(&self, notification: &ContextNotification) {
        let targets: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .filter(|entry| notification.matches(&entry.topic))
            .map(|entry| Arc::clone(&entry.listener))
            .collect();
        for listener in targets {
            listener(notification);
        }
    }

    // ------------------------------------------------------------------
    // Activities
    // ------------------------------------------------------------------

    /// Register an activity under `key`; it is disposed with the context
    pub fn use_activity(&self, key: impl Into<String>, activity: Arc<dyn Activity>) -> Result<()> {
        let key = key.into();
        if !self.is_live() {
            return Err(ConcordError::invalid_lifecycle(format!(
                "cannot register activity '{key}' on context '{}' in state {:?}",
                self.id,
                self.state()
            )));
        }
        let mut activities = self.activities.lock();
        if activities.iter().any(|(existing, _)| *existing == key) {
            return Err(ConcordError::activity_already_registered(key));
        }
        activities.push((key, activity));
        Ok(())
    }

    /// Activity registered under `key`
    pub fn activity(&self, key: &str) -> Option<Arc<dyn Activity>> {
        self.activities
            .lock()
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, activity)| Arc::clone(activity))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("context_type", &self.context_type)
            .field("node_id", &self.node_id)
            .field("state", &self.state())
            .finish()
    }
}

fn hook_error(hook: &str, error: ConcordError) -> ConcordError {
    match error {
        ConcordError::Hook { .. } => error,
        other => ConcordError::hook(hook, other.to_string()),
    }
}

struct EventRelay {
    context: Weak<Context>,
}

#[async_trait]
impl MessageHandler<Event> for EventRelay {
    async fn handle(&self, event: Event) {
        if let Some(context) = self.context.upgrade() {
            let span = context.span.clone();
            context.handle_event(event).instrument(span).await;
        }
    }
}

struct StateRelay {
    context: Weak<Context>,
}

#[async_trait]
impl MessageHandler<StateEntry> for StateRelay {
    async fn handle(&self, entry: StateEntry) {
        if let Some(context) = self.context.upgrade() {
            context.handle_state(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_topic_matching() {
        let state = ContextNotification::State(StateEntry::new("score", json!(1)));
        assert!(state.matches(&ContextTopic::State("score".into())));
        assert!(!state.matches(&ContextTopic::State("chat".into())));
        assert!(!state.matches(&ContextTopic::Emit));
        assert!(ContextNotification::Init.matches(&ContextTopic::Init));
        assert!(!ContextNotification::Init.matches(&ContextTopic::Dispose));
    }

    #[test]
    fn test_liveness_by_state() {
        assert!(LifecycleState::Created.is_live());
        assert!(LifecycleState::Ready.is_live());
        assert!(!LifecycleState::Disposing.is_live());
        assert!(!LifecycleState::Disposed.is_live());
    }
}
