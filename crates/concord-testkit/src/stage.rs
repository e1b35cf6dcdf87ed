//! Recording collaborators.
//!
//! `RecordingStage`, `RecordingActivity` and `RecordingProtocol` count how
//! often each hook ran and can be told to fail, so tests can assert on
//! lifecycle ordering without writing their own doubles.

use async_trait::async_trait;
use concord_core::{ConcordError, Event, Result};
use concord_node::{Activity, Context, NodeHandle, Protocol, Stage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stage that records every hook invocation
#[derive(Debug, Default)]
pub struct RecordingStage {
    init_calls: AtomicUsize,
    dispose_calls: AtomicUsize,
    events: Mutex<Vec<Event>>,
    init_delay: Mutex<Option<Duration>>,
    fail_init: AtomicBool,
    fail_dispose: AtomicBool,
}

impl RecordingStage {
    /// Create a stage with no failures configured
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sleep for `delay` inside `on_init`
    pub fn with_init_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.init_delay.lock() = Some(delay);
        self
    }

    /// Make `on_init` fail
    pub fn fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    /// Make `on_dispose` fail
    pub fn fail_dispose(&self, fail: bool) {
        self.fail_dispose.store(fail, Ordering::SeqCst);
    }

    /// Times `on_init` ran
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Times `on_dispose` ran
    pub fn dispose_calls(&self) -> usize {
        self.dispose_calls.load(Ordering::SeqCst)
    }

    /// Events delivered through `on_emit`, in delivery order
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Types of the delivered events, in delivery order
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|event| event.event_type.clone())
            .collect()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    async fn on_init(&self, context: &Arc<Context>) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.init_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(ConcordError::hook(
                "on_init",
                format!("refusing to initialize '{}'", context.id()),
            ));
        }
        Ok(())
    }

    async fn on_dispose(&self, context: &Arc<Context>) -> Result<()> {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_dispose.load(Ordering::SeqCst) {
            return Err(ConcordError::hook(
                "on_dispose",
                format!("refusing to dispose '{}'", context.id()),
            ));
        }
        Ok(())
    }

    async fn on_emit(&self, _context: &Arc<Context>, event: &Event) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Activity that records disposal
#[derive(Debug, Default)]
pub struct RecordingActivity {
    dispose_calls: AtomicUsize,
    fail_dispose: AtomicBool,
}

impl RecordingActivity {
    /// Activity that disposes cleanly
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Activity whose `dispose` fails
    pub fn failing() -> Arc<Self> {
        let activity = Self::default();
        activity.fail_dispose.store(true, Ordering::SeqCst);
        Arc::new(activity)
    }

    /// Times `dispose` ran
    pub fn dispose_calls(&self) -> usize {
        self.dispose_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Activity for RecordingActivity {
    async fn dispose(&self) -> Result<()> {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_dispose.load(Ordering::SeqCst) {
            return Err(ConcordError::hook("activity.dispose", "injected failure"));
        }
        Ok(())
    }
}

/// Protocol that records start and dispose
#[derive(Debug)]
pub struct RecordingProtocol {
    name: String,
    handle: Mutex<Option<NodeHandle>>,
    dispose_calls: AtomicUsize,
    fail_start: AtomicBool,
    fail_dispose: AtomicBool,
}

impl RecordingProtocol {
    /// Protocol named `name`
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            handle: Mutex::new(None),
            dispose_calls: AtomicUsize::new(0),
            fail_start: AtomicBool::new(false),
            fail_dispose: AtomicBool::new(false),
        })
    }

    /// Make `start` fail
    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Make `dispose` fail
    pub fn fail_dispose(&self, fail: bool) {
        self.fail_dispose.store(fail, Ordering::SeqCst);
    }

    /// Handle received in `start`
    pub fn node_handle(&self) -> Option<NodeHandle> {
        self.handle.lock().clone()
    }

    /// Times `dispose` ran
    pub fn dispose_calls(&self) -> usize {
        self.dispose_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Protocol for RecordingProtocol {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, node: NodeHandle) -> Result<()> {
        *self.handle.lock() = Some(node);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ConcordError::hook("start", "injected failure"));
        }
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_dispose.load(Ordering::SeqCst) {
            return Err(ConcordError::hook("dispose", "injected failure"));
        }
        Ok(())
    }
}
