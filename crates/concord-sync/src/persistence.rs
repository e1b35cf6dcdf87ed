//! Cluster-wide context registry and control channel.
//!
//! The registry is the single source of truth for context existence: a
//! `ContextRecord` is present iff the context is alive somewhere in the
//! cluster. Creation goes through the adapter's atomic `savenx`, so exactly
//! one concurrent creator wins.
//!
//! The control channel carries cluster broadcasts such as `destroy`.

use crate::channels::{ControlBroker, CONTROL_TOPIC};
use concord_core::{
    Codec, ConcordError, ContextId, ContextRecord, JsonCodec, KeyValueEffects, PubSubEffects,
    Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key prefix of registry entries
pub const REGISTRY_NAMESPACE: &str = "registry:contexts:";

/// Registry of every live context in the cluster.
pub struct ContextRegistry {
    kv: Arc<dyn KeyValueEffects>,
    codec: JsonCodec<ContextRecord>,
    closed: AtomicBool,
}

impl ContextRegistry {
    /// Create a registry over the shared store
    pub fn new(kv: Arc<dyn KeyValueEffects>) -> Self {
        Self {
            kv,
            codec: JsonCodec::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn key(id: &ContextId) -> String {
        format!("{REGISTRY_NAMESPACE}{id}")
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConcordError::invalid_lifecycle(
                "context registry has been released",
            ));
        }
        Ok(())
    }

    /// Store `record` under `id` only if no record exists.
    ///
    /// Returns `true` iff this call created the record.
    pub async fn savenx(&self, id: &ContextId, record: &ContextRecord) -> Result<bool> {
        self.ensure_open()?;
        let bytes = self.codec.encode(record)?;
        Ok(self.kv.savenx(&Self::key(id), bytes).await?)
    }

    /// Look up the record of `id`
    pub async fn get(&self, id: &ContextId) -> Result<Option<ContextRecord>> {
        self.ensure_open()?;
        match self.kv.get(&Self::key(id)).await? {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove the record of `id`; returns whether it existed
    pub async fn delete(&self, id: &ContextId) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.kv.delete(&Self::key(id)).await?)
    }

    /// Snapshot of every record, in no particular order.
    ///
    /// Entries that fail to decode are skipped with a warning.
    pub async fn get_all(&self) -> Result<Vec<ContextRecord>> {
        self.ensure_open()?;
        let entries = self.kv.scan(REGISTRY_NAMESPACE).await?;
        let mut records = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match self.codec.decode(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable registry entry"),
            }
        }
        Ok(records)
    }

    async fn open(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.kv.scan(REGISTRY_NAMESPACE).await?.len())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

/// Node-level persistence: the context registry plus the control channel.
#[derive(Debug)]
pub struct NodePersistence {
    contexts: ContextRegistry,
    events: ControlBroker,
    disposed: AtomicBool,
}

impl NodePersistence {
    /// Bind the registry and control channel to the given adapters
    pub fn new(kv: Arc<dyn KeyValueEffects>, pubsub: Arc<dyn PubSubEffects>) -> Self {
        Self {
            contexts: ContextRegistry::new(kv),
            events: ControlBroker::new(pubsub, CONTROL_TOPIC),
            disposed: AtomicBool::new(false),
        }
    }

    /// Open the registry namespace.
    pub async fn initialize(&self) -> Result<()> {
        let known = self.contexts.open().await?;
        debug!(known_contexts = known, "Node persistence initialized");
        Ok(())
    }

    /// Cluster context registry
    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    /// Cluster control channel
    pub fn events(&self) -> &ControlBroker {
        &self.events
    }

    /// Remove every control subscription and release the registry.
    ///
    /// Idempotent.
    pub async fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self.events.dispose().await;
        self.contexts.close();
        result.map_err(|e| ConcordError::dispose_failure("node persistence", e.to_string()))
    }
}
