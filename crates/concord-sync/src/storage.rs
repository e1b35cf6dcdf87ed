//! Key-value view scoped to one context.
//!
//! Keys are stored as `ctx:{len}:{contextId}:data:{key}`. The length prefix
//! makes the namespace of one context unreachable from any other context,
//! even when context ids contain the separator.

use concord_core::{ConcordError, ContextId, KeyValueEffects, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Per-context data storage; last writer wins.
pub struct DataStorage {
    kv: Arc<dyn KeyValueEffects>,
    context_id: ContextId,
    prefix: String,
    released: AtomicBool,
}

impl DataStorage {
    /// Create a view of `context_id`'s namespace
    pub fn new(kv: Arc<dyn KeyValueEffects>, context_id: ContextId) -> Self {
        let prefix = format!("ctx:{}:{}:data:", context_id.as_str().len(), context_id);
        Self {
            kv,
            context_id,
            prefix,
            released: AtomicBool::new(false),
        }
    }

    /// Context this storage belongs to
    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    /// Read and decode a value
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.get_typed(key).await
    }

    /// Store a value, replacing any previous one
    pub async fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.set_typed(key, value).await
    }

    /// Remove a value; returns whether it existed
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.kv.delete(&self.storage_key(key)).await?)
    }

    /// Read a value and deserialize it into `T`
    pub async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.ensure_open()?;
        match self.kv.get(&self.storage_key(key)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` and store it
    pub async fn set_typed<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        self.ensure_open()?;
        let bytes = serde_json::to_vec(value)?;
        Ok(self.kv.set(&self.storage_key(key), bytes).await?)
    }

    /// Every key currently stored for this context
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let entries = self.kv.scan(&self.prefix).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, _)| key.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    /// Remove every entry of this context; returns how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        self.ensure_open()?;
        let entries = self.kv.scan(&self.prefix).await?;
        let mut removed = 0;
        for (key, _) in entries {
            if self.kv.delete(&key).await? {
                removed += 1;
            }
        }
        debug!(context_id = %self.context_id, removed, "Cleared context data");
        Ok(removed)
    }

    /// Detach this handle; later calls fail with `InvalidLifecycle`.
    ///
    /// Stored data is left in place.
    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    /// Whether `release` has been called
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_released() {
            return Err(ConcordError::invalid_lifecycle(format!(
                "data storage of context '{}' has been released",
                self.context_id
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for DataStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStorage")
            .field("context_id", &self.context_id)
            .field("released", &self.is_released())
            .finish()
    }
}
