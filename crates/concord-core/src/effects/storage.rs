//! Key-value storage effect interface.
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: backend adapter crates; in-memory handler in `concord-testkit`
//! - **Usage**: context registry and per-context data storage

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Storage operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum StorageError {
    /// Backend cannot be reached or has been disposed
    #[error("Storage unavailable: {reason}")]
    Unavailable {
        /// Reason the backend is unavailable
        reason: String,
    },
    /// Read failed
    #[error("Read failed: {0}")]
    ReadFailed(String),
    /// Write failed
    #[error("Write failed: {0}")]
    WriteFailed(String),
    /// Delete failed
    #[error("Delete failed: {0}")]
    DeleteFailed(String),
    /// Key rejected by the backend
    #[error("Invalid key: {reason}")]
    InvalidKey {
        /// Reason the key was rejected
        reason: String,
    },
}

/// Shared key-value storage visible to every node of the cluster.
///
/// There is no client-side locking: the last writer wins, except for
/// `savenx`, which must be an atomic create-if-absent across the whole
/// cluster.
#[async_trait]
pub trait KeyValueEffects: Send + Sync {
    /// Prepare the backend for use
    async fn initialize(&self) -> Result<(), StorageError>;

    /// Release backend resources held by this handle
    async fn dispose(&self) -> Result<(), StorageError>;

    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Remove a value; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Atomically store `value` only if `key` is absent.
    ///
    /// Returns `true` iff this call created the entry. Exactly one of any
    /// number of concurrent callers for the same key observes `true`.
    async fn savenx(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError>;

    /// All entries whose key starts with `prefix`, in no particular order
    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;
}

/// Blanket implementation for Arc<T> where T: KeyValueEffects
#[async_trait]
impl<T: KeyValueEffects + ?Sized> KeyValueEffects for Arc<T> {
    async fn initialize(&self) -> Result<(), StorageError> {
        (**self).initialize().await
    }

    async fn dispose(&self) -> Result<(), StorageError> {
        (**self).dispose().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        (**self).delete(key).await
    }

    async fn savenx(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
        (**self).savenx(key, value).await
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        (**self).scan(prefix).await
    }
}
