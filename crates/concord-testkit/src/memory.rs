//! In-memory adapter handlers.
//!
//! Both handlers model a cluster-shared backend: the store (or bus) itself
//! lives behind an `Arc`, and every simulated node gets its own `handle()`
//! onto it. Disposing a handle only affects that handle, exactly like closing
//! one client connection to a real backend.

use async_trait::async_trait;
use concord_core::{
    BrokerError, KeyValueEffects, PubSubEffects, StorageError, Subscription, SubscriptionId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

// ============================================================================
// Key-value store
// ============================================================================

/// In-memory key-value store shared by every handle created from it
#[derive(Debug, Clone)]
pub struct MemoryKeyValueStore {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    disposed: Arc<AtomicBool>,
}

impl MemoryKeyValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// New client handle onto the same data
    pub fn handle(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Every stored key, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether this handle has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<(), StorageError> {
        if self.is_disposed() {
            return Err(StorageError::Unavailable {
                reason: "memory store handle disposed".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueEffects for MemoryKeyValueStore {
    async fn initialize(&self) -> Result<(), StorageError> {
        self.ensure_live()
    }

    async fn dispose(&self) -> Result<(), StorageError> {
        self.disposed.store(true, Ordering::Release);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.ensure_live()?;
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.ensure_live()?;
        let mut data = self.data.write().await;
        data.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.ensure_live()?;
        let mut data = self.data.write().await;
        Ok(data.remove(key).is_some())
    }

    async fn savenx(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
        self.ensure_live()?;
        let mut data = self.data.write().await;
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value);
        Ok(true)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        self.ensure_live()?;
        let data = self.data.read().await;
        Ok(data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

// ============================================================================
// Publish/subscribe bus
// ============================================================================

#[derive(Debug, Default)]
struct BusRegistry {
    /// Subscribers by topic
    topics: HashMap<String, HashMap<SubscriptionId, mpsc::UnboundedSender<Vec<u8>>>>,
    /// Publish count by topic
    published: HashMap<String, usize>,
}

impl BusRegistry {
    fn remove(&mut self, topic: &str, id: SubscriptionId) {
        if let Some(subscribers) = self.topics.get_mut(topic) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                self.topics.remove(topic);
            }
        }
    }
}

/// In-memory pub/sub bus fanning every publish out to all subscribers
#[derive(Debug, Clone)]
pub struct MemoryPubSub {
    registry: Arc<RwLock<BusRegistry>>,
    owned: Arc<Mutex<HashMap<SubscriptionId, String>>>,
    disposed: Arc<AtomicBool>,
}

impl MemoryPubSub {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(BusRegistry::default())),
            owned: Arc::new(Mutex::new(HashMap::new())),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// New client handle onto the same bus
    pub fn handle(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            owned: Arc::new(Mutex::new(HashMap::new())),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribers currently attached to `topic` across all handles
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.registry
            .read()
            .await
            .topics
            .get(topic)
            .map_or(0, HashMap::len)
    }

    /// Messages published on `topic` across all handles
    pub async fn published_count(&self, topic: &str) -> usize {
        self.registry
            .read()
            .await
            .published
            .get(topic)
            .copied()
            .unwrap_or(0)
    }

    /// Subscriptions held by this handle
    pub fn owned_subscriptions(&self) -> usize {
        self.owned.lock().len()
    }

    /// Whether this handle has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<(), BrokerError> {
        if self.is_disposed() {
            return Err(BrokerError::Unavailable {
                reason: "memory bus handle disposed".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubEffects for MemoryPubSub {
    async fn initialize(&self) -> Result<(), BrokerError> {
        self.ensure_live()
    }

    async fn dispose(&self) -> Result<(), BrokerError> {
        self.disposed.store(true, Ordering::Release);
        let owned: Vec<(SubscriptionId, String)> = self.owned.lock().drain().collect();
        let mut registry = self.registry.write().await;
        for (id, topic) in owned {
            registry.remove(&topic, id);
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.ensure_live()?;
        let mut registry = self.registry.write().await;
        *registry.published.entry(topic.to_string()).or_insert(0) += 1;

        let closed: Vec<SubscriptionId> = registry
            .topics
            .get(topic)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .filter(|(_, tx)| tx.send(payload.clone()).is_err())
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default();
        for id in closed {
            registry.remove(topic, id);
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError> {
        self.ensure_live()?;
        let (tx, receiver) = mpsc::unbounded_channel();
        let id = SubscriptionId::new();

        let mut registry = self.registry.write().await;
        registry
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(id, tx);
        self.owned.lock().insert(id, topic.to_string());

        Ok(Subscription { id, receiver })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BrokerError> {
        self.ensure_live()?;
        let Some(topic) = self.owned.lock().remove(&id) else {
            return Ok(());
        };
        self.registry.write().await.remove(&topic, id);
        Ok(())
    }
}
