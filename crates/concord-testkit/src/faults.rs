//! Fault-injecting adapter wrappers.
//!
//! Wrap any adapter and make selected operations fail on demand, to exercise
//! error propagation and best-effort teardown paths.

use async_trait::async_trait;
use concord_core::{
    BrokerError, KeyValueEffects, PubSubEffects, StorageError, Subscription, SubscriptionId,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Key-value operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KvOp {
    /// `initialize`
    Initialize,
    /// `dispose`
    Dispose,
    /// `get`
    Get,
    /// `set`
    Set,
    /// `delete`
    Delete,
    /// `savenx`
    Savenx,
    /// `scan`
    Scan,
}

/// Broker operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerOp {
    /// `initialize`
    Initialize,
    /// `dispose`
    Dispose,
    /// `publish`
    Publish,
    /// `subscribe`
    Subscribe,
    /// `unsubscribe`
    Unsubscribe,
}

/// Key-value store that fails the operations it is told to
pub struct FailingKeyValueStore {
    inner: Arc<dyn KeyValueEffects>,
    failing: Mutex<HashSet<KvOp>>,
}

impl FailingKeyValueStore {
    /// Wrap `inner`; nothing fails until `fail` is called
    pub fn new(inner: Arc<dyn KeyValueEffects>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make `op` fail from now on
    pub fn fail(&self, op: KvOp) -> &Self {
        self.failing.lock().insert(op);
        self
    }

    /// Let `op` succeed again
    pub fn heal(&self, op: KvOp) -> &Self {
        self.failing.lock().remove(&op);
        self
    }

    fn check(&self, op: KvOp) -> Result<(), StorageError> {
        if !self.failing.lock().contains(&op) {
            return Ok(());
        }
        let reason = format!("injected {op:?} failure");
        Err(match op {
            KvOp::Initialize | KvOp::Dispose => StorageError::Unavailable { reason },
            KvOp::Get | KvOp::Scan => StorageError::ReadFailed(reason),
            KvOp::Set | KvOp::Savenx => StorageError::WriteFailed(reason),
            KvOp::Delete => StorageError::DeleteFailed(reason),
        })
    }
}

#[async_trait]
impl KeyValueEffects for FailingKeyValueStore {
    async fn initialize(&self) -> Result<(), StorageError> {
        self.check(KvOp::Initialize)?;
        self.inner.initialize().await
    }

    async fn dispose(&self) -> Result<(), StorageError> {
        self.check(KvOp::Dispose)?;
        self.inner.dispose().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check(KvOp::Get)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.check(KvOp::Set)?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.check(KvOp::Delete)?;
        self.inner.delete(key).await
    }

    async fn savenx(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
        self.check(KvOp::Savenx)?;
        self.inner.savenx(key, value).await
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        self.check(KvOp::Scan)?;
        self.inner.scan(prefix).await
    }
}

/// Pub/sub bus that fails the operations it is told to
pub struct FailingPubSub {
    inner: Arc<dyn PubSubEffects>,
    failing: Mutex<HashSet<BrokerOp>>,
}

impl FailingPubSub {
    /// Wrap `inner`; nothing fails until `fail` is called
    pub fn new(inner: Arc<dyn PubSubEffects>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make `op` fail from now on
    pub fn fail(&self, op: BrokerOp) -> &Self {
        self.failing.lock().insert(op);
        self
    }

    /// Let `op` succeed again
    pub fn heal(&self, op: BrokerOp) -> &Self {
        self.failing.lock().remove(&op);
        self
    }

    fn injected(&self, op: BrokerOp) -> Option<String> {
        self.failing
            .lock()
            .contains(&op)
            .then(|| format!("injected {op:?} failure"))
    }

    fn check(&self, op: BrokerOp, topic: &str) -> Result<(), BrokerError> {
        let Some(reason) = self.injected(op) else {
            return Ok(());
        };
        let topic = topic.to_string();
        Err(match op {
            BrokerOp::Initialize | BrokerOp::Dispose | BrokerOp::Unsubscribe => {
                BrokerError::Unavailable { reason }
            }
            BrokerOp::Publish => BrokerError::PublishFailed { topic, reason },
            BrokerOp::Subscribe => BrokerError::SubscribeFailed { topic, reason },
        })
    }
}

#[async_trait]
impl PubSubEffects for FailingPubSub {
    async fn initialize(&self) -> Result<(), BrokerError> {
        self.check(BrokerOp::Initialize, "")?;
        self.inner.initialize().await
    }

    async fn dispose(&self) -> Result<(), BrokerError> {
        self.check(BrokerOp::Dispose, "")?;
        self.inner.dispose().await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.check(BrokerOp::Publish, topic)?;
        self.inner.publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError> {
        self.check(BrokerOp::Subscribe, topic)?;
        self.inner.subscribe(topic).await
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BrokerError> {
        if let Some(reason) = self.injected(BrokerOp::Unsubscribe) {
            return Err(BrokerError::UnsubscribeFailed { id, reason });
        }
        self.inner.unsubscribe(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryKeyValueStore, MemoryPubSub};

    #[tokio::test]
    async fn test_unsubscribe_failure_names_the_subscription() {
        let bus = FailingPubSub::new(Arc::new(MemoryPubSub::new()));
        let subscription = bus.subscribe("t").await.unwrap();
        bus.fail(BrokerOp::Unsubscribe);

        let err = bus.unsubscribe(subscription.id).await.unwrap_err();

        assert!(matches!(
            err,
            BrokerError::UnsubscribeFailed { id, .. } if id == subscription.id
        ));
        bus.heal(BrokerOp::Unsubscribe);
        assert!(bus.unsubscribe(subscription.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_healed_operation_reaches_the_inner_store() {
        let store = FailingKeyValueStore::new(Arc::new(MemoryKeyValueStore::new()));
        store.fail(KvOp::Set);
        assert!(matches!(
            store.set("k", b"v".to_vec()).await,
            Err(StorageError::WriteFailed(_))
        ));

        store.heal(KvOp::Set);
        store.set("k", b"v".to_vec()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }
}
