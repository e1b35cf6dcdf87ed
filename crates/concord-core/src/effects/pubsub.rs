//! Publish/subscribe effect interface.
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: backend adapter crates; in-memory handler in `concord-testkit`
//! - **Usage**: per-context event/state channels and the cluster control channel
//!
//! Subscriptions are identified by an explicit `SubscriptionId` returned at
//! subscribe time; unsubscribing requires that token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Token identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Create a new random subscription id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Live subscription returned by the adapter.
///
/// The adapter closes `receiver` when the subscription is removed.
#[derive(Debug)]
pub struct Subscription {
    /// Token for `unsubscribe`
    pub id: SubscriptionId,
    /// Raw payloads published on the topic
    pub receiver: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Broker operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum BrokerError {
    /// Publishing failed
    #[error("Publish to '{topic}' failed: {reason}")]
    PublishFailed {
        /// Target topic
        topic: String,
        /// Reason for the failure
        reason: String,
    },
    /// Subscribing failed
    #[error("Subscribe to '{topic}' failed: {reason}")]
    SubscribeFailed {
        /// Target topic
        topic: String,
        /// Reason for the failure
        reason: String,
    },
    /// Unsubscribing failed
    #[error("Unsubscribe of {id} failed: {reason}")]
    UnsubscribeFailed {
        /// Subscription being removed
        id: SubscriptionId,
        /// Reason for the failure
        reason: String,
    },
    /// Broker cannot be reached or has been disposed
    #[error("Broker unavailable: {reason}")]
    Unavailable {
        /// Reason the broker is unavailable
        reason: String,
    },
}

/// Topic-based publish/subscribe shared by every node of the cluster.
///
/// Delivery is at-least-once with no ordering guarantee across topics.
#[async_trait]
pub trait PubSubEffects: Send + Sync {
    /// Prepare the broker for use
    async fn initialize(&self) -> Result<(), BrokerError>;

    /// Release every subscription held by this handle
    async fn dispose(&self) -> Result<(), BrokerError>;

    /// Publish a payload to every subscriber of `topic`
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Open a subscription on `topic`
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError>;

    /// Remove a subscription; unknown ids are ignored
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BrokerError>;
}

/// Blanket implementation for Arc<T> where T: PubSubEffects
#[async_trait]
impl<T: PubSubEffects + ?Sized> PubSubEffects for Arc<T> {
    async fn initialize(&self) -> Result<(), BrokerError> {
        (**self).initialize().await
    }

    async fn dispose(&self) -> Result<(), BrokerError> {
        (**self).dispose().await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        (**self).publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError> {
        (**self).subscribe(topic).await
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BrokerError> {
        (**self).unsubscribe(id).await
    }
}
