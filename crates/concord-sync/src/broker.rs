//! Typed publish/subscribe channel bound to a single topic.
//!
//! A `MessageBroker<T>` encodes outgoing values with a `Codec<T>` and, for
//! every subscription, runs one pump task that drains the adapter receiver,
//! decodes each payload and hands it to the registered `MessageHandler`.
//! Handlers of one subscription therefore run sequentially.
//!
//! Payloads that fail to decode are logged and dropped; a single malformed
//! message never tears the subscription down.

use async_trait::async_trait;
use concord_core::{Codec, JsonCodec, PubSubEffects, Result, Subscription, SubscriptionId};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Receiver of decoded messages.
#[async_trait]
pub trait MessageHandler<T>: Send + Sync {
    /// Handle one decoded message
    async fn handle(&self, message: T);
}

/// Adapter turning an async closure into a `MessageHandler`.
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<T, F, Fut> MessageHandler<T> for FnHandler<F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, message: T) {
        (self.f)(message).await;
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<T, F, Fut>(f: F) -> Arc<dyn MessageHandler<T>>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Typed channel over one pub/sub topic.
pub struct MessageBroker<T> {
    adapter: Arc<dyn PubSubEffects>,
    topic: String,
    codec: Arc<dyn Codec<T>>,
    registrations: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
}

impl<T> MessageBroker<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a broker using the JSON wire codec
    pub fn new(adapter: Arc<dyn PubSubEffects>, topic: impl Into<String>) -> Self {
        Self::with_codec(adapter, topic, Arc::new(JsonCodec::<T>::new()))
    }

    /// Create a broker with an explicit codec
    pub fn with_codec(
        adapter: Arc<dyn PubSubEffects>,
        topic: impl Into<String>,
        codec: Arc<dyn Codec<T>>,
    ) -> Self {
        Self {
            adapter,
            topic: topic.into(),
            codec,
            registrations: Mutex::new(HashMap::new()),
        }
    }

    /// Topic this broker is bound to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Number of live subscriptions created through this broker
    pub fn subscription_count(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Encode `message` and publish it on the topic.
    pub async fn publish(&self, message: &T) -> Result<()> {
        let payload = self.codec.encode(message)?;
        self.adapter.publish(&self.topic, payload).await?;
        trace!(topic = %self.topic, "Published message");
        Ok(())
    }

    /// Register `handler` for every message published on the topic.
    ///
    /// The returned id is the only way to remove the registration.
    pub async fn subscribe(&self, handler: Arc<dyn MessageHandler<T>>) -> Result<SubscriptionId> {
        let Subscription { id, mut receiver } = self.adapter.subscribe(&self.topic).await?;
        let codec = Arc::clone(&self.codec);
        let topic = self.topic.clone();

        let pump = tokio::spawn(async move {
            while let Some(payload) = receiver.recv().await {
                match codec.decode(&payload) {
                    Ok(message) => handler.handle(message).await,
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Dropping undecodable message");
                    }
                }
            }
            trace!(topic = %topic, subscription = %id, "Subscription closed");
        });

        self.registrations.lock().insert(id, pump);
        debug!(topic = %self.topic, subscription = %id, "Subscribed");
        Ok(id)
    }

    /// Remove a registration; unknown ids are ignored.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let Some(pump) = self.registrations.lock().remove(&id) else {
            return Ok(());
        };
        let result = self.adapter.unsubscribe(id).await;
        pump.abort();
        debug!(topic = %self.topic, subscription = %id, "Unsubscribed");
        result.map_err(Into::into)
    }

    /// Remove every registration of this broker.
    ///
    /// Idempotent. Every registration is released even if the adapter rejects
    /// some of them; the first adapter error is returned.
    pub async fn dispose(&self) -> Result<()> {
        let registrations: Vec<_> = self.registrations.lock().drain().collect();
        let mut first_error = None;

        for (id, pump) in registrations {
            if let Err(e) = self.adapter.unsubscribe(id).await {
                warn!(
                    topic = %self.topic,
                    subscription = %id,
                    error = %e,
                    "Unsubscribe failed during dispose"
                );
                first_error.get_or_insert(e);
            }
            pump.abort();
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl<T> Drop for MessageBroker<T> {
    fn drop(&mut self) {
        for (_, pump) in self.registrations.get_mut().drain() {
            pump.abort();
        }
    }
}

impl<T> std::fmt::Debug for MessageBroker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBroker")
            .field("topic", &self.topic)
            .field("subscriptions", &self.registrations.lock().len())
            .finish()
    }
}
