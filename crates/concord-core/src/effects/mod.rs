//! Adapter capability interfaces.
//!
//! A backend adapter supplies two narrow capabilities, each its own trait so
//! that tests can substitute independent doubles:
//!
//! - `KeyValueEffects`: shared key-value storage with atomic create-if-absent
//! - `PubSubEffects`: topic-based publish/subscribe
//!
//! The core trusts the adapter's own consistency guarantees: `savenx` must be
//! a cluster-wide compare-and-set, and pub/sub delivery is at-least-once with
//! no cross-topic ordering.

pub mod pubsub;
pub mod storage;

pub use pubsub::{BrokerError, PubSubEffects, Subscription, SubscriptionId};
pub use storage::{KeyValueEffects, StorageError};
