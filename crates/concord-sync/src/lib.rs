//! # Concord Sync - Layer 2: channels, context sync, cluster registry
//!
//! Builds the distributed synchronization plumbing on top of the adapter
//! effect traits from `concord-core`:
//!
//! - `MessageBroker<T>`: typed pub/sub channel bound to one topic
//! - `EventBroker` / `StateBroker`: the two per-context channels
//! - `DataStorage`: key-value view scoped to one context
//! - `ContextSync`: bundle of the above for one context id
//! - `NodePersistence`: cluster-wide context registry plus the reserved
//!   control broadcast channel
//!
//! ## Design Principles
//!
//! - **Explicit tokens**: every subscription is removed through the
//!   `SubscriptionId` returned when it was created
//! - **Strict scoping**: topics and storage keys are derived from the context
//!   id so distinct contexts never observe each other's traffic
//! - **Best-effort teardown**: `dispose` attempts every release even when an
//!   earlier one fails
//! - **No transport ordering assumptions**: causal order is rebuilt above this
//!   layer from vector clocks

pub mod broker;
pub mod channels;
pub mod context_sync;
pub mod persistence;
pub mod storage;

pub use broker::{handler_fn, MessageBroker, MessageHandler};
pub use channels::{
    context_topic, ControlBroker, EventBroker, StateBroker, CONTROL_TOPIC, EVENTS_CHANNEL,
    STATE_CHANNEL,
};
pub use context_sync::ContextSync;
pub use persistence::{ContextRegistry, NodePersistence, REGISTRY_NAMESPACE};
pub use storage::DataStorage;
