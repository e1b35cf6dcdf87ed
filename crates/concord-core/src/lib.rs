//! Concord Core - Layer 1 foundation
//!
//! Pure types and interfaces shared by every other Concord crate:
//!
//! - `VectorClock`: per-context causal counters, one live copy per node
//! - Wire types: `Event`, `StateEntry`, `ControlMessage`, `ContextRecord`
//! - `Codec`: transport-neutral encoding with a versioned envelope
//! - Effect interfaces: `KeyValueEffects` and `PubSubEffects`, the two narrow
//!   capabilities a backend adapter must supply
//! - `ConcordError`: the unified error taxonomy
//!
//! Nothing in this crate performs I/O. Handlers for the effect traits live in
//! adapter crates (and, for tests, in `concord-testkit`).

#![forbid(unsafe_code)]

/// Causal ordering primitive
pub mod clock;

/// Transport-neutral encoding
pub mod codec;

/// Configuration validation helpers
pub mod config;

/// Adapter capability interfaces
pub mod effects;

/// Unified error handling
pub mod errors;

/// Context and node identifiers
pub mod identifiers;

/// Wire payloads exchanged between nodes
pub mod messages;

pub use clock::{CausalOrdering, VectorClock, VectorClockSnapshot};
pub use codec::{Codec, CodecError, JsonCodec, WIRE_SCHEMA_VERSION};
pub use config::{ConfigValidation, ConfigValidator, ValidationError};
pub use effects::{
    BrokerError, KeyValueEffects, PubSubEffects, StorageError, Subscription, SubscriptionId,
};
pub use errors::{ConcordError, Result};
pub use identifiers::{ContextId, NodeId};
pub use messages::{ContextRecord, ControlKind, ControlMessage, Event, StateEntry};
