//! Concord Testing Infrastructure
//!
//! Shared fixtures for Concord tests: in-memory adapters that model a
//! cluster-shared backend, fault-injecting wrappers, recording collaborators,
//! a multi-node cluster fixture and polling helpers.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! Add this to your crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! concord-testkit = { workspace = true }
//! ```
//!
//! Then in your tests:
//! ```rust,ignore
//! use concord_testkit::*;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let stage = RecordingStage::new();
//!     let cluster = TestCluster::started(2, "lobby", stage.clone()).await.unwrap();
//!     cluster.node(0).create("room-1", "lobby").await.unwrap();
//!     // ... test logic
//! }
//! ```

pub mod cluster;
pub mod faults;
pub mod memory;
pub mod stage;
pub mod wait;

pub use cluster::TestCluster;
pub use faults::{BrokerOp, FailingKeyValueStore, FailingPubSub, KvOp};
pub use memory::{MemoryKeyValueStore, MemoryPubSub};
pub use stage::{RecordingActivity, RecordingProtocol, RecordingStage};
pub use wait::{eventually, eventually_default, settle};

/// Install a test-friendly tracing subscriber; repeated calls are no-ops
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
