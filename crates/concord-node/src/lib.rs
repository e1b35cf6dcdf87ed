//! # Concord Node - Layer 3: context lifecycle and orchestration
//!
//! Ties the synchronization layer into a running node:
//!
//! - `Context`: one live context on this node, with a linear lifecycle,
//!   vector clock, local notifications and an activity registry
//! - `Node`: cache of local contexts, stage registry, protocols, and the
//!   cluster-facing `create` / `destroy` / `obtain` operations
//! - `Stage`, `Activity`, `Protocol`: collaborator traits implemented by
//!   applications
//! - `NodeConfig` and `telemetry::init_tracing`
//!
//! ## Usage
//!
//! ```rust,ignore
//! let node = Node::new(NodeConfig::default(), kv, pubsub);
//! node.define("lobby", Arc::new(LobbyStage))?;
//! node.run().await?;
//! node.create("room-1", "lobby").await?;
//! let room = node.obtain("room-1").await?;
//! room.emit("join", json!({"actor": "p1"})).await?;
//! ```

pub mod collaborators;
pub mod config;
pub mod context;
pub mod node;
pub mod telemetry;

pub use collaborators::{Activity, Protocol, Stage};
pub use config::NodeConfig;
pub use context::{Context, ContextNotification, ContextTopic, LifecycleState, ListenerId};
pub use node::{Node, NodeHandle};
