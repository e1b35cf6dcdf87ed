//! Multi-node fixture over shared in-memory adapters.

use crate::memory::{MemoryKeyValueStore, MemoryPubSub};
use concord_core::{KeyValueEffects, PubSubEffects, Result};
use concord_node::{Node, NodeConfig, Stage};
use futures::future::join_all;
use std::sync::Arc;

/// N nodes sharing one store and one bus, each through its own handle
pub struct TestCluster {
    kv: MemoryKeyValueStore,
    pubsub: MemoryPubSub,
    nodes: Vec<Arc<Node>>,
}

impl TestCluster {
    /// Build `size` nodes named `node-0`, `node-1`, ...
    pub fn new(size: usize) -> Self {
        let kv = MemoryKeyValueStore::new();
        let pubsub = MemoryPubSub::new();
        let nodes = (0..size)
            .map(|i| {
                let node_kv: Arc<dyn KeyValueEffects> = Arc::new(kv.handle());
                let node_pubsub: Arc<dyn PubSubEffects> = Arc::new(pubsub.handle());
                Node::new(NodeConfig::with_node_id(format!("node-{i}")), node_kv, node_pubsub)
            })
            .collect();
        Self { kv, pubsub, nodes }
    }

    /// Build and start `size` nodes, each with `stage` defined as `context_type`
    pub async fn started(size: usize, context_type: &str, stage: Arc<dyn Stage>) -> Result<Self> {
        let cluster = Self::new(size);
        cluster.define_all(context_type, stage)?;
        cluster.run_all().await?;
        Ok(cluster)
    }

    /// Node `index`
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range.
    pub fn node(&self, index: usize) -> &Arc<Node> {
        &self.nodes[index]
    }

    /// Every node
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Shared store, for inspecting cluster-wide state
    pub fn kv(&self) -> &MemoryKeyValueStore {
        &self.kv
    }

    /// Shared bus, for inspecting cluster-wide traffic
    pub fn pubsub(&self) -> &MemoryPubSub {
        &self.pubsub
    }

    /// Define `stage` under `context_type` on every node
    pub fn define_all(&self, context_type: &str, stage: Arc<dyn Stage>) -> Result<()> {
        for node in &self.nodes {
            node.define(context_type, Arc::clone(&stage))?;
        }
        Ok(())
    }

    /// Run every node
    pub async fn run_all(&self) -> Result<()> {
        for node in &self.nodes {
            node.run().await?;
        }
        Ok(())
    }

    /// Shut every node down concurrently; returns each node's result
    pub async fn shutdown_all(&self) -> Vec<Result<()>> {
        join_all(self.nodes.iter().map(|node| node.shutdown())).await
    }
}
