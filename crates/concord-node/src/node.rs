//! Node orchestrator.
//!
//! A `Node` owns the local cache of context instances, the stage registry
//! and the enabled protocols, and exposes the cluster-facing operations:
//!
//! - `create`: claim a context id cluster-wide (exactly one caller wins)
//! - `destroy`: broadcast disposal and delete the registry record
//! - `obtain`: attach to an existing context on this node
//!
//! The registry record is the source of truth for existence. Local instances
//! learn about a destroy through the control channel, asynchronously.

use crate::collaborators::{Protocol, Stage};
use crate::config::NodeConfig;
use crate::context::{Context, LifecycleState};
use async_trait::async_trait;
use concord_core::{
    ConcordError, ConfigValidation, ContextId, ContextRecord, ControlKind, ControlMessage,
    KeyValueEffects, NodeId, PubSubEffects, Result, SubscriptionId,
};
use concord_sync::{DataStorage, MessageHandler, NodePersistence};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodePhase {
    Idle,
    Starting,
    Running,
    Stopped,
}

/// Weak reference to a node, handed to protocols
#[derive(Clone)]
pub struct NodeHandle {
    node: Weak<Node>,
}

impl NodeHandle {
    /// The node, if it is still alive
    pub fn upgrade(&self) -> Option<Arc<Node>> {
        self.node.upgrade()
    }

    /// The node, or `InvalidLifecycle` if it has been dropped
    pub fn node(&self) -> Result<Arc<Node>> {
        self.upgrade()
            .ok_or_else(|| ConcordError::invalid_lifecycle("node has been dropped"))
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("alive", &(self.node.strong_count() > 0))
            .finish()
    }
}

/// One member of the cluster.
pub struct Node {
    config: NodeConfig,
    node_id: NodeId,
    kv: Arc<dyn KeyValueEffects>,
    pubsub: Arc<dyn PubSubEffects>,
    persistence: RwLock<Option<Arc<NodePersistence>>>,
    control_subscription: Mutex<Option<SubscriptionId>>,
    contexts: Mutex<HashMap<ContextId, Arc<Context>>>,
    stages: RwLock<HashMap<String, Arc<dyn Stage>>>,
    protocols: Mutex<Vec<Arc<dyn Protocol>>>,
    phase: Mutex<NodePhase>,
    self_ref: Weak<Node>,
}

impl Node {
    /// Create a node over the cluster's shared adapters
    pub fn new(
        config: NodeConfig,
        kv: Arc<dyn KeyValueEffects>,
        pubsub: Arc<dyn PubSubEffects>,
    ) -> Arc<Self> {
        let node_id = config.resolve_node_id();
        Arc::new_cyclic(|self_ref| Self {
            config,
            node_id,
            kv,
            pubsub,
            persistence: RwLock::new(None),
            control_subscription: Mutex::new(None),
            contexts: Mutex::new(HashMap::new()),
            stages: RwLock::new(HashMap::new()),
            protocols: Mutex::new(Vec::new()),
            phase: Mutex::new(NodePhase::Idle),
            self_ref: self_ref.clone(),
        })
    }

    /// This node's id
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Configuration the node was built with
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Whether `run` completed and `shutdown` has not started
    pub fn is_running(&self) -> bool {
        *self.phase.lock() == NodePhase::Running
    }

    /// Weak handle to this node
    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            node: self.self_ref.clone(),
        }
    }

    /// Locally cached instance of `id`, if any
    pub fn cached(&self, id: &ContextId) -> Option<Arc<Context>> {
        self.contexts.lock().get(id).cloned()
    }

    /// Ids of every locally cached context
    pub fn cached_ids(&self) -> Vec<ContextId> {
        self.contexts.lock().keys().cloned().collect()
    }

    /// Registered stage types, sorted
    pub fn stage_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.stages.read().keys().cloned().collect();
        types.sort();
        types
    }

    fn persistence(&self) -> Result<Arc<NodePersistence>> {
        self.persistence
            .read()
            .clone()
            .ok_or_else(|| ConcordError::invalid_lifecycle("node is not running"))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the node.
    ///
    /// Validates the configuration, initializes both adapters, opens the
    /// registry and subscribes to the control channel.
    pub async fn run(&self) -> Result<()> {
        self.config.validate()?;
        {
            let mut phase = self.phase.lock();
            if *phase != NodePhase::Idle {
                return Err(ConcordError::invalid_lifecycle(format!(
                    "node '{}' cannot run from {:?}",
                    self.node_id, *phase
                )));
            }
            *phase = NodePhase::Starting;
        }

        match self.start().await {
            Ok(()) => {
                *self.phase.lock() = NodePhase::Running;
                info!(node_id = %self.node_id, "Node started");
                Ok(())
            }
            Err(e) => {
                warn!(node_id = %self.node_id, error = %e, "Node failed to start");
                let persistence = self.persistence.write().take();
                if let Some(persistence) = persistence {
                    if let Err(cleanup) = persistence.dispose().await {
                        warn!(
                            node_id = %self.node_id,
                            error = %cleanup,
                            "Persistence cleanup failed"
                        );
                    }
                }
                *self.phase.lock() = NodePhase::Idle;
                Err(e)
            }
        }
    }

    async fn start(&self) -> Result<()> {
        self.kv.initialize().await?;
        self.pubsub.initialize().await?;

        let persistence = Arc::new(NodePersistence::new(
            Arc::clone(&self.kv),
            Arc::clone(&self.pubsub),
        ));
        *self.persistence.write() = Some(Arc::clone(&persistence));
        persistence.initialize().await?;

        let relay = Arc::new(ControlRelay {
            node: self.self_ref.clone(),
        });
        let subscription = persistence.events().subscribe(relay).await?;
        *self.control_subscription.lock() = Some(subscription);
        Ok(())
    }

    /// Stop the node.
    ///
    /// Every step is attempted even when earlier ones fail. Contexts and
    /// protocols are disposed concurrently on their own tasks; waiting for
    /// each is bounded by `dispose_timeout_ms`, but a slow teardown still
    /// runs to completion in the background. The first failure is returned
    /// after all steps ran. Calling `shutdown` on a node that is not running
    /// is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut phase = self.phase.lock();
            if *phase != NodePhase::Running {
                debug!(node_id = %self.node_id, phase = ?*phase, "Shutdown ignored");
                return Ok(());
            }
            *phase = NodePhase::Stopped;
        }

        let mut failures: Vec<ConcordError> = Vec::new();
        let persistence = self.persistence.write().take();

        let control = self.control_subscription.lock().take();
        if let (Some(persistence), Some(id)) = (&persistence, control) {
            if let Err(e) = persistence.events().unsubscribe(id).await {
                warn!(node_id = %self.node_id, error = %e, "Control unsubscribe failed");
                failures.push(e);
            }
        }

        self.stages.write().clear();

        let contexts: Vec<Arc<Context>> = self.contexts.lock().drain().map(|(_, c)| c).collect();
        let protocols: Vec<Arc<dyn Protocol>> = self.protocols.lock().drain(..).collect();
        let timeout = self.config.dispose_timeout();

        let mut teardown = Vec::new();
        for context in contexts {
            let label = format!("context '{}'", context.id());
            let task = tokio::spawn(async move { context.dispose().await });
            teardown.push(bounded(label, timeout, task));
        }
        for protocol in protocols {
            let label = format!("protocol '{}'", protocol.name());
            let task = tokio::spawn(async move { protocol.dispose().await });
            teardown.push(bounded(label, timeout, task));
        }
        for result in join_all(teardown).await {
            if let Err(e) = result {
                warn!(node_id = %self.node_id, error = %e, "Teardown failed");
                failures.push(e);
            }
        }

        if let Some(persistence) = persistence {
            if let Err(e) = persistence.dispose().await {
                warn!(node_id = %self.node_id, error = %e, "Persistence dispose failed");
                failures.push(e);
            }
        }
        if let Err(e) = self.pubsub.dispose().await {
            warn!(node_id = %self.node_id, error = %e, "Broker dispose failed");
            failures.push(e.into());
        }
        if let Err(e) = self.kv.dispose().await {
            warn!(node_id = %self.node_id, error = %e, "Storage dispose failed");
            failures.push(e.into());
        }

        info!(node_id = %self.node_id, failures = failures.len(), "Node shut down");
        match failures.into_iter().next() {
            Some(e @ ConcordError::DisposeFailure { .. }) => Err(e),
            Some(e) => Err(ConcordError::dispose_failure(
                format!("node '{}'", self.node_id),
                e.to_string(),
            )),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Cluster operations
    // ------------------------------------------------------------------

    /// Claim `id` for a new context of `context_type`.
    ///
    /// Fails with `StageNotDefined` before any I/O when the type is unknown,
    /// and with `ContextAlreadyExists` when another caller won the race.
    pub async fn create(&self, id: impl Into<ContextId>, context_type: &str) -> Result<()> {
        let id = id.into();
        if !self.stages.read().contains_key(context_type) {
            return Err(ConcordError::stage_not_defined(context_type));
        }
        let persistence = self.persistence()?;

        let record = ContextRecord::new(id.clone(), context_type);
        if !persistence.contexts().savenx(&id, &record).await? {
            return Err(ConcordError::context_already_exists(id.as_str()));
        }
        trace!(node_id = %self.node_id, context_id = %id, context_type, "Context created");
        Ok(())
    }

    /// Destroy `id` cluster-wide.
    ///
    /// Broadcasts the destroy, deletes the record, then clears the context's
    /// data. Returning does not mean every node has released its instance.
    pub async fn destroy(&self, id: impl Into<ContextId>) -> Result<()> {
        let id = id.into();
        let persistence = self.persistence()?;

        if persistence.contexts().get(&id).await?.is_none() {
            return Err(ConcordError::context_not_found(id.as_str()));
        }
        persistence
            .events()
            .publish(&ControlMessage::destroy(&id))
            .await?;
        persistence.contexts().delete(&id).await?;

        let removed = DataStorage::new(Arc::clone(&self.kv), id.clone())
            .clear()
            .await?;
        trace!(node_id = %self.node_id, context_id = %id, removed, "Context destroyed");
        Ok(())
    }

    /// Attach to `id` on this node, initializing a local instance if needed.
    ///
    /// Concurrent callers share one instance and `Stage::on_init` runs once.
    /// An instance whose initialization fails is evicted, and every caller
    /// waiting on it receives the initialization error.
    pub async fn obtain(&self, id: impl Into<ContextId>) -> Result<Arc<Context>> {
        let id = id.into();
        let persistence = self.persistence()?;

        let record = persistence
            .contexts()
            .get(&id)
            .await?
            .ok_or_else(|| ConcordError::context_not_found(id.as_str()))?;
        let stage = self
            .stages
            .read()
            .get(&record.context_type)
            .cloned()
            .ok_or_else(|| ConcordError::stage_unavailable(id.as_str(), &record.context_type))?;

        let (context, fresh) = {
            let mut contexts = self.contexts.lock();
            match contexts.get(&id) {
                Some(existing) if existing.is_live() => (Arc::clone(existing), false),
                _ => {
                    let context = Context::new(
                        id.clone(),
                        record.context_type.clone(),
                        self.node_id.clone(),
                        Arc::clone(&self.kv),
                        Arc::clone(&self.pubsub),
                        stage,
                    );
                    contexts.insert(id.clone(), Arc::clone(&context));
                    (context, true)
                }
            }
        };

        if fresh {
            if let Err(e) = context.initialize().await {
                self.evict(&id, &context);
                return Err(e);
            }
            trace!(node_id = %self.node_id, context_id = %id, "Context obtained");
            return Ok(context);
        }

        match context.wait_until_settled().await {
            LifecycleState::Ready => Ok(context),
            state => Err(context.initialization_error().unwrap_or_else(|| {
                ConcordError::invalid_lifecycle(format!(
                    "context '{id}' is {state:?} on node '{}'",
                    self.node_id
                ))
            })),
        }
    }

    /// Register the behavior of `context_type`
    pub fn define(&self, context_type: impl Into<String>, stage: Arc<dyn Stage>) -> Result<&Self> {
        let context_type = context_type.into();
        let mut stages = self.stages.write();
        if stages.contains_key(&context_type) {
            return Err(ConcordError::stage_already_defined(context_type));
        }
        debug!(node_id = %self.node_id, context_type = %context_type, "Stage defined");
        stages.insert(context_type, stage);
        Ok(self)
    }

    /// Bind `protocol` to this node and start it.
    ///
    /// Started protocols are disposed on shutdown.
    pub async fn enable(&self, protocol: Arc<dyn Protocol>) -> Result<()> {
        let name = protocol.name().to_string();
        if let Err(e) = protocol.start(self.handle()).await {
            warn!(
                node_id = %self.node_id,
                protocol = %name,
                error = %e,
                "Protocol failed to start"
            );
            if let Err(cleanup) = protocol.dispose().await {
                warn!(
                    node_id = %self.node_id,
                    protocol = %name,
                    error = %cleanup,
                    "Protocol cleanup failed"
                );
            }
            return Err(match e {
                ConcordError::Hook { .. } => e,
                other => ConcordError::hook(format!("{name}.start"), other.to_string()),
            });
        }
        self.protocols.lock().push(protocol);
        info!(node_id = %self.node_id, protocol = %name, "Protocol enabled");
        Ok(())
    }

    /// Snapshot of every context record in the cluster, unordered
    pub async fn get_all(&self) -> Result<Vec<ContextRecord>> {
        self.persistence()?.contexts().get_all().await
    }

    // ------------------------------------------------------------------
    // Control channel
    // ------------------------------------------------------------------

    fn handle_control(&self, message: ControlMessage) {
        match message.kind() {
            ControlKind::Destroy(id) => {
                let Some(context) = self.cached(&id) else {
                    trace!(
                        node_id = %self.node_id,
                        context_id = %id,
                        "Destroy for context not cached here"
                    );
                    return;
                };
                let node = self.self_ref.clone();
                tokio::spawn(async move {
                    if let Err(e) = context.dispose().await {
                        warn!(context_id = %id, error = %e, "Dispose after destroy failed");
                    }
                    if let Some(node) = node.upgrade() {
                        node.evict(&id, &context);
                    }
                });
            }
            ControlKind::Unknown(key) => {
                debug!(node_id = %self.node_id, key = %key, "Ignoring unknown control message");
            }
        }
    }

    /// Drop `id` from the cache only if it still maps to `context`
    fn evict(&self, id: &ContextId, context: &Arc<Context>) {
        let mut contexts = self.contexts.lock();
        if contexts
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, context))
        {
            contexts.remove(id);
            trace!(node_id = %self.node_id, context_id = %id, "Context evicted");
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("phase", &*self.phase.lock())
            .field("contexts", &self.contexts.lock().len())
            .finish()
    }
}

/// Wait for a spawned teardown, giving up after `timeout`.
///
/// Giving up only stops the wait; the teardown task keeps running to
/// completion.
async fn bounded(
    label: String,
    timeout: Option<Duration>,
    task: JoinHandle<Result<()>>,
) -> Result<()> {
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                return Err(ConcordError::dispose_failure(
                    label,
                    format!("timed out after {}ms", limit.as_millis()),
                ))
            }
        },
        None => task.await,
    };
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e @ ConcordError::DisposeFailure { .. })) => Err(e),
        Ok(Err(other)) => Err(ConcordError::dispose_failure(label, other.to_string())),
        Err(e) => Err(ConcordError::dispose_failure(
            label,
            format!("teardown task failed: {e}"),
        )),
    }
}

struct ControlRelay {
    node: Weak<Node>,
}

#[async_trait]
impl MessageHandler<ControlMessage> for ControlRelay {
    async fn handle(&self, message: ControlMessage) {
        if let Some(node) = self.node.upgrade() {
            node.handle_control(message);
        }
    }
}
