//! Context Behavior Tests
//!
//! Clock discipline, local notifications, activities and disposal of a single
//! context instance.

#![allow(clippy::unwrap_used)]

use concord_core::{ConcordError, Event, NodeId, VectorClockSnapshot};
use concord_node::{ContextNotification, ContextTopic, LifecycleState};
use concord_testkit::{eventually_default, RecordingActivity, RecordingStage, TestCluster};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

async fn room(stage: Arc<RecordingStage>) -> (TestCluster, Arc<concord_node::Context>) {
    let cluster = TestCluster::started(1, "lobby", stage).await.unwrap();
    cluster.node(0).create("room-1", "lobby").await.unwrap();
    let context = cluster.node(0).obtain("room-1").await.unwrap();
    (cluster, context)
}

// ============================================================================
// Clock
// ============================================================================

#[tokio::test]
async fn emit_ticks_and_incoming_events_only_merge() {
    let stage = RecordingStage::new();
    let (_cluster, context) = room(stage.clone()).await;
    let local = context.node_id().clone();

    let first = context.emit("a", json!(1)).await.unwrap();
    let second = context.emit("b", json!(2)).await.unwrap();
    assert_eq!(first.vector_clock.get(&local), 1);
    assert_eq!(second.vector_clock.get(&local), 2);

    let remote = NodeId::new("elsewhere");
    let foreign = Event::new(
        "c",
        json!(3),
        [(remote.clone(), 5), (local.clone(), 9)]
            .into_iter()
            .collect::<VectorClockSnapshot>(),
        remote.clone(),
    );
    context.handle_event(foreign).await;

    let clock = context.clock();
    assert_eq!(clock.get(&local), 2);
    assert_eq!(clock.get(&remote), 5);
    assert!(eventually_default(|| async { stage.event_types().len() == 3 }).await);
}

// ============================================================================
// Notifications
// ============================================================================

#[tokio::test]
async fn emit_listeners_fire_until_removed() {
    let (_cluster, context) = room(RecordingStage::new()).await;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let id = context.on(ContextTopic::Emit, move |notification| {
        if matches!(notification, ContextNotification::Emit(_)) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    context.emit("a", json!(null)).await.unwrap();
    assert!(eventually_default(|| async { hits.load(Ordering::SeqCst) == 1 }).await);

    assert!(context.off(id));
    assert!(!context.off(id));
    let observed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&observed);
    context.on(ContextTopic::Emit, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    context.emit("b", json!(null)).await.unwrap();

    assert!(eventually_default(|| async { observed.load(Ordering::SeqCst) == 1 }).await);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dispose_notifies_then_drops_listeners() {
    let (_cluster, context) = room(RecordingStage::new()).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    context.on(ContextTopic::Dispose, move |notification| {
        sink.lock().push(notification.clone());
    });

    context.dispose().await.unwrap();

    assert_eq!(*seen.lock(), vec![ContextNotification::Dispose]);
    assert_eq!(context.state(), LifecycleState::Disposed);
}

// ============================================================================
// Activities
// ============================================================================

#[tokio::test]
async fn activities_are_unique_and_disposed_with_the_context() {
    let (_cluster, context) = room(RecordingStage::new()).await;
    let timer = RecordingActivity::new();

    context.use_activity("timer", timer.clone()).unwrap();
    assert!(matches!(
        context.use_activity("timer", RecordingActivity::new()),
        Err(ConcordError::ActivityAlreadyRegistered { .. })
    ));
    assert!(context.activity("timer").is_some());

    context.dispose().await.unwrap();
    assert_eq!(timer.dispose_calls(), 1);
    assert!(matches!(
        context.use_activity("late", RecordingActivity::new()),
        Err(ConcordError::InvalidLifecycle { .. })
    ));
}

// ============================================================================
// Disposal
// ============================================================================

#[tokio::test]
async fn dispose_runs_every_step_and_reports_first_failure() {
    let stage = RecordingStage::new();
    let (cluster, context) = room(stage.clone()).await;
    let broken = RecordingActivity::failing();
    let healthy = RecordingActivity::new();
    context.use_activity("broken", broken.clone()).unwrap();
    context.use_activity("healthy", healthy.clone()).unwrap();
    stage.fail_dispose(true);

    let err = context.dispose().await.unwrap_err();

    assert!(matches!(err, ConcordError::DisposeFailure { .. }));
    assert_eq!(broken.dispose_calls(), 1);
    assert_eq!(healthy.dispose_calls(), 1);
    assert_eq!(stage.dispose_calls(), 1);
    assert_eq!(context.state(), LifecycleState::Disposed);
    assert_eq!(cluster.pubsub().subscriber_count("room-1:events").await, 0);
    assert_eq!(cluster.pubsub().subscriber_count("room-1:state").await, 0);
}

#[tokio::test]
async fn dispose_twice_is_a_noop() {
    let stage = RecordingStage::new();
    let (_cluster, context) = room(stage.clone()).await;

    context.dispose().await.unwrap();
    context.dispose().await.unwrap();

    assert_eq!(stage.dispose_calls(), 1);
}

#[tokio::test]
async fn disposed_context_rejects_traffic() {
    let stage = RecordingStage::new();
    let (_cluster, context) = room(stage.clone()).await;
    context.dispose().await.unwrap();

    assert!(matches!(
        context.emit("late", json!(null)).await,
        Err(ConcordError::InvalidLifecycle { .. })
    ));
    context
        .handle_event(Event::new(
            "late",
            json!(null),
            VectorClockSnapshot::new(),
            NodeId::new("elsewhere"),
        ))
        .await;
    assert!(stage.events().is_empty());
}

#[tokio::test]
async fn context_data_is_shared_between_nodes() {
    let cluster = TestCluster::started(2, "lobby", RecordingStage::new())
        .await
        .unwrap();
    cluster.node(0).create("room-1", "lobby").await.unwrap();
    let room_a = cluster.node(0).obtain("room-1").await.unwrap();
    let room_b = cluster.node(1).obtain("room-1").await.unwrap();

    room_a.data().set("round", &json!(2)).await.unwrap();

    assert_eq!(room_b.data().get("round").await.unwrap(), Some(json!(2)));
}
