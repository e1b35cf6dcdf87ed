//! Two-Node Cluster Scenario
//!
//! Walks a `lobby` context named `room-1` through its whole life across two
//! nodes: creation race, attach, causally ordered traffic in both
//! directions, and cluster-wide destroy.

#![allow(clippy::unwrap_used)]

use concord_core::{CausalOrdering, ConcordError, ContextId, NodeId, VectorClock};
use concord_node::{ContextNotification, ContextTopic, LifecycleState};
use concord_testkit::{eventually_default, RecordingStage, TestCluster};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn lobby_room_lifecycle_across_two_nodes() {
    let stage_a = RecordingStage::new();
    let stage_b = RecordingStage::new();
    let cluster = TestCluster::new(2);
    let (a, b) = (cluster.node(0), cluster.node(1));
    a.define("lobby", stage_a.clone()).unwrap();
    b.define("lobby", stage_b.clone()).unwrap();
    cluster.run_all().await.unwrap();

    // Exactly one creator wins.
    a.create("room-1", "lobby").await.unwrap();
    let lost = b.create("room-1", "lobby").await.unwrap_err();
    assert!(lost.is_race_lost());

    // Both nodes attach.
    let room_a = a.obtain("room-1").await.unwrap();
    let room_b = b.obtain("room-1").await.unwrap();
    assert_eq!(room_a.state(), LifecycleState::Ready);
    assert_eq!(room_b.state(), LifecycleState::Ready);

    // A emits; both stages observe it and B learns A's clock entry.
    let join = room_a.emit("join", json!({"actor": "p1"})).await.unwrap();
    assert_eq!(join.vector_clock.get(a.node_id()), 1);
    assert!(eventually_default(|| async { stage_b.event_types() == ["join"] }).await);
    assert!(eventually_default(|| async { stage_a.event_types() == ["join"] }).await);
    assert_eq!(room_b.clock().get(a.node_id()), 1);
    assert_eq!(room_b.clock().get(b.node_id()), 0);

    // B replies; its event causally follows A's.
    let reply = room_b.emit("move", json!({"actor": "p2"})).await.unwrap();
    assert_eq!(
        VectorClock::compare(&reply.vector_clock, &join.vector_clock),
        CausalOrdering::After
    );
    assert!(eventually_default(|| async { stage_a.event_types() == ["join", "move"] }).await);
    assert_eq!(room_a.clock().get(b.node_id()), 1);
    assert_eq!(room_a.clock().get(a.node_id()), 1);

    // Registry lists the room.
    let records = b.get_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].context_type, "lobby");

    // Destroy from B; both local instances go away.
    b.destroy("room-1").await.unwrap();
    let id = ContextId::new("room-1");
    assert!(
        eventually_default(|| async { a.cached(&id).is_none() && b.cached(&id).is_none() }).await
    );
    assert_eq!(room_a.state(), LifecycleState::Disposed);
    assert_eq!(room_b.state(), LifecycleState::Disposed);
    assert_eq!(stage_a.dispose_calls(), 1);
    assert_eq!(stage_b.dispose_calls(), 1);
    assert!(matches!(
        a.obtain("room-1").await,
        Err(ConcordError::ContextNotFound { .. })
    ));

    for result in cluster.shutdown_all().await {
        result.unwrap();
    }
}

#[tokio::test]
async fn concurrent_events_are_reported_concurrent() {
    let cluster = TestCluster::started(2, "lobby", RecordingStage::new())
        .await
        .unwrap();
    cluster.node(0).create("room-1", "lobby").await.unwrap();
    let room_a = cluster.node(0).obtain("room-1").await.unwrap();
    let room_b = cluster.node(1).obtain("room-1").await.unwrap();

    let (left, right) = tokio::join!(
        room_a.emit("left", json!(null)),
        room_b.emit("right", json!(null))
    );

    assert_eq!(
        VectorClock::compare(&left.unwrap().vector_clock, &right.unwrap().vector_clock),
        CausalOrdering::Concurrent
    );
}

#[tokio::test]
async fn state_broadcasts_reach_keyed_listeners_on_every_node() {
    let cluster = TestCluster::started(2, "lobby", RecordingStage::new())
        .await
        .unwrap();
    cluster.node(0).create("room-1", "lobby").await.unwrap();
    let room_a = cluster.node(0).obtain("room-1").await.unwrap();
    let room_b = cluster.node(1).obtain("room-1").await.unwrap();

    let scores = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&scores);
    room_b.on(ContextTopic::State("score".into()), move |notification| {
        if let ContextNotification::State(entry) = notification {
            sink.lock().push(entry.data.clone());
        }
    });

    let clock_before = room_b.clock();
    room_a.broadcast_state("chat", json!("hi")).await.unwrap();
    room_a.broadcast_state("score", json!(3)).await.unwrap();

    assert!(eventually_default(|| async { scores.lock().len() == 1 }).await);
    assert_eq!(scores.lock()[0], json!(3));
    assert_eq!(room_b.clock(), clock_before);
}

#[tokio::test]
async fn recreate_after_destroy_yields_a_fresh_instance() {
    let stage = RecordingStage::new();
    let cluster = TestCluster::started(1, "lobby", stage.clone())
        .await
        .unwrap();
    let node = cluster.node(0);
    node.create("room-1", "lobby").await.unwrap();
    let first = node.obtain("room-1").await.unwrap();

    node.destroy("room-1").await.unwrap();
    assert!(eventually_default(|| async { first.state() == LifecycleState::Disposed }).await);
    node.create("room-1", "lobby").await.unwrap();
    let second = node.obtain("room-1").await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.state(), LifecycleState::Ready);
    assert_eq!(stage.init_calls(), 2);
    assert!(Arc::ptr_eq(
        &node.cached(&ContextId::new("room-1")).unwrap(),
        &second
    ));
    assert_eq!(second.clock().get(&NodeId::new("node-0")), 0);
}
