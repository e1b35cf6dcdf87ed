//! Message Broker Delivery Tests
//!
//! Typed publish/subscribe over the in-memory bus: delivery, token-based
//! unsubscribe, topic scoping, and tolerance of malformed payloads.

#![allow(clippy::unwrap_used)]

use concord_core::{
    ContextId, Event, NodeId, PubSubEffects, StateEntry, SubscriptionId, VectorClockSnapshot,
};
use concord_sync::{
    context_topic, handler_fn, ContextSync, EventBroker, MessageBroker, StateBroker,
    EVENTS_CHANNEL,
};
use concord_testkit::{eventually_default, settle, MemoryKeyValueStore, MemoryPubSub};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

type Collected<T> = (Arc<Mutex<Vec<T>>>, Arc<dyn concord_sync::MessageHandler<T>>);

fn collector<T: Clone + Send + 'static>() -> Collected<T> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler = handler_fn(move |message: T| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(message);
        }
    });
    (seen, handler)
}

fn event(event_type: &str) -> Event {
    Event::new(
        event_type,
        json!({"n": 1}),
        VectorClockSnapshot::new(),
        NodeId::new("n1"),
    )
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn published_messages_reach_every_subscriber() {
    let bus = MemoryPubSub::new();
    let a: Arc<dyn PubSubEffects> = Arc::new(bus.handle());
    let b: Arc<dyn PubSubEffects> = Arc::new(bus.handle());
    let topic = context_topic(&ContextId::new("room-1"), EVENTS_CHANNEL);

    let sender = EventBroker::new(a, topic.clone());
    let receiver = EventBroker::new(b, topic);
    let (seen, handler) = collector::<Event>();
    receiver.subscribe(handler).await.unwrap();

    let sent = event("join");
    sender.publish(&sent).await.unwrap();

    assert!(eventually_default(|| async { seen.lock().len() == 1 }).await);
    assert_eq!(seen.lock()[0], sent);
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let bus: Arc<dyn PubSubEffects> = Arc::new(MemoryPubSub::new());
    let broker = StateBroker::new(bus, "room-1:state");
    let (seen, handler) = collector::<StateEntry>();

    let id = broker.subscribe(handler).await.unwrap();
    broker
        .publish(&StateEntry::new("score", json!(1)))
        .await
        .unwrap();
    assert!(eventually_default(|| async { seen.lock().len() == 1 }).await);

    broker.unsubscribe(id).await.unwrap();
    assert_eq!(broker.subscription_count(), 0);
    broker
        .publish(&StateEntry::new("score", json!(2)))
        .await
        .unwrap();
    settle().await;

    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test]
async fn unsubscribe_of_unknown_token_is_noop() {
    let bus: Arc<dyn PubSubEffects> = Arc::new(MemoryPubSub::new());
    let broker = StateBroker::new(bus, "room-1:state");

    broker.unsubscribe(SubscriptionId::new()).await.unwrap();
}

#[tokio::test]
async fn each_subscription_is_removed_by_its_own_token() {
    let bus: Arc<dyn PubSubEffects> = Arc::new(MemoryPubSub::new());
    let broker = EventBroker::new(bus, "room-1:events");
    let (first, first_handler) = collector::<Event>();
    let (second, second_handler) = collector::<Event>();

    let first_id = broker.subscribe(first_handler).await.unwrap();
    broker.subscribe(second_handler).await.unwrap();
    broker.unsubscribe(first_id).await.unwrap();

    broker.publish(&event("move")).await.unwrap();
    assert!(eventually_default(|| async { second.lock().len() == 1 }).await);
    settle().await;
    assert!(first.lock().is_empty());
}

// ============================================================================
// Scoping
// ============================================================================

#[tokio::test]
async fn contexts_do_not_observe_each_other() {
    let bus = MemoryPubSub::new();
    let kv = MemoryKeyValueStore::new();
    let lobby = ContextSync::new(
        ContextId::new("lobby"),
        Arc::new(kv.handle()),
        Arc::new(bus.handle()),
    );
    let arena = ContextSync::new(
        ContextId::new("arena"),
        Arc::new(kv.handle()),
        Arc::new(bus.handle()),
    );

    let (lobby_seen, lobby_handler) = collector::<Event>();
    let (arena_seen, arena_handler) = collector::<Event>();
    lobby.events().subscribe(lobby_handler).await.unwrap();
    arena.events().subscribe(arena_handler).await.unwrap();

    lobby.events().publish(&event("chat")).await.unwrap();

    assert!(eventually_default(|| async { lobby_seen.lock().len() == 1 }).await);
    settle().await;
    assert!(arena_seen.lock().is_empty());
}

// ============================================================================
// Robustness
// ============================================================================

#[tokio::test]
async fn malformed_payload_is_dropped_without_closing_subscription() {
    let bus = MemoryPubSub::new();
    let raw: Arc<dyn PubSubEffects> = Arc::new(bus.handle());
    let broker: MessageBroker<StateEntry> =
        MessageBroker::new(Arc::new(bus.handle()), "room-1:state");
    let (seen, handler) = collector::<StateEntry>();
    broker.subscribe(handler).await.unwrap();

    raw.publish("room-1:state", b"garbage".to_vec()).await.unwrap();
    broker
        .publish(&StateEntry::new("ok", json!(true)))
        .await
        .unwrap();

    assert!(eventually_default(|| async { seen.lock().len() == 1 }).await);
    assert_eq!(seen.lock()[0].key, "ok");
}

#[tokio::test]
async fn dispose_removes_every_subscription_and_is_idempotent() {
    let bus = MemoryPubSub::new();
    let broker = EventBroker::new(Arc::new(bus.handle()), "room-1:events");
    let (_, h1) = collector::<Event>();
    let (_, h2) = collector::<Event>();
    broker.subscribe(h1).await.unwrap();
    broker.subscribe(h2).await.unwrap();
    assert_eq!(bus.subscriber_count("room-1:events").await, 2);

    broker.dispose().await.unwrap();
    broker.dispose().await.unwrap();

    assert_eq!(broker.subscription_count(), 0);
    assert_eq!(bus.subscriber_count("room-1:events").await, 0);
}
