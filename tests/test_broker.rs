use std::collections::HashSet;

use serde_json::json;

use nivo::events::EventEnvelope;
use nivo::gateway::broker::{Broker, CLIENT_QUEUE_CAPACITY};

fn topics(names: &[&str]) -> HashSet<String> {
    names.iter().map(|t| t.to_string()).collect()
}

fn event(topic: &str, n: usize) -> EventEnvelope {
    EventEnvelope::new(topic, "transaction.created", json!({ "seq": n }))
}

#[tokio::test]
async fn broadcast_reaches_matching_and_wildcard_subscribers() {
    let broker = Broker::new();
    let (_id1, mut rx1) = broker.register(topics(&["transactions"]));
    let (_id2, mut rx2) = broker.register(topics(&["all"]));
    let (_id3, mut rx3) = broker.register(topics(&["wallets"]));

    let delivered = broker.broadcast(&event("transactions", 1));
    assert_eq!(delivered, 2);

    assert_eq!(rx1.recv().await.unwrap().data["seq"], 1);
    assert_eq!(rx2.recv().await.unwrap().topic, "transactions");
    assert!(rx3.try_recv().is_err());
}

#[tokio::test]
async fn per_client_order_matches_broadcast_order() {
    let broker = Broker::new();
    let (_id, mut rx) = broker.register(topics(&["all"]));

    for n in 0..5 {
        broker.broadcast(&event("transactions", n));
    }
    for n in 0..5 {
        assert_eq!(rx.recv().await.unwrap().data["seq"], n);
    }
}

#[tokio::test]
async fn slow_consumer_drops_silently_and_recovers() {
    let broker = Broker::new();
    let (_slow, mut slow_rx) = broker.register(topics(&["all"]));

    // Fill past the bound without consuming.
    for n in 0..CLIENT_QUEUE_CAPACITY + 25 {
        broker.broadcast(&event("transactions", n));
    }

    // Exactly the queue capacity arrived; the overflow is gone.
    let mut received = 0;
    while slow_rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, CLIENT_QUEUE_CAPACITY);

    // Once drained, delivery resumes.
    broker.broadcast(&event("transactions", 999));
    assert_eq!(slow_rx.recv().await.unwrap().data["seq"], 999);
}

#[tokio::test]
async fn stuck_consumer_does_not_delay_others() {
    let broker = Broker::new();
    let (_stuck, stuck_rx) = broker.register(topics(&["all"]));
    let (_live, mut live_rx) = broker.register(topics(&["all"]));

    // The stuck client's queue saturates; the live one keeps receiving
    // every event.
    for n in 0..CLIENT_QUEUE_CAPACITY + 50 {
        broker.broadcast(&event("transactions", n));
        assert_eq!(live_rx.recv().await.unwrap().data["seq"], n);
    }

    drop(stuck_rx);
}

#[tokio::test]
async fn unregister_removes_the_client() {
    let broker = Broker::new();
    let (id, mut rx) = broker.register(topics(&["all"]));
    assert_eq!(broker.client_count(), 1);

    broker.unregister(&id);
    assert_eq!(broker.client_count(), 0);
    assert_eq!(broker.broadcast(&event("transactions", 1)), 0);

    // The sender side is gone, so the stream ends.
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn shutdown_closes_every_stream() {
    let broker = Broker::new();
    let (_a, mut rx_a) = broker.register(topics(&["all"]));
    let (_b, mut rx_b) = broker.register(topics(&["transactions"]));

    broker.shutdown();
    assert_eq!(broker.client_count(), 0);
    assert!(rx_a.recv().await.is_none());
    assert!(rx_b.recv().await.is_none());
}

#[tokio::test]
async fn closed_receivers_are_reaped_on_broadcast() {
    let broker = Broker::new();
    let (_kept, mut kept_rx) = broker.register(topics(&["all"]));
    let (_gone, gone_rx) = broker.register(topics(&["all"]));
    drop(gone_rx);

    assert_eq!(broker.broadcast(&event("transactions", 1)), 1);
    assert_eq!(broker.client_count(), 1);
    assert_eq!(kept_rx.recv().await.unwrap().data["seq"], 1);
}
