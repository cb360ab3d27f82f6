//! Integration tests for the Redis broker.
//!
//! Requires a running Redis with `REDIS_URL` env var set (defaults to
//! `redis://localhost:6379`). Run with:
//!
//! ```bash
//! cargo test -p courier-broker --test redis -- --ignored --nocapture
//! ```

use chrono::Utc;
use uuid::Uuid;

use courier_broker::redis::RedisBroker;
use courier_broker::{Broker, RETRY_QUEUE};
use courier_common::types::{Channel, Message};

async fn connect() -> RedisBroker {
    let url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let client = redis::Client::open(url).unwrap();
    let conn = redis::aio::ConnectionManager::new(client).await.unwrap();
    RedisBroker::new(conn)
}

fn make_message(queue_tag: &str) -> Message {
    Message {
        message_id: Uuid::new_v4(),
        trace_id: Uuid::new_v4(),
        channel: Channel::Email,
        recipient: "a@b.com".to_string(),
        body: format!("integration {queue_tag} {}", Uuid::new_v4()),
        subject: None,
        metadata: serde_json::json!({}),
        retry_count: 0,
        scheduled_at: None,
        last_error: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
#[ignore]
async fn test_publish_receive_ack_roundtrip() {
    let broker = connect().await;
    let queue = format!("it_{}", Uuid::new_v4().simple());
    let message = make_message(&queue);

    broker.publish(&queue, &message).await.unwrap();

    let inflight = broker.receive(&queue).await.unwrap().unwrap();
    assert_eq!(inflight.message.message_id, message.message_id);
    assert_eq!(inflight.message.body, message.body);

    broker.ack(&inflight).await.unwrap();

    // Acked messages are gone: nothing to recover.
    assert_eq!(broker.recover(&queue).await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn test_unacked_message_is_recoverable() {
    let broker = connect().await;
    let queue = format!("it_{}", Uuid::new_v4().simple());
    let message = make_message(&queue);

    broker.publish(&queue, &message).await.unwrap();
    let _inflight = broker.receive(&queue).await.unwrap().unwrap();

    // Simulate a crash: never ack, then recover on "restart".
    assert_eq!(broker.recover(&queue).await.unwrap(), 1);

    let inflight = broker.receive(&queue).await.unwrap().unwrap();
    assert_eq!(inflight.message.message_id, message.message_id);
    broker.ack(&inflight).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_receive_on_empty_queue_returns_none_promptly() {
    let broker = connect().await;
    let queue = format!("it_{}", Uuid::new_v4().simple());

    // Receives must not block the shared connection while a queue is idle.
    let started = std::time::Instant::now();
    assert!(broker.receive(&queue).await.unwrap().is_none());
    assert!(started.elapsed() < std::time::Duration::from_secs(1));
}

#[tokio::test]
#[ignore]
async fn test_delayed_entry_expires() {
    let broker = connect().await;
    let mut message = make_message(RETRY_QUEUE);
    message.retry_count = 1;

    broker.publish_delayed(&message, 200).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    // Drain until we find our entry; other expired test entries may precede it.
    loop {
        let Some(inflight) = broker.receive_expired().await.unwrap() else {
            panic!("expected a due delay-queue entry");
        };
        let found = inflight.message.message_id == message.message_id;
        broker.ack(&inflight).await.unwrap();
        if found {
            break;
        }
    }
}

#[tokio::test]
#[ignore]
async fn test_unacked_delay_entry_is_recoverable() {
    let broker = connect().await;
    let mut message = make_message(RETRY_QUEUE);
    message.retry_count = 2;

    broker.publish_delayed(&message, 0).await.unwrap();

    // Park our entry in-flight, then "crash" without acking it.
    loop {
        let Some(inflight) = broker.receive_expired().await.unwrap() else {
            panic!("expected a due delay-queue entry");
        };
        if inflight.message.message_id == message.message_id {
            break;
        }
        broker.ack(&inflight).await.unwrap();
    }

    assert!(broker.recover_expired().await.unwrap() >= 1);

    // The recovered entry is due again, payload intact.
    loop {
        let Some(inflight) = broker.receive_expired().await.unwrap() else {
            panic!("expected the recovered delay-queue entry");
        };
        let found = inflight.message.message_id == message.message_id;
        broker.ack(&inflight).await.unwrap();
        if found {
            assert_eq!(inflight.message.retry_count, 2);
            break;
        }
    }
}
