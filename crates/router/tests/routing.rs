//! Router behavior against deterministic in-process collaborators.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use courier_broker::memory::MemoryBroker;
use courier_broker::{Broker, Inflight};
use courier_common::error::AppError;
use courier_common::status::StatusStore;
use courier_common::types::{Channel, Message, SendRequest};
use courier_router::{DedupStore, DuplicateDetector, MessageRouter};

// ============================================================
// Test doubles
// ============================================================

#[derive(Clone, Default)]
struct MemoryDedup {
    seen: Arc<Mutex<std::collections::HashSet<String>>>,
}

impl DedupStore for MemoryDedup {
    async fn insert_if_absent(&self, key: &str, _ttl: Duration) -> anyhow::Result<bool> {
        Ok(self.seen.lock().unwrap().insert(key.to_string()))
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.seen.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Records accepted message ids; other transitions are unused by the router.
#[derive(Clone, Default)]
struct RecordingStore {
    accepted: Arc<Mutex<Vec<Uuid>>>,
}

impl StatusStore for RecordingStore {
    async fn record_accepted(&self, message: &Message) -> anyhow::Result<()> {
        self.accepted.lock().unwrap().push(message.message_id);
        Ok(())
    }

    async fn mark_processing(&self, _message: &Message) -> anyhow::Result<()> {
        unreachable!("router never marks processing")
    }

    async fn mark_delivered(&self, _id: Uuid, _at: DateTime<Utc>) -> anyhow::Result<()> {
        unreachable!("router never marks delivered")
    }

    async fn mark_retrying(
        &self,
        _id: Uuid,
        _retry_count: u32,
        _error: &str,
        _scheduled_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        unreachable!("router never marks retrying")
    }

    async fn mark_failed(&self, _id: Uuid, _error: &str) -> anyhow::Result<()> {
        unreachable!("router never marks failed")
    }
}

/// Broker whose channel publishes fail, for the compensation path.
#[derive(Clone)]
struct DownBroker;

impl Broker for DownBroker {
    async fn publish(&self, _queue: &str, _message: &Message) -> anyhow::Result<()> {
        anyhow::bail!("broker unreachable")
    }

    async fn publish_delayed(&self, _message: &Message, _ttl_ms: u64) -> anyhow::Result<()> {
        anyhow::bail!("broker unreachable")
    }

    async fn receive(&self, _queue: &str) -> anyhow::Result<Option<Inflight>> {
        Ok(None)
    }

    async fn receive_expired(&self) -> anyhow::Result<Option<Inflight>> {
        Ok(None)
    }

    async fn ack(&self, _inflight: &Inflight) -> anyhow::Result<()> {
        Ok(())
    }

    async fn recover(&self, _queue: &str) -> anyhow::Result<u64> {
        Ok(0)
    }

    async fn recover_expired(&self) -> anyhow::Result<u64> {
        Ok(0)
    }
}

fn request(channel: &str, recipient: &str, body: &str) -> SendRequest {
    SendRequest {
        channel: channel.to_string(),
        recipient: recipient.to_string(),
        body: body.to_string(),
        subject: None,
        metadata: None,
    }
}

fn router_with(
    broker: MemoryBroker,
) -> MessageRouter<MemoryBroker, MemoryDedup, RecordingStore> {
    MessageRouter::new(
        broker,
        DuplicateDetector::new(MemoryDedup::default(), Duration::from_secs(3600)),
        RecordingStore::default(),
    )
}

// ============================================================
// Routing
// ============================================================

#[tokio::test]
async fn test_accepted_request_is_published_once_to_channel_queue() {
    let broker = MemoryBroker::new();
    let router = router_with(broker.clone());

    let receipt = router
        .route(&request("email", "a@b.com", "hi"), None)
        .await
        .unwrap();

    assert_eq!(receipt.channel, Channel::Email);
    assert_eq!(broker.queue_len("email_delivery_queue"), 1);
    assert_eq!(broker.queue_len("sms_delivery_queue"), 0);

    let inflight = broker.receive("email_delivery_queue").await.unwrap().unwrap();
    assert_eq!(inflight.message.message_id, receipt.message_id);
    assert_eq!(inflight.message.trace_id, receipt.trace_id);
    assert_eq!(inflight.message.retry_count, 0);
    assert!(inflight.message.scheduled_at.is_none());
}

#[tokio::test]
async fn test_supplied_trace_id_is_threaded_through() {
    let broker = MemoryBroker::new();
    let router = router_with(broker.clone());
    let trace_id = Uuid::new_v4();

    let receipt = router
        .route(&request("sms", "+15550100123", "hi"), Some(trace_id))
        .await
        .unwrap();

    assert_eq!(receipt.trace_id, trace_id);
    let inflight = broker.receive("sms_delivery_queue").await.unwrap().unwrap();
    assert_eq!(inflight.message.trace_id, trace_id);
}

#[tokio::test]
async fn test_duplicate_body_is_rejected_and_not_enqueued() {
    let broker = MemoryBroker::new();
    let router = router_with(broker.clone());

    router
        .route(&request("email", "a@b.com", "hi"), None)
        .await
        .unwrap();

    let err = router
        .route(&request("email", "other@b.com", "hi"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Duplicate(_)));
    assert_eq!(broker.queue_len("email_delivery_queue"), 1);
}

#[tokio::test]
async fn test_validation_failure_is_rejected_before_dedup_or_enqueue() {
    let broker = MemoryBroker::new();
    let router = router_with(broker.clone());

    let err = router
        .route(&request("email", "no-at-sign", "hi"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // The rejected body must not have been fingerprinted.
    let receipt = router
        .route(&request("email", "a@b.com", "hi"), None)
        .await
        .unwrap();
    assert_eq!(receipt.channel, Channel::Email);
}

#[tokio::test]
async fn test_accepted_message_is_recorded_pending() {
    let broker = MemoryBroker::new();
    let store = RecordingStore::default();
    let router = MessageRouter::new(
        broker,
        DuplicateDetector::new(MemoryDedup::default(), Duration::from_secs(3600)),
        store.clone(),
    );

    let receipt = router
        .route(&request("whatsapp", "+4915551234", "hi"), None)
        .await
        .unwrap();

    assert_eq!(*store.accepted.lock().unwrap(), vec![receipt.message_id]);
}

#[tokio::test]
async fn test_publish_failure_releases_fingerprint() {
    let dedup = MemoryDedup::default();
    let down = MessageRouter::new(
        DownBroker,
        DuplicateDetector::new(dedup.clone(), Duration::from_secs(3600)),
        RecordingStore::default(),
    );

    let err = down
        .route(&request("email", "a@b.com", "hi"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Queue(_)));

    // The same body must be routable once the broker is back: the failed
    // attempt left no dedup record behind.
    let broker = MemoryBroker::new();
    let up = MessageRouter::new(
        broker.clone(),
        DuplicateDetector::new(dedup, Duration::from_secs(3600)),
        RecordingStore::default(),
    );
    up.route(&request("email", "a@b.com", "hi"), None)
        .await
        .unwrap();
    assert_eq!(broker.queue_len("email_delivery_queue"), 1);
}
