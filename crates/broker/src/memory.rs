//! In-memory broker with the same at-least-once semantics as the Redis
//! implementation. Used for local runs without infrastructure and for
//! deterministic tests; delay timing is driven by the tokio clock, so paused
//! test time works.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use courier_common::types::Message;

use crate::{Broker, Inflight, RETRY_QUEUE};

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    queues: HashMap<String, VecDeque<String>>,
    delayed: Vec<(Instant, String)>,
    /// receipt -> (queue, payload)
    inflight: HashMap<String, (String, String)>,
    next_receipt: u64,
}

impl Inner {
    fn park(&mut self, queue: &str, payload: String) -> String {
        self.next_receipt += 1;
        let receipt = self.next_receipt.to_string();
        self.inflight
            .insert(receipt.clone(), (queue.to_string(), payload));
        receipt
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently waiting on a queue.
    pub fn queue_len(&self, queue: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Number of entries sitting on the delay queue (due or not).
    pub fn delayed_len(&self) -> usize {
        self.inner.lock().unwrap().delayed.len()
    }

    /// Number of received-but-unacknowledged messages.
    pub fn inflight_len(&self) -> usize {
        self.inner.lock().unwrap().inflight.len()
    }
}

impl Broker for MemoryBroker {
    async fn publish(&self, queue: &str, message: &Message) -> anyhow::Result<()> {
        let payload = serde_json::to_string(message)?;
        let mut inner = self.inner.lock().unwrap();
        inner
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(payload);
        Ok(())
    }

    async fn publish_delayed(&self, message: &Message, ttl_ms: u64) -> anyhow::Result<()> {
        let payload = serde_json::to_string(message)?;
        let due = Instant::now() + std::time::Duration::from_millis(ttl_ms);
        let mut inner = self.inner.lock().unwrap();
        inner.delayed.push((due, payload));
        Ok(())
    }

    async fn receive(&self, queue: &str) -> anyhow::Result<Option<Inflight>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(payload) = inner.queues.get_mut(queue).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        let message: Message = serde_json::from_str(&payload)?;
        let receipt = inner.park(queue, payload);
        Ok(Some(Inflight {
            queue: queue.to_string(),
            message,
            receipt,
        }))
    }

    async fn receive_expired(&self) -> anyhow::Result<Option<Inflight>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        let Some(idx) = inner.delayed.iter().position(|(due, _)| *due <= now) else {
            return Ok(None);
        };
        let (_, payload) = inner.delayed.remove(idx);
        let message: Message = serde_json::from_str(&payload)?;
        let receipt = inner.park(RETRY_QUEUE, payload);
        Ok(Some(Inflight {
            queue: RETRY_QUEUE.to_string(),
            message,
            receipt,
        }))
    }

    async fn ack(&self, inflight: &Inflight) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.inflight.remove(&inflight.receipt).is_none() {
            anyhow::bail!("unknown receipt {} (double ack?)", inflight.receipt);
        }
        Ok(())
    }

    async fn recover(&self, queue: &str) -> anyhow::Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let receipts: Vec<String> = inner
            .inflight
            .iter()
            .filter(|(_, (q, _))| q == queue)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        let mut recovered = 0u64;
        for receipt in receipts {
            if let Some((q, payload)) = inner.inflight.remove(&receipt) {
                inner.queues.entry(q).or_default().push_back(payload);
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn recover_expired(&self) -> anyhow::Result<u64> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        let receipts: Vec<String> = inner
            .inflight
            .iter()
            .filter(|(_, (q, _))| q == RETRY_QUEUE)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        let mut recovered = 0u64;
        for receipt in receipts {
            if let Some((_, payload)) = inner.inflight.remove(&receipt) {
                inner.delayed.push((now, payload));
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_common::types::Channel;
    use uuid::Uuid;

    fn make_message(body: &str) -> Message {
        Message {
            message_id: Uuid::new_v4(),
            trace_id: Uuid::new_v4(),
            channel: Channel::Email,
            recipient: "a@b.com".to_string(),
            body: body.to_string(),
            subject: None,
            metadata: serde_json::json!({}),
            retry_count: 0,
            scheduled_at: None,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_receive_is_fifo() {
        let broker = MemoryBroker::new();
        broker.publish("q", &make_message("first")).await.unwrap();
        broker.publish("q", &make_message("second")).await.unwrap();

        let a = broker.receive("q").await.unwrap().unwrap();
        let b = broker.receive("q").await.unwrap().unwrap();
        assert_eq!(a.message.body, "first");
        assert_eq!(b.message.body, "second");
        assert!(broker.receive("q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ack_removes_inflight_and_rejects_double_ack() {
        let broker = MemoryBroker::new();
        broker.publish("q", &make_message("m")).await.unwrap();

        let inflight = broker.receive("q").await.unwrap().unwrap();
        assert_eq!(broker.inflight_len(), 1);

        broker.ack(&inflight).await.unwrap();
        assert_eq!(broker.inflight_len(), 0);
        assert!(broker.ack(&inflight).await.is_err());
    }

    #[tokio::test]
    async fn test_recover_requeues_unacked() {
        let broker = MemoryBroker::new();
        broker.publish("q", &make_message("m")).await.unwrap();

        let _inflight = broker.receive("q").await.unwrap().unwrap();
        assert_eq!(broker.queue_len("q"), 0);

        let recovered = broker.recover("q").await.unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(broker.queue_len("q"), 1);
        assert_eq!(broker.inflight_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_entry_hidden_until_due() {
        let broker = MemoryBroker::new();
        broker
            .publish_delayed(&make_message("later"), 2000)
            .await
            .unwrap();

        assert!(broker.receive_expired().await.unwrap().is_none());

        tokio::time::advance(std::time::Duration::from_millis(2001)).await;

        let inflight = broker.receive_expired().await.unwrap().unwrap();
        assert_eq!(inflight.message.body, "later");
        assert_eq!(inflight.queue, RETRY_QUEUE);
    }
}
