//! Queue broker seam.
//!
//! The pipeline talks to its queues through the [`Broker`] trait: durable
//! FIFO-per-queue publish, at-least-once receive with explicit acknowledgment,
//! and a single delay queue whose entries become visible only after a per-entry
//! TTL. `RedisBroker` is the production implementation;
//! [`memory::MemoryBroker`] mirrors the same semantics in-process for local
//! runs and deterministic tests.
//!
//! Acknowledgment discipline: a received message stays parked in an in-flight
//! area until the consumer acks it. A consumer that crashes mid-delivery never
//! acks, and [`Broker::recover`] re-queues the parked entry on the next start —
//! that is the broker-level redelivery the at-least-once guarantee rests on.
//! Business-level redelivery (retries with backoff) is owned by the retry
//! scheduler, never by the broker.

pub mod memory;
pub mod redis;

use courier_common::types::Message;

/// Name of the delay queue carrying scheduled retry copies.
pub const RETRY_QUEUE: &str = "retry_queue";

/// A message handed to a consumer, awaiting acknowledgment.
#[derive(Debug, Clone)]
pub struct Inflight {
    /// Queue the message was received from.
    pub queue: String,
    /// Decoded message envelope.
    pub message: Message,
    /// Broker-specific token used to ack this exact delivery.
    pub receipt: String,
}

#[allow(async_fn_in_trait)]
pub trait Broker: Send + Sync {
    /// Durably append a message to a named queue. Exactly one publish per call;
    /// a failure means nothing was enqueued.
    async fn publish(&self, queue: &str, message: &Message) -> anyhow::Result<()>;

    /// Durably append a message to the delay queue. The entry becomes
    /// receivable via [`Broker::receive_expired`] once `ttl_ms` has elapsed.
    async fn publish_delayed(&self, message: &Message, ttl_ms: u64) -> anyhow::Result<()>;

    /// Receive the next message from a queue, parking it in-flight. Returns
    /// `None` when the queue is empty; consumers poll.
    async fn receive(&self, queue: &str) -> anyhow::Result<Option<Inflight>>;

    /// Receive the next delay-queue entry whose TTL has elapsed, parking it
    /// in-flight. Expiry granularity may be coarse; consumers must re-check
    /// the message's own `scheduled_at`.
    async fn receive_expired(&self) -> anyhow::Result<Option<Inflight>>;

    /// Acknowledge a received message, removing it from the in-flight area.
    async fn ack(&self, inflight: &Inflight) -> anyhow::Result<()>;

    /// Move messages left in-flight by a previous process back onto their
    /// queue. Returns the number of messages re-queued.
    async fn recover(&self, queue: &str) -> anyhow::Result<u64>;

    /// Like [`Broker::recover`], for delay-queue entries: parked entries go
    /// back to the delay queue as immediately due.
    async fn recover_expired(&self) -> anyhow::Result<u64>;
}
