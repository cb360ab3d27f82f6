//! Channel-queue consumer.
//!
//! One worker task per channel queue, processing one message at a time
//! (prefetch 1): receive, mark `processing`, invoke the adapter under a
//! timeout, interpret the outcome, and acknowledge.
//!
//! Acknowledgment happens on every path — success, retry, terminal failure,
//! store fault, timeout. The broker's redelivery-on-nack must never be the
//! retry mechanism; business-level redelivery is owned by the retry scheduler,
//! and by the time we ack a failed message its replacement retry copy (if any)
//! is already durably queued.

use std::time::Duration;

use courier_broker::{Broker, Inflight};
use courier_common::clock::Clock;
use courier_common::status::StatusStore;
use courier_common::types::Message;

use crate::adapter::{DeliveryAdapter, DeliveryOutcome};
use crate::retry::{RetryDecision, RetryScheduler};

/// How often to poll the queue when it is empty.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct DeliveryWorker<B, S, A, C> {
    broker: B,
    store: S,
    adapter: A,
    clock: C,
    scheduler: RetryScheduler,
    delivery_timeout: Duration,
}

impl<B, S, A, C> DeliveryWorker<B, S, A, C>
where
    B: Broker,
    S: StatusStore,
    A: DeliveryAdapter,
    C: Clock,
{
    pub fn new(
        broker: B,
        store: S,
        adapter: A,
        clock: C,
        scheduler: RetryScheduler,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            store,
            adapter,
            clock,
            scheduler,
            delivery_timeout,
        }
    }

    /// Consume a queue until the task is cancelled. Re-queues messages left
    /// in-flight by a previous process before taking new work.
    pub async fn run(&self, queue: &str) -> anyhow::Result<()> {
        let recovered = self.broker.recover(queue).await?;
        if recovered > 0 {
            tracing::info!(queue, recovered, "Re-queued in-flight messages from previous run");
        }

        tracing::info!(queue, "Delivery worker started");

        loop {
            match self.broker.receive(queue).await {
                Ok(Some(inflight)) => {
                    if let Err(e) = self.handle(&inflight).await {
                        tracing::error!(
                            queue,
                            message_id = %inflight.message.message_id,
                            error = %e,
                            "Failed to process message"
                        );
                    }
                }
                Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
                Err(e) => {
                    tracing::error!(queue, error = %e, "Queue receive failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Process one dequeued message end to end, acknowledging it exactly once.
    pub async fn handle(&self, inflight: &Inflight) -> anyhow::Result<()> {
        let message = &inflight.message;
        let started = tokio::time::Instant::now();

        tracing::info!(
            message_id = %message.message_id,
            trace_id = %message.trace_id,
            channel = %message.channel,
            retry_count = message.retry_count,
            "Processing message"
        );

        match self.attempt(message).await {
            DeliveryOutcome::Delivered => {
                if let Err(e) = self
                    .store
                    .mark_delivered(message.message_id, self.clock.now())
                    .await
                {
                    tracing::error!(
                        message_id = %message.message_id,
                        error = %e,
                        "Failed to record delivered status"
                    );
                }
                tracing::info!(
                    message_id = %message.message_id,
                    trace_id = %message.trace_id,
                    channel = %message.channel,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Message delivered"
                );
            }
            DeliveryOutcome::Failed { reason } => {
                match self
                    .scheduler
                    .schedule(&self.broker, &self.clock, message, &reason)
                    .await
                {
                    RetryDecision::Scheduled {
                        retry_count,
                        scheduled_at,
                    } => {
                        if let Err(e) = self
                            .store
                            .mark_retrying(message.message_id, retry_count, &reason, scheduled_at)
                            .await
                        {
                            tracing::error!(
                                message_id = %message.message_id,
                                error = %e,
                                "Failed to record retrying status"
                            );
                        }
                    }
                    RetryDecision::Exhausted => {
                        if let Err(e) = self.store.mark_failed(message.message_id, &reason).await {
                            tracing::error!(
                                message_id = %message.message_id,
                                error = %e,
                                "Failed to record failed status"
                            );
                        }
                        tracing::error!(
                            message_id = %message.message_id,
                            trace_id = %message.trace_id,
                            retry_count = message.retry_count,
                            error = %reason,
                            "Message failed permanently"
                        );
                    }
                }
            }
        }

        self.broker.ack(inflight).await
    }

    /// One delivery attempt: upsert `processing`, then call the adapter under
    /// the configured timeout. Store faults and timeouts are failures like any
    /// other and feed the same retry path.
    async fn attempt(&self, message: &Message) -> DeliveryOutcome {
        if let Err(e) = self.store.mark_processing(message).await {
            return DeliveryOutcome::failed(format!("status store unavailable: {e}"));
        }

        match tokio::time::timeout(self.delivery_timeout, self.adapter.deliver(message)).await {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::failed(format!(
                "delivery timed out after {}ms",
                self.delivery_timeout.as_millis()
            )),
        }
    }
}
