//! Delay-queue consumer.
//!
//! Takes expired retry copies off the delay queue and feeds them back into
//! their original channel queue. Broker expiry granularity can be coarser
//! than the backoff, so an entry may surface early; the consumer re-arms a
//! local timer for the remaining delta rather than violating the "never
//! deliver before `scheduled_at`" guarantee. The channel-queue publish happens
//! before the ack, so a crash mid-reinjection redelivers instead of losing
//! the retry.

use std::time::Duration;

use courier_broker::{Broker, Inflight};
use courier_common::clock::Clock;

/// How often to poll the delay queue when it is empty.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct DelayReinjector<B, C> {
    broker: B,
    clock: C,
}

impl<B, C> DelayReinjector<B, C>
where
    B: Broker,
    C: Clock,
{
    pub fn new(broker: B, clock: C) -> Self {
        Self { broker, clock }
    }

    /// Consume the delay queue until the task is cancelled.
    pub async fn run(&self) -> anyhow::Result<()> {
        let recovered = self.broker.recover_expired().await?;
        if recovered > 0 {
            tracing::info!(recovered, "Re-queued in-flight delay entries from previous run");
        }

        tracing::info!("Delay-queue consumer started");

        loop {
            match self.broker.receive_expired().await {
                Ok(Some(inflight)) => {
                    if let Err(e) = self.reinject(&inflight).await {
                        tracing::error!(
                            message_id = %inflight.message.message_id,
                            error = %e,
                            "Failed to re-inject delayed message"
                        );
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                }
                Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
                Err(e) => {
                    tracing::error!(error = %e, "Delay-queue receive failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Re-inject one expired entry into its channel queue, waiting out any
    /// remaining delta when the broker expired it early.
    pub async fn reinject(&self, inflight: &Inflight) -> anyhow::Result<()> {
        let message = &inflight.message;

        if let Some(scheduled_at) = message.scheduled_at {
            let now = self.clock.now();
            if scheduled_at > now {
                let remaining = (scheduled_at - now).to_std().unwrap_or_default();
                tracing::debug!(
                    message_id = %message.message_id,
                    remaining_ms = remaining.as_millis() as u64,
                    "Delay entry surfaced early, re-arming timer"
                );
                tokio::time::sleep(remaining).await;
            }
        }

        self.broker.publish(message.channel.queue(), message).await?;
        self.broker.ack(inflight).await?;

        tracing::info!(
            message_id = %message.message_id,
            trace_id = %message.trace_id,
            retry_count = message.retry_count,
            queue = message.channel.queue(),
            "Retry re-injected into channel queue"
        );

        Ok(())
    }
}
