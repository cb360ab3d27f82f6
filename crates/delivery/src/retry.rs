//! Retry scheduling with exponential backoff.
//!
//! The backoff function is pure and the clock is injected, so the schedule is
//! reproducible without wall-clock dependence. The scheduler publishes the
//! retry copy to the delay queue *before* the caller acks the original — a
//! crash in between redelivers the original, never loses the message.

use chrono::Duration as ChronoDuration;
use chrono::{DateTime, Utc};

use courier_broker::Broker;
use courier_common::clock::Clock;
use courier_common::types::Message;

/// Backoff parameters. Defaults give the sequence 1s, 2s, 4s.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt following `retry_count` failures:
    /// `initial_backoff_ms * 2^retry_count`, saturating.
    pub fn backoff_ms(&self, retry_count: u32) -> u64 {
        self.initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(retry_count))
    }
}

/// Whether a failed delivery gets another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// A retry copy is durably queued; the stored record should advance to
    /// `retrying` with these values.
    Scheduled {
        retry_count: u32,
        scheduled_at: DateTime<Utc>,
    },
    /// No retry: the caller must transition the message to terminal `failed`.
    Exhausted,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Schedule a retry for a failed message, if the budget allows.
    ///
    /// The retry copy carries the original payload unchanged with
    /// `retry_count + 1`, the failure reason, and the earliest time the next
    /// attempt may start. A delay-queue publish failure is reported as
    /// `Exhausted` so the caller degrades to terminal `failed` instead of
    /// silently dropping the retry.
    pub async fn schedule<B: Broker, C: Clock>(
        &self,
        broker: &B,
        clock: &C,
        message: &Message,
        error: &str,
    ) -> RetryDecision {
        if message.retry_count >= self.policy.max_retries {
            tracing::error!(
                message_id = %message.message_id,
                trace_id = %message.trace_id,
                retry_count = message.retry_count,
                error,
                "Max retries exceeded"
            );
            return RetryDecision::Exhausted;
        }

        let backoff_ms = self.policy.backoff_ms(message.retry_count);
        // A saturated backoff must not wrap into the past.
        let delay = ChronoDuration::milliseconds(i64::try_from(backoff_ms).unwrap_or(i64::MAX));
        let scheduled_at = clock
            .now()
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut retry = message.clone();
        retry.retry_count += 1;
        retry.scheduled_at = Some(scheduled_at);
        retry.last_error = Some(error.to_string());

        match broker.publish_delayed(&retry, backoff_ms).await {
            Ok(()) => {
                tracing::warn!(
                    message_id = %retry.message_id,
                    trace_id = %retry.trace_id,
                    retry_count = retry.retry_count,
                    backoff_ms,
                    channel = %retry.channel,
                    "Message scheduled for retry"
                );
                RetryDecision::Scheduled {
                    retry_count: retry.retry_count,
                    scheduled_at,
                }
            }
            Err(e) => {
                tracing::error!(
                    message_id = %message.message_id,
                    trace_id = %message.trace_id,
                    error = %e,
                    "Failed to schedule retry"
                );
                RetryDecision::Exhausted
            }
        }
    }
}
