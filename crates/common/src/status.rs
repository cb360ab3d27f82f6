//! Durable per-message lifecycle records.
//!
//! The status store is the single source of truth for external readers. Every
//! write is an insert-or-update keyed by `message_id` — the same message passes
//! through multiple pipeline stages, and a retry chain replays the same key —
//! and every update refuses to revert a terminal state (`delivered`, `failed`).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::Message;

/// Write side of the message lifecycle record.
#[allow(async_fn_in_trait)]
pub trait StatusStore: Send + Sync {
    /// Record a freshly accepted message as `pending`. Idempotent: re-ingestion
    /// of an already-known `message_id` leaves the existing record untouched.
    async fn record_accepted(&self, message: &Message) -> anyhow::Result<()>;

    /// Upsert the record to `processing` for the current attempt. Clears
    /// `scheduled_at` (the message is no longer waiting) and carries the
    /// attempt's `retry_count`; `last_error` is left as-is for diagnostics.
    async fn mark_processing(&self, message: &Message) -> anyhow::Result<()>;

    /// Terminal success. Stamps `delivered_at`.
    async fn mark_delivered(
        &self,
        message_id: Uuid,
        delivered_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// A retry copy has been durably queued: bump `retry_count`, record the
    /// failure reason and the time before which no new attempt may start.
    async fn mark_retrying(
        &self,
        message_id: Uuid,
        retry_count: u32,
        error: &str,
        scheduled_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Terminal failure after exhausted retries (or an unschedulable retry).
    async fn mark_failed(&self, message_id: Uuid, error: &str) -> anyhow::Result<()>;
}

/// PostgreSQL-backed status store over the `messages` table.
#[derive(Clone)]
pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl StatusStore for PgStatusStore {
    async fn record_accepted(&self, message: &Message) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                message_id, trace_id, channel, recipient, body, subject,
                metadata, status, retry_count, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9)
            ON CONFLICT (message_id) DO NOTHING
            "#,
        )
        .bind(message.message_id)
        .bind(message.trace_id)
        .bind(message.channel.to_string())
        .bind(&message.recipient)
        .bind(&message.body)
        .bind(&message.subject)
        .bind(&message.metadata)
        .bind(message.retry_count as i32)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_processing(&self, message: &Message) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                message_id, trace_id, channel, recipient, body, subject,
                metadata, status, retry_count, last_error, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'processing', $8, $9, $10)
            ON CONFLICT (message_id) DO UPDATE SET
                status = 'processing',
                retry_count = EXCLUDED.retry_count,
                scheduled_at = NULL
            WHERE messages.status NOT IN ('delivered', 'failed')
            "#,
        )
        .bind(message.message_id)
        .bind(message.trace_id)
        .bind(message.channel.to_string())
        .bind(&message.recipient)
        .bind(&message.body)
        .bind(&message.subject)
        .bind(&message.metadata)
        .bind(message.retry_count as i32)
        .bind(&message.last_error)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_delivered(
        &self,
        message_id: Uuid,
        delivered_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 'delivered', delivered_at = $2, scheduled_at = NULL
            WHERE message_id = $1 AND status NOT IN ('delivered', 'failed')
            "#,
        )
        .bind(message_id)
        .bind(delivered_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_retrying(
        &self,
        message_id: Uuid,
        retry_count: u32,
        error: &str,
        scheduled_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 'retrying', retry_count = $2, last_error = $3, scheduled_at = $4
            WHERE message_id = $1 AND status NOT IN ('delivered', 'failed')
            "#,
        )
        .bind(message_id)
        .bind(retry_count as i32)
        .bind(error)
        .bind(scheduled_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, message_id: Uuid, error: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 'failed', last_error = $2, scheduled_at = NULL
            WHERE message_id = $1 AND status NOT IN ('delivered', 'failed')
            "#,
        )
        .bind(message_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
