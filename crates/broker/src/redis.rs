//! Redis-backed broker.
//!
//! Channel queues are Redis lists: `LPUSH` to publish, `LMOVE` into a
//! `{queue}:inflight` list to receive, `LREM` on the in-flight list to ack.
//! Receives are non-blocking and callers poll: every consumer shares one
//! multiplexed `ConnectionManager`, and a blocking pop would hold that
//! connection and stall all other consumers behind it.
//! The delay queue is a sorted set scored by due time (epoch millis); expired
//! members move to their own in-flight list before being handed out, so a
//! crash between receive and ack never loses the entry.

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Direction};

use courier_common::types::Message;

use crate::{Broker, Inflight, RETRY_QUEUE};

#[derive(Clone)]
pub struct RedisBroker {
    conn: ConnectionManager,
}

impl RedisBroker {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn inflight_key(queue: &str) -> String {
        format!("{queue}:inflight")
    }
}

impl Broker for RedisBroker {
    async fn publish(&self, queue: &str, message: &Message) -> anyhow::Result<()> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue, payload).await?;
        Ok(())
    }

    async fn publish_delayed(&self, message: &Message, ttl_ms: u64) -> anyhow::Result<()> {
        let payload = serde_json::to_string(message)?;
        let due_at_ms = Utc::now().timestamp_millis() + ttl_ms as i64;
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(RETRY_QUEUE, payload, due_at_ms)
            .await?;
        Ok(())
    }

    async fn receive(&self, queue: &str) -> anyhow::Result<Option<Inflight>> {
        let inflight_key = Self::inflight_key(queue);
        let mut conn = self.conn.clone();

        // LMOVE, not BLMOVE: blocking commands monopolize the shared
        // multiplexed connection.
        let payload: Option<String> = conn
            .lmove(queue, &inflight_key, Direction::Right, Direction::Left)
            .await?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match serde_json::from_str::<Message>(&payload) {
            Ok(message) => Ok(Some(Inflight {
                queue: queue.to_string(),
                message,
                receipt: payload,
            })),
            Err(e) => {
                // Poison message: drop it rather than redeliver it forever.
                tracing::error!(queue, error = %e, "Dropping undecodable queue payload");
                conn.lrem::<_, _, ()>(&inflight_key, 1, &payload).await?;
                Ok(None)
            }
        }
    }

    async fn receive_expired(&self) -> anyhow::Result<Option<Inflight>> {
        let now_ms = Utc::now().timestamp_millis();
        let inflight_key = Self::inflight_key(RETRY_QUEUE);
        let mut conn = self.conn.clone();

        let due: Vec<String> = conn
            .zrangebyscore_limit(RETRY_QUEUE, "-inf", now_ms, 0, 1)
            .await?;

        let Some(payload) = due.into_iter().next() else {
            return Ok(None);
        };

        // Park the entry in-flight in the same transaction that removes it
        // from the delay queue.
        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(RETRY_QUEUE, &payload)
            .lpush(&inflight_key, &payload);
        pipe.query_async::<()>(&mut conn).await?;

        match serde_json::from_str::<Message>(&payload) {
            Ok(message) => Ok(Some(Inflight {
                queue: RETRY_QUEUE.to_string(),
                message,
                receipt: payload,
            })),
            Err(e) => {
                tracing::error!(error = %e, "Dropping undecodable delay-queue payload");
                conn.lrem::<_, _, ()>(&inflight_key, 1, &payload).await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, inflight: &Inflight) -> anyhow::Result<()> {
        let inflight_key = Self::inflight_key(&inflight.queue);
        let mut conn = self.conn.clone();
        conn.lrem::<_, _, ()>(&inflight_key, 1, &inflight.receipt)
            .await?;
        Ok(())
    }

    async fn recover(&self, queue: &str) -> anyhow::Result<u64> {
        let inflight_key = Self::inflight_key(queue);
        let mut conn = self.conn.clone();
        let mut recovered = 0u64;

        loop {
            let moved: Option<String> = conn
                .lmove(&inflight_key, queue, Direction::Right, Direction::Left)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        Ok(recovered)
    }

    async fn recover_expired(&self) -> anyhow::Result<u64> {
        let inflight_key = Self::inflight_key(RETRY_QUEUE);
        let now_ms = Utc::now().timestamp_millis();
        let mut conn = self.conn.clone();
        let mut recovered = 0u64;

        // Pop and re-add must happen in one step; a crash between a separate
        // RPOP and ZADD would drop the entry. Already expired once, so the
        // entry goes back due immediately.
        let script = redis::Script::new(
            r#"
            local payload = redis.call('RPOP', KEYS[1])
            if payload then
                redis.call('ZADD', KEYS[2], ARGV[1], payload)
                return 1
            end
            return 0
            "#,
        );

        loop {
            let moved: u64 = script
                .key(&inflight_key)
                .key(RETRY_QUEUE)
                .arg(now_ms)
                .invoke_async(&mut conn)
                .await?;
            if moved == 0 {
                break;
            }
            recovered += 1;
        }

        Ok(recovered)
    }
}
