//! Content-hash deduplication with a fixed expiry window.
//!
//! A message body is fingerprinted (SHA-256 of the trimmed body) and inserted
//! into the backing store with a TTL. The insert is atomic insert-if-absent
//! (`SET NX EX` on Redis), so concurrent routers need no message-level lock,
//! and a repeat observation does NOT refresh the window — the fingerprint
//! expires `ttl` after its first sighting, full stop.
//!
//! On a backing-store failure the detector fails open: the message is treated
//! as not-duplicate. A transient Redis outage must never silently drop
//! legitimate traffic; the cost is the occasional duplicate send, which the
//! at-least-once delivery contract already tolerates.

use std::time::Duration;

use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of the normalized (whitespace-trimmed) message body.
pub fn fingerprint(body: &str) -> String {
    let digest = Sha256::digest(body.trim().as_bytes());
    hex::encode(digest)
}

/// Backing store for fingerprints. `insert_if_absent` must be atomic.
#[allow(async_fn_in_trait)]
pub trait DedupStore: Send + Sync {
    /// Returns `true` if the key was inserted (first observation), `false`
    /// if it already existed. Must not extend the TTL of an existing key.
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> anyhow::Result<bool>;

    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Redis fingerprint store.
#[derive(Clone)]
pub struct RedisDedup {
    conn: ConnectionManager,
}

impl RedisDedup {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

impl DedupStore for RedisDedup {
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();

        // SET key "1" NX EX ttl — Some("OK") if inserted, None if present.
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL").arg(key).query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

/// Duplicate detector over a fingerprint store.
#[derive(Clone)]
pub struct DuplicateDetector<D> {
    store: D,
    ttl: Duration,
}

impl<D: DedupStore> DuplicateDetector<D> {
    pub fn new(store: D, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Check whether this body was already seen within the window, recording
    /// it if not. Fails open on store errors.
    pub async fn is_duplicate(&self, body: &str) -> bool {
        let key = format!("duplicate:{}", fingerprint(body));

        match self.store.insert_if_absent(&key, self.ttl).await {
            Ok(inserted) => !inserted,
            Err(e) => {
                tracing::error!(error = %e, "Duplicate check failed, letting message through");
                false
            }
        }
    }

    /// Release a fingerprint recorded by `is_duplicate`. Used when the
    /// subsequent enqueue fails, so the rejected request can be resubmitted.
    /// Best effort: on store failure the fingerprint simply ages out.
    pub async fn forget(&self, body: &str) {
        let key = format!("duplicate:{}", fingerprint(body));
        if let Err(e) = self.store.remove(&key).await {
            tracing::warn!(error = %e, "Failed to release dedup fingerprint");
        }
    }
}
