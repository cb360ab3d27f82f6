//! Ingestion-side routing: validate a notification request, reject duplicates,
//! assign identity, and publish exactly one envelope to the channel's queue.

pub mod dedup;
pub mod router;
pub mod validate;

pub use dedup::{DedupStore, DuplicateDetector, RedisDedup};
pub use router::{MessageRouter, RouteReceipt};
