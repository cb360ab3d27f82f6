//! The delivery side of the pipeline: channel-queue consumers that invoke a
//! provider adapter, interpret the outcome, update the status store, and hand
//! failures to the retry scheduler; plus the delay-queue consumer that feeds
//! scheduled retries back into the channel queues.

pub mod adapter;
pub mod reinject;
pub mod retry;
pub mod worker;

pub use adapter::{DeliveryAdapter, DeliveryOutcome, WebhookAdapter};
pub use reinject::DelayReinjector;
pub use retry::{RetryDecision, RetryPolicy, RetryScheduler};
pub use worker::DeliveryWorker;
