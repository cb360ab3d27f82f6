//! The router: the only component that creates messages. Validates, checks
//! duplication, assigns identity, and publishes exactly one envelope to the
//! queue bound to the validated channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use courier_broker::Broker;
use courier_common::error::AppError;
use courier_common::status::StatusStore;
use courier_common::types::{Channel, Message, SendRequest};

use crate::dedup::{DedupStore, DuplicateDetector};
use crate::validate::validate_request;

/// Acceptance receipt returned to the ingestion layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteReceipt {
    pub message_id: Uuid,
    pub trace_id: Uuid,
    pub channel: Channel,
    pub queued_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct MessageRouter<B, D, S> {
    broker: B,
    detector: DuplicateDetector<D>,
    store: S,
}

impl<B, D, S> MessageRouter<B, D, S>
where
    B: Broker,
    D: DedupStore,
    S: StatusStore,
{
    pub fn new(broker: B, detector: DuplicateDetector<D>, store: S) -> Self {
        Self {
            broker,
            detector,
            store,
        }
    }

    /// Route a notification request: validate, dedup, assign identity,
    /// enqueue. Exactly one publish per accepted request; on publish failure
    /// the dedup fingerprint is released so the client may resubmit.
    pub async fn route(
        &self,
        request: &SendRequest,
        trace_id: Option<Uuid>,
    ) -> Result<RouteReceipt, AppError> {
        let channel = validate_request(request)?;

        if self.detector.is_duplicate(&request.body).await {
            tracing::warn!(channel = %channel, "Duplicate message rejected");
            return Err(AppError::Duplicate(
                "Duplicate message detected".to_string(),
            ));
        }

        let message = Message {
            message_id: Uuid::new_v4(),
            trace_id: trace_id.unwrap_or_else(Uuid::new_v4),
            channel,
            recipient: request.recipient.clone(),
            body: request.body.clone(),
            subject: request.subject.clone(),
            metadata: request
                .metadata
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
            retry_count: 0,
            scheduled_at: None,
            last_error: None,
            created_at: Utc::now(),
        };

        if let Err(e) = self.broker.publish(channel.queue(), &message).await {
            self.detector.forget(&request.body).await;
            tracing::error!(
                message_id = %message.message_id,
                trace_id = %message.trace_id,
                error = %e,
                "Failed to route message"
            );
            return Err(AppError::Queue(format!("Failed to enqueue message: {e}")));
        }

        // The message is already queued; a missing pending row only delays
        // visibility until the worker's first upsert.
        if let Err(e) = self.store.record_accepted(&message).await {
            tracing::warn!(
                message_id = %message.message_id,
                error = %e,
                "Failed to record accepted message"
            );
        }

        tracing::info!(
            message_id = %message.message_id,
            trace_id = %message.trace_id,
            queue = channel.queue(),
            "Message routed"
        );

        Ok(RouteReceipt {
            message_id: message.message_id,
            trace_id: message.trace_id,
            channel,
            queued_at: message.created_at,
        })
    }
}
