use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery channels. Each channel has its own work queue and its own
/// provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Whatsapp,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Whatsapp];

    /// Name of the broker queue this channel's deliveries flow through.
    pub fn queue(&self) -> &'static str {
        match self {
            Channel::Email => "email_delivery_queue",
            Channel::Sms => "sms_delivery_queue",
            Channel::Whatsapp => "whatsapp_delivery_queue",
        }
    }

    /// Case-insensitive parse of a client-supplied channel name.
    pub fn parse(value: &str) -> Option<Channel> {
        match value.to_ascii_lowercase().as_str() {
            "email" => Some(Channel::Email),
            "sms" => Some(Channel::Sms),
            "whatsapp" => Some(Channel::Whatsapp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
            Channel::Whatsapp => write!(f, "whatsapp"),
        }
    }
}

/// Lifecycle status of a message. `Delivered` and `Failed` are terminal —
/// no transition may revert them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Processing,
    Delivered,
    Retrying,
    Failed,
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Delivered | MessageStatus::Failed)
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Pending => write!(f, "pending"),
            MessageStatus::Processing => write!(f, "processing"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Retrying => write!(f, "retrying"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The unit of work flowing through the pipeline. This is also the queue
/// envelope: it serializes to the camelCase JSON the broker carries between
/// the router, the delivery workers and the retry scheduler.
///
/// Payload fields (`channel`, `recipient`, `body`, `subject`, `metadata`) are
/// immutable after ingestion; retry copies only advance `retry_count`,
/// `scheduled_at` and `last_error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: Uuid,
    pub trace_id: Uuid,
    pub channel: Channel,
    pub recipient: String,
    pub body: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub retry_count: u32,
    /// Earliest time the next delivery attempt may start. Set only while the
    /// message sits on the delay queue awaiting a retry.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Most recent delivery failure reason. Never cleared once set.
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An outbound notification request as submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub channel: String,
    pub recipient: String,
    pub body: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// A message's durable lifecycle record as stored in Postgres.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub message_id: Uuid,
    pub trace_id: Uuid,
    pub channel: Channel,
    pub recipient: String,
    pub body: String,
    pub subject: Option<String>,
    pub metadata: serde_json::Value,
    pub status: MessageStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}
