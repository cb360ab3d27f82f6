//! Provider adapter seam.
//!
//! The pipeline never speaks a provider protocol itself; it hands the message
//! to a [`DeliveryAdapter`] and interprets a success/failure outcome. Tests
//! substitute deterministic adapters; production uses per-channel webhook
//! endpoints.

use std::collections::HashMap;

use courier_common::config::AppConfig;
use courier_common::types::{Channel, Message};

/// Result of one delivery attempt. Transport errors are folded into
/// `Failed` — from the pipeline's point of view there is only "delivered"
/// or "not delivered, for this reason".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        DeliveryOutcome::Failed {
            reason: reason.into(),
        }
    }
}

/// Attempt delivery of a message over its channel, reporting the outcome.
#[allow(async_fn_in_trait)]
pub trait DeliveryAdapter: Send + Sync {
    async fn deliver(&self, message: &Message) -> DeliveryOutcome;
}

/// Webhook adapter: POSTs the message payload as JSON to the channel's
/// configured provider endpoint.
#[derive(Clone)]
pub struct WebhookAdapter {
    client: reqwest::Client,
    endpoints: HashMap<Channel, String>,
}

impl WebhookAdapter {
    pub fn new(endpoints: HashMap<Channel, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut endpoints = HashMap::new();
        if let Some(url) = &config.email_provider_url {
            endpoints.insert(Channel::Email, url.clone());
        }
        if let Some(url) = &config.sms_provider_url {
            endpoints.insert(Channel::Sms, url.clone());
        }
        if let Some(url) = &config.whatsapp_provider_url {
            endpoints.insert(Channel::Whatsapp, url.clone());
        }
        Self::new(endpoints)
    }
}

impl DeliveryAdapter for WebhookAdapter {
    async fn deliver(&self, message: &Message) -> DeliveryOutcome {
        let Some(endpoint) = self.endpoints.get(&message.channel) else {
            return DeliveryOutcome::failed(format!(
                "no provider endpoint configured for channel {}",
                message.channel
            ));
        };

        let payload = serde_json::json!({
            "messageId": message.message_id,
            "traceId": message.trace_id,
            "recipient": message.recipient,
            "body": message.body,
            "subject": message.subject,
            "metadata": message.metadata,
        });

        match self.client.post(endpoint).json(&payload).send().await {
            Ok(response) if response.status().is_success() => DeliveryOutcome::Delivered,
            Ok(response) => {
                DeliveryOutcome::failed(format!("provider returned status {}", response.status()))
            }
            Err(e) => DeliveryOutcome::failed(format!("provider request failed: {e}")),
        }
    }
}
