use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock;
use crate::context::HEADER_INTERNAL_TOKEN;

pub mod topics {
    pub const TRANSACTIONS: &str = "transactions";
    pub const WALLETS: &str = "wallets";
    pub const USERS: &str = "users";
    pub const RISK: &str = "risk";
    pub const ALL: &str = "all";
}

pub const TRANSACTION_CREATED: &str = "transaction.created";
pub const TRANSACTION_UPDATED: &str = "transaction.updated";
pub const WALLET_CREATED: &str = "wallet.created";
pub const WALLET_UPDATED: &str = "wallet.updated";

/// A domain event as it travels from a backend to the broker and on to
/// SSE subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub topic: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    #[serde(default = "clock::unix_now")]
    pub timestamp: i64,
}

impl EventEnvelope {
    pub fn new(topic: &str, event_type: &str, data: Value) -> Self {
        EventEnvelope {
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            data,
            timestamp: clock::unix_now(),
        }
    }
}

/// Fire-and-forget publisher to the gateway broadcast endpoint.
/// Publication is strictly best-effort: failures are logged and never
/// propagate to the caller.
#[derive(Clone)]
pub struct EventPublisher {
    broadcast_url: String,
    internal_token: String,
    http: reqwest::Client,
}

impl EventPublisher {
    pub fn new(gateway_url: &str, internal_token: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        EventPublisher {
            broadcast_url: format!("{}/api/v1/events/broadcast", gateway_url.trim_end_matches('/')),
            internal_token: internal_token.to_string(),
            http,
        }
    }

    pub fn publish(&self, topic: &str, event_type: &str, data: Value) {
        let envelope = EventEnvelope::new(topic, event_type, data);
        let publisher = self.clone();
        tokio::spawn(async move {
            if let Err(err) = publisher.send(&envelope).await {
                tracing::warn!(
                    topic = %envelope.topic,
                    event = %envelope.event_type,
                    "event publish failed: {err:#}"
                );
            }
        });
    }

    async fn send(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        self.http
            .post(&self.broadcast_url)
            .header(HEADER_INTERNAL_TOKEN, &self.internal_token)
            .json(envelope)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
