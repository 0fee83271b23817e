//! Realtime status notifications.
//!
//! One logical channel per transaction signature (`plays:<signature>`),
//! two message kinds: `payment_verified` right after the payment decision,
//! `finalized` once the play reaches a terminal state. Delivery is
//! best-effort: the database is the durable source of truth, so publish
//! failures are logged and swallowed, never allowed to block
//! reconciliation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(String),
}

/// One-shot channel publisher.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, channel: &str, event: &str, payload: Value)
        -> Result<(), NotifyError>;
}

/// The channel name for one transaction's play.
pub fn play_channel(signature: &str) -> String {
    format!("plays:{signature}")
}

/// Body of the `payment_verified` message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerifiedPayload {
    pub transaction_signature: String,
    /// `"verified"` or `"rejected"`.
    pub status: &'static str,
    pub message: String,
    /// Computed value of the payment, in USD.
    pub actual_usd_value: f64,
}

/// Body of the `finalized` message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedPayload {
    pub transaction_signature: String,
    /// `"completed"` or `"failed"`.
    pub status: &'static str,
    pub prize_id: Option<u64>,
    pub nft_mint: Option<String>,
}

/// Publish helper that downgrades every failure to a warning.
pub async fn publish_best_effort<N: Notifier>(
    notifier: &N,
    signature: &str,
    event: &str,
    payload: impl Serialize,
) {
    let payload = match serde_json::to_value(payload) {
        Ok(v) => v,
        Err(e) => {
            warn!(signature, event, error = %e, "failed to serialize notification payload");
            return;
        }
    };
    if let Err(e) = notifier.publish(&play_channel(signature), event, payload).await {
        warn!(signature, event, error = %e, "notification publish failed; continuing");
    }
}

/// HTTP broadcast notifier: POSTs `{channel, event, payload}` to a single
/// endpoint.
pub struct HttpNotifier {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Http(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: Value,
    ) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "channel": channel,
            "event": event,
            "payload": payload,
        });
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(NotifyError::Http(format!("HTTP {}", resp.status().as_u16())));
        }
        Ok(())
    }
}

/// Discards everything; for deployments without a realtime channel.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn publish(&self, _: &str, _: &str, _: Value) -> Result<(), NotifyError> {
        Ok(())
    }
}
