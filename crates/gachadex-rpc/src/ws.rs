//! Persistent WebSocket log-subscription client.
//!
//! One connection per process carries `logsSubscribe` subscriptions for
//! every watched program. Subscriptions are not persisted by the provider,
//! so they are re-issued on every (re)connect. Reconnects use a linearly
//! increasing delay (`base_delay × attempt`) up to a hard attempt cap;
//! exhausting the cap is fatal and surfaces as `RpcError::ReconnectExhausted`.
//! A successful connection resets the attempt counter.
//!
//! Incoming frames fan out into the closed `IngressMessage` union pushed
//! into a bounded channel; the channel is the back-pressure boundary
//! between the socket read loop and the (slower) reconciliation pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::enrich::{normalize_transaction, EnrichedTransaction};
use crate::error::RpcError;
use crate::request::JsonRpcRequest;

/// Configuration for the log stream client.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket RPC endpoint (`ws://` or `wss://`).
    pub ws_url: String,
    /// Program addresses to watch.
    pub programs: Vec<String>,
    /// Commitment for the subscriptions.
    pub commitment: String,
    /// Base reconnect delay; attempt `n` waits `base × n`.
    pub base_delay_ms: u64,
    /// Reconnect attempts before giving up for good.
    pub max_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8900".into(),
            programs: vec![],
            commitment: "confirmed".into(),
            base_delay_ms: 500,
            max_attempts: 10,
        }
    }
}

/// A `logsNotification` reduced to what the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogsNotification {
    pub signature: String,
    pub slot: u64,
    pub logs: Vec<String>,
    /// The notification's own `err` field was non-null.
    pub failed: bool,
}

/// Everything the stream can hand to the pipeline — one normalized union
/// regardless of which provider path delivered the transaction.
#[derive(Debug, Clone)]
pub enum IngressMessage {
    /// Log-only notification; needs enrichment before dispatch.
    Logs(LogsNotification),
    /// Provider pushed the full transaction inline; dispatch directly.
    Transaction(EnrichedTransaction),
}

/// Classification of one raw frame. Internal; only notifications escape
/// the read loop.
#[derive(Debug)]
enum Frame {
    SubscriptionAck { id: u64, subscription: u64 },
    SubscriptionError { id: u64, message: String },
    Logs(LogsNotification),
    Transaction(Box<EnrichedTransaction>),
    Other,
}

/// The persistent subscription client. Owns reconnect state; emits
/// `IngressMessage`s into the sink passed to [`LogStreamClient::run`].
pub struct LogStreamClient {
    config: StreamConfig,
    connected: Arc<AtomicBool>,
}

impl LogStreamClient {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Connect, subscribe, and pump messages until the sink closes or the
    /// reconnect attempt cap is exhausted.
    ///
    /// Returns `Ok(())` when the receiving side shuts down (normal
    /// teardown) and `Err(ReconnectExhausted)` when the provider cannot be
    /// reached within the attempt cap; the caller must treat that as
    /// fatal, not retry silently.
    pub async fn run(&self, sink: mpsc::Sender<IngressMessage>) -> Result<(), RpcError> {
        let mut attempts: u32 = 0;
        loop {
            attempts = match self.session(&sink).await {
                SessionEnd::SinkClosed => return Ok(()),
                SessionEnd::Disconnected { was_connected } => {
                    next_attempt_count(attempts, was_connected)
                }
            };
            if attempts > self.config.max_attempts {
                error!(
                    attempts = self.config.max_attempts,
                    url = %self.config.ws_url,
                    "log stream reconnect attempts exhausted; giving up"
                );
                return Err(RpcError::ReconnectExhausted {
                    attempts: self.config.max_attempts,
                });
            }

            let delay = reconnect_delay(Duration::from_millis(self.config.base_delay_ms), attempts);
            warn!(attempt = attempts, delay_ms = delay.as_millis() as u64, "reconnecting log stream");
            tokio::time::sleep(delay).await;
        }
    }

    /// One connection lifetime: connect, subscribe, read until the socket
    /// dies or the sink closes.
    async fn session(&self, sink: &mpsc::Sender<IngressMessage>) -> SessionEnd {
        let (ws, _) = match tokio_tungstenite::connect_async(&self.config.ws_url).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(url = %self.config.ws_url, error = %e, "WebSocket connect failed");
                return SessionEnd::Disconnected { was_connected: false };
            }
        };
        info!(url = %self.config.ws_url, programs = self.config.programs.len(), "log stream connected");
        self.connected.store(true, Ordering::Relaxed);

        let (mut write, mut read) = ws.split();

        // Subscriptions do not survive a reconnect; issue them every time.
        for (idx, program) in self.config.programs.iter().enumerate() {
            let req =
                JsonRpcRequest::logs_subscribe(idx as u64 + 1, program, &self.config.commitment);
            let text = match serde_json::to_string(&req) {
                Ok(t) => t,
                Err(e) => {
                    warn!(%program, error = %e, "failed to serialize subscription request");
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(text.into())).await {
                warn!(%program, error = %e, "failed to send subscription request");
                self.connected.store(false, Ordering::Relaxed);
                return SessionEnd::Disconnected { was_connected: true };
            }
        }

        let end = loop {
            match read.next().await {
                None => break SessionEnd::Disconnected { was_connected: true },
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket receive error");
                    break SessionEnd::Disconnected { was_connected: true };
                }
                Some(Ok(Message::Close(_))) => {
                    info!("WebSocket closed by provider");
                    break SessionEnd::Disconnected { was_connected: true };
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Text(text))) => {
                    let message = match classify_frame(text.as_ref()) {
                        None => {
                            debug!("dropping malformed WebSocket frame");
                            continue;
                        }
                        Some(Frame::SubscriptionAck { id, subscription }) => {
                            info!(id, subscription, "subscription confirmed");
                            continue;
                        }
                        Some(Frame::SubscriptionError { id, message }) => {
                            // One bad subscription must not take down the rest.
                            warn!(id, %message, "subscription request rejected");
                            continue;
                        }
                        Some(Frame::Other) => continue,
                        Some(Frame::Logs(n)) => IngressMessage::Logs(n),
                        Some(Frame::Transaction(tx)) => IngressMessage::Transaction(*tx),
                    };
                    // Bounded send: a stalled consumer back-pressures the
                    // socket instead of buffering without limit.
                    if sink.send(message).await.is_err() {
                        break SessionEnd::SinkClosed;
                    }
                }
                Some(Ok(_)) => {} // binary / pong
            }
        };

        self.connected.store(false, Ordering::Relaxed);
        end
    }
}

enum SessionEnd {
    /// Receiver dropped; the process is shutting down.
    SinkClosed,
    Disconnected { was_connected: bool },
}

/// Linear reconnect schedule: attempt `n` waits `base × n`.
fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    base * attempt
}

/// A session that actually reached the provider resets the attempt
/// counter (the new disconnection is attempt one); a failed connect
/// advances it.
fn next_attempt_count(attempts: u32, was_connected: bool) -> u32 {
    if was_connected {
        1
    } else {
        attempts + 1
    }
}

/// Classify one text frame. `None` means the frame was not valid JSON.
fn classify_frame(text: &str) -> Option<Frame> {
    let value: Value = serde_json::from_str(text).ok()?;

    match value.get("method").and_then(|m| m.as_str()) {
        Some("logsNotification") => {
            let result = &value["params"]["result"];
            let inner = &result["value"];
            let signature = inner["signature"].as_str()?.to_string();
            let logs = inner["logs"]
                .as_array()
                .map(|lines| {
                    lines
                        .iter()
                        .filter_map(|l| l.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            Some(Frame::Logs(LogsNotification {
                signature,
                slot: result["context"]["slot"].as_u64().unwrap_or(0),
                logs,
                failed: !inner["err"].is_null(),
            }))
        }
        // Some providers push the full transaction inline.
        Some("transactionNotification") => {
            let result = &value["params"]["result"];
            let signature = result["signature"].as_str()?;
            let tx = normalize_transaction(signature, &result["transaction"]).ok()?;
            Some(Frame::Transaction(Box::new(EnrichedTransaction {
                slot: result["slot"].as_u64().unwrap_or(tx.slot),
                ..tx
            })))
        }
        Some(_) => Some(Frame::Other),
        None => {
            let id = value.get("id")?.as_u64()?;
            if let Some(err) = value.get("error") {
                return Some(Frame::SubscriptionError {
                    id,
                    message: err["message"].as_str().unwrap_or("unknown").to_string(),
                });
            }
            let subscription = value.get("result")?.as_u64()?;
            Some(Frame::SubscriptionAck { id, subscription })
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
