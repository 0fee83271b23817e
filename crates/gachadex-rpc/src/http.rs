//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! Retries transient failures with exponential backoff; node-side RPC
//! errors are returned to the caller untouched (they are never transient).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::Engine as _;
use serde_json::{json, Value};

use crate::error::RpcError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::retry::{RetryConfig, RetryPolicy};

/// Configuration for `SolanaRpcClient`.
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
    /// Commitment level for all queries.
    pub commitment: String,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            commitment: "confirmed".into(),
        }
    }
}

/// Solana HTTP JSON-RPC client.
pub struct SolanaRpcClient {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    commitment: String,
    req_id: AtomicU64,
}

impl SolanaRpcClient {
    pub fn new(url: impl Into<String>, config: RpcClientConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            commitment: config.commitment,
            req_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<Value, RpcError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Http(format!("HTTP {status}: {body}")));
        }

        let resp: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;
        resp.into_result().map_err(RpcError::Rpc)
    }

    /// Send `method` with `params`, retrying transient failures.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.req_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            method,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying RPC call"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(method, attempt, error = %e, "RPC retries exhausted");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// `getTransaction` at the configured commitment. `None` = not found.
    pub async fn get_transaction(&self, signature: &str) -> Result<Option<Value>, RpcError> {
        let value = self
            .call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "json",
                        "commitment": self.commitment,
                        "maxSupportedTransactionVersion": 0,
                    }
                ]),
            )
            .await?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    /// `getAccountInfo`, returning the raw account data. `None` = no account.
    pub async fn get_account_data(&self, pubkey: &str) -> Result<Option<Vec<u8>>, RpcError> {
        let value = self
            .call(
                "getAccountInfo",
                json!([pubkey, { "encoding": "base64", "commitment": self.commitment }]),
            )
            .await?;

        let account = &value["value"];
        if account.is_null() {
            return Ok(None);
        }
        let encoded = account["data"][0]
            .as_str()
            .ok_or_else(|| RpcError::MalformedResponse("account data is not a string".into()))?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| RpcError::MalformedResponse(format!("account data base64: {e}")))?;
        Ok(Some(data))
    }

    /// `getProgramAccounts` with memcmp filters, returning `(pubkey, data)`
    /// pairs. Filter offsets are absolute (discriminator included).
    pub async fn get_program_accounts(
        &self,
        program: &str,
        memcmp_filters: &[(usize, Vec<u8>)],
    ) -> Result<Vec<(String, Vec<u8>)>, RpcError> {
        let filters: Vec<Value> = memcmp_filters
            .iter()
            .map(|(offset, bytes)| {
                json!({ "memcmp": { "offset": offset, "bytes": bs58::encode(bytes).into_string() } })
            })
            .collect();

        let value = self
            .call(
                "getProgramAccounts",
                json!([
                    program,
                    {
                        "encoding": "base64",
                        "commitment": self.commitment,
                        "filters": filters,
                    }
                ]),
            )
            .await?;

        let entries = value
            .as_array()
            .ok_or_else(|| RpcError::MalformedResponse("getProgramAccounts: not an array".into()))?;

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let pubkey = entry["pubkey"]
                .as_str()
                .ok_or_else(|| RpcError::MalformedResponse("missing account pubkey".into()))?;
            let encoded = entry["account"]["data"][0]
                .as_str()
                .ok_or_else(|| RpcError::MalformedResponse("missing account data".into()))?;
            let data = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| RpcError::MalformedResponse(format!("account data base64: {e}")))?;
            out.push((pubkey.to_string(), data));
        }
        Ok(out)
    }
}
