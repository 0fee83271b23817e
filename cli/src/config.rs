//! Daemon configuration, loaded from a YAML file with per-field defaults
//! so a minimal config only needs the endpoints and program addresses.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::telemetry::LogConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    pub rpc: RpcSettings,
    pub programs: ProgramSettings,
    #[serde(default)]
    pub store: StoreSettings,
    pub oracle: OracleSettings,
    #[serde(default)]
    pub notifier: NotifierSettings,
    #[serde(default)]
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSettings {
    /// HTTP JSON-RPC endpoint.
    pub http_url: String,
    /// WebSocket endpoint for `logsSubscribe`.
    pub ws_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSettings {
    /// The gachapon game program address.
    pub game: String,
    /// The marketplace program address.
    pub marketplace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_tolerance_bp")]
    pub tolerance_bp: u16,
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: i64,
    #[serde(default = "default_min_market_cap")]
    pub min_market_cap_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierSettings {
    /// Broadcast endpoint; omit to disable realtime notifications.
    pub endpoint: Option<String>,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_notify_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            commitment: default_commitment(),
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_timeout_secs() -> u64 { 30 }
fn default_notify_timeout_secs() -> u64 { 5 }
fn default_db_path() -> String { "./gachadex.db".into() }
fn default_tolerance_bp() -> u16 { 200 }
fn default_staleness_secs() -> i64 { 300 }
fn default_min_market_cap() -> f64 { 10_000.0 }
fn default_commitment() -> String { "confirmed".into() }
fn default_base_delay_ms() -> u64 { 500 }
fn default_max_attempts() -> u32 { 10 }
fn default_queue_capacity() -> usize { 512 }

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))
    }
}
