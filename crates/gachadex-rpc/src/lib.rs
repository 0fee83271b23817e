//! # gachadex-rpc
//!
//! Everything that talks to a Solana RPC provider: the persistent
//! WebSocket log subscription (with reconnect), the HTTP JSON-RPC client
//! (with retry), and transaction enrichment that normalises legacy and
//! versioned transactions into one shape for the rest of the pipeline.

pub mod enrich;
pub mod error;
pub mod http;
pub mod request;
pub mod retry;
pub mod ws;

pub use enrich::{EnrichedTransaction, TransactionEnricher};
pub use error::RpcError;
pub use http::{RpcClientConfig, SolanaRpcClient};
pub use ws::{IngressMessage, LogStreamClient, LogsNotification, StreamConfig};
