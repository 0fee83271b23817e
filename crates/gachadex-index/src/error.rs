//! Error type for the reconciliation pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error(transparent)]
    Store(#[from] gachadex_store::StoreError),

    #[error(transparent)]
    Rpc(#[from] gachadex_rpc::RpcError),

    #[error(transparent)]
    Decode(#[from] gachadex_codec::DecodeError),

    #[error("{0}")]
    Other(String),
}
