//! # gachadex-index
//!
//! The reconciliation half of the indexer: takes enriched transactions,
//! decodes their events, and applies each one to the relational store as
//! an idempotent upsert. Also owns payment verification for new plays and
//! the best-effort realtime notifications that let a waiting client react
//! without polling.

pub mod chain;
pub mod dispatcher;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod reconcile;

pub use chain::{ChainStateReader, RpcChainReader};
pub use dispatcher::EventDispatcher;
pub use error::IndexerError;
pub use notify::{HttpNotifier, Notifier, NullNotifier};
pub use pipeline::{Pipeline, PipelineConfig};
pub use reconcile::Reconciler;
