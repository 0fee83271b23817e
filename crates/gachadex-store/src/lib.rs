//! # gachadex-store
//!
//! The off-chain relational view: games, prizes, plays, NFTs, ownerships,
//! and marketplace listings. Every write is an idempotent upsert keyed by
//! the entity's natural unique key: the event source delivers at least
//! once, never exactly once, so the unique constraints here are the
//! correctness mechanism rather than application-level locking.

pub mod error;
pub mod models;
pub mod sqlite;

pub use error::StoreError;
pub use models::{Game, MarketplaceListing, Nft, NftOwnership, Play, PlayStatus, Prize};
pub use sqlite::SqliteStore;
