//! # gachadex-oracle
//!
//! The security-relevant half of play ingestion: look up the payment
//! token's USD price and decide whether the transferred amount actually
//! covers the game's configured cost. The oracle is an external HTTP
//! service; this crate only owns its client contract and the decision
//! logic.

pub mod error;
pub mod price;
pub mod verify;

pub use error::OracleError;
pub use price::{HttpPriceOracle, PriceOracle, PriceQuote};
pub use verify::{PaymentVerifier, RiskFlags, Verdict, VerdictStatus, VerifierConfig};
