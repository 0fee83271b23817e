//! Payment verification.
//!
//! Given the token amount a play actually transferred, decide whether it
//! covers the game's configured USD cost at the oracle's current price.
//! Risk qualifiers (price staleness, manipulation heuristics) ride along
//! on every decision but never force a rejection by themselves; only the
//! value falling outside tolerance does. When the oracle cannot answer at
//! all the verifier fails open to a provisional accept, and a later
//! terminal play event settles the row either way.

use tracing::warn;

use crate::price::PriceOracle;

/// Tunables for the accept/reject decision.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Undershoot tolerance in basis points (200 = accept down to 98% of
    /// the configured cost).
    pub tolerance_bp: u16,
    /// A quote older than this (relative to the transaction timestamp) is
    /// flagged stale.
    pub staleness_secs: i64,
    /// Tokens with a market cap under this are flagged as manipulation
    /// candidates.
    pub min_market_cap_usd: f64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            tolerance_bp: 200,
            staleness_secs: 300,
            min_market_cap_usd: 10_000.0,
        }
    }
}

/// Risk qualifiers attached to every decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskFlags {
    pub stale: bool,
    pub manipulation_suspected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictStatus {
    /// Value covers the cost within tolerance.
    Accepted,
    /// Value falls short. The play must be recorded as failed and can
    /// never be upgraded to a win.
    Rejected,
    /// The oracle (or game state) was unavailable; recorded as pending
    /// and settled by a later terminal event.
    Provisional,
}

/// The verification decision.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub status: VerdictStatus,
    /// Computed value of the transferred tokens, in integer USD cents.
    pub actual_usd_cents: u64,
    pub reason: String,
    pub flags: RiskFlags,
}

/// Decides accept/reject for each play's payment.
pub struct PaymentVerifier<O> {
    oracle: O,
    config: VerifierConfig,
}

impl<O: PriceOracle> PaymentVerifier<O> {
    pub fn new(oracle: O, config: VerifierConfig) -> Self {
        Self { oracle, config }
    }

    /// Value `token_amount` (raw units, `decimals` precision) against
    /// `cost_usd_cents`, using the oracle price for `token_mint`.
    /// `tx_timestamp` is the play's on-chain time, used for staleness.
    pub async fn verify(
        &self,
        token_mint: &str,
        token_amount: u64,
        decimals: u8,
        cost_usd_cents: u64,
        tx_timestamp: i64,
    ) -> Verdict {
        let quote = match self.oracle.quote(token_mint).await {
            Ok(Some(quote)) => quote,
            Ok(None) => {
                warn!(token_mint, "oracle has no price for payment token; failing open");
                return Verdict {
                    status: VerdictStatus::Provisional,
                    actual_usd_cents: 0,
                    reason: "price unavailable for payment token".into(),
                    flags: RiskFlags::default(),
                };
            }
            Err(e) => {
                warn!(token_mint, error = %e, "oracle lookup failed; failing open");
                return Verdict {
                    status: VerdictStatus::Provisional,
                    actual_usd_cents: 0,
                    reason: format!("oracle unavailable: {e}"),
                    flags: RiskFlags::default(),
                };
            }
        };

        let flags = RiskFlags {
            stale: (tx_timestamp - quote.timestamp).abs() > self.config.staleness_secs,
            manipulation_suspected: quote.market_cap_usd > 0.0
                && quote.market_cap_usd < self.config.min_market_cap_usd,
        };
        if flags.stale {
            warn!(token_mint, quote_ts = quote.timestamp, tx_ts = tx_timestamp, "oracle price is stale");
        }
        if flags.manipulation_suspected {
            warn!(token_mint, market_cap = quote.market_cap_usd, "low market cap; possible manipulation");
        }

        let token_units = token_amount as f64 / 10f64.powi(decimals as i32);
        let actual_usd_cents = (token_units * quote.price_usd * 100.0).floor() as u64;

        let required_cents =
            (cost_usd_cents as f64 * (1.0 - self.config.tolerance_bp as f64 / 10_000.0)).ceil()
                as u64;

        if actual_usd_cents >= required_cents {
            Verdict {
                status: VerdictStatus::Accepted,
                actual_usd_cents,
                reason: format!(
                    "payment of {actual_usd_cents}¢ covers cost of {cost_usd_cents}¢"
                ),
                flags,
            }
        } else {
            Verdict {
                status: VerdictStatus::Rejected,
                actual_usd_cents,
                reason: format!(
                    "payment of {actual_usd_cents}¢ below required {required_cents}¢"
                ),
                flags,
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
