//! Row types for the relational view.

use serde::{Deserialize, Serialize};

/// A game, keyed by its stable on-chain numeric id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub game_id: u64,
    pub name: String,
    pub description: String,
    pub image_url: String,
    /// Payment currency mint.
    pub token_mint: String,
    /// Cost per play in integer USD cents.
    pub cost_usd_cents: u64,
    pub treasury: String,
    pub is_active: bool,
    /// Monotonically non-decreasing play counter.
    pub total_plays: u64,
}

/// A prize, keyed by `(game_id, prize_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prize {
    pub game_id: u64,
    pub prize_id: u64,
    pub prize_index: u8,
    pub name: String,
    /// Rarity tier slug (common/uncommon/rare/legendary).
    pub tier: String,
    /// Win probability in basis points (0–10000).
    pub probability_bp: u16,
    /// Immutable after creation (replenishment raises it explicitly).
    pub supply_total: u32,
    /// Never above `supply_total`, floored at zero.
    pub supply_remaining: u32,
    pub metadata_uri: String,
}

/// Lifecycle of a play. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayStatus {
    Pending,
    Completed,
    Failed,
}

impl PlayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One payment attempt, keyed by the payment transaction's signature.
/// `session` is the on-chain play-session address that later resolution
/// events reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Play {
    pub signature: String,
    pub session: String,
    pub game_id: u64,
    pub user_wallet: String,
    pub token_amount_paid: u64,
    pub status: PlayStatus,
    pub prize_id: Option<u64>,
    pub nft_mint: Option<String>,
    /// Opaque fairness proof (hex).
    pub random_value: Option<String>,
    pub played_at: i64,
}

/// A minted prize NFT, keyed by mint address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nft {
    pub mint_address: String,
    pub game_id: u64,
    pub prize_id: u64,
    pub current_owner: String,
    pub is_redeemed: bool,
    pub redeem_signature: Option<String>,
    pub redeemed_at: Option<i64>,
}

/// Holder balance for one `(mint, owner)` pair, reconciled independently
/// of the primary NFT record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftOwnership {
    pub mint_address: String,
    pub owner: String,
    pub quantity: u64,
}

/// A marketplace listing, keyed by the listed NFT's mint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceListing {
    pub nft_mint: String,
    pub seller: String,
    pub price_tokens: u64,
    pub is_active: bool,
    pub listed_at: i64,
    pub closed_at: Option<i64>,
    pub buyer: Option<String>,
}
