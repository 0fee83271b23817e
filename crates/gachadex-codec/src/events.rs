//! The closed event set emitted by the game and marketplace programs.
//!
//! `ProgramEvent` is the tagged union the dispatcher routes on. Decoding
//! happens exactly once, here, so downstream code never touches raw bytes
//! or string-keyed field maps.

use serde::Serialize;

use crate::error::DecodeError;
use crate::wire::{DecodedFields, FieldSpec, Layout};

/// Prize rarity tier, a single byte on the wire (variant index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrizeTier {
    Common,
    Uncommon,
    Rare,
    Legendary,
}

impl PrizeTier {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Common),
            1 => Some(Self::Uncommon),
            2 => Some(Self::Rare),
            3 => Some(Self::Legendary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Legendary => "legendary",
        }
    }
}

impl std::fmt::Display for PrizeTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── Event payloads ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct GameCreated {
    pub game_id: u64,
    pub authority: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrizeAdded {
    pub game_id: u64,
    pub prize_index: u8,
    pub prize_id: u64,
    pub probability_bp: u16,
    pub supply_total: u32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GamePlayInitiated {
    pub user: String,
    pub game_id: u64,
    pub token_amount: u64,
    pub session: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameStatusUpdated {
    pub game_id: u64,
    pub is_active: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupplyReplenished {
    pub game_id: u64,
    pub prize_id: u64,
    pub prize_index: u8,
    pub new_supply: u32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreasuryWithdrawn {
    pub game_id: u64,
    pub amount: u64,
    pub destination: String,
    pub timestamp: i64,
}

/// Terminal outcome of a play session. `is_win` folds the older
/// PrizeWon/PlayLost pair into one event; the optional prize fields are
/// populated only on wins.
#[derive(Debug, Clone, Serialize)]
pub struct PlayResolved {
    pub user: String,
    pub game_id: u64,
    pub session: String,
    pub prize_id: Option<u64>,
    pub prize_index: Option<u8>,
    pub tier: Option<PrizeTier>,
    pub is_win: bool,
    pub random_value: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrizeClaimed {
    pub user: String,
    pub game_id: u64,
    pub session: String,
    pub prize_id: u64,
    pub prize_index: u8,
    pub tier: PrizeTier,
    pub nft_mint: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NftListed {
    pub seller: String,
    pub nft_mint: String,
    pub price: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NftDelisted {
    pub seller: String,
    pub nft_mint: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NftSold {
    pub seller: String,
    pub buyer: String,
    pub nft_mint: String,
    pub price: u64,
    pub fee: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingPriceUpdated {
    pub nft_mint: String,
    pub old_price: u64,
    pub new_price: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformFeesWithdrawn {
    pub amount: u64,
    pub destination: String,
    pub timestamp: i64,
}

// ─── The closed union ─────────────────────────────────────────────────────────

/// Every event the indexer models. Unknown discriminators never reach this
/// type; they are skipped during decoding for forward compatibility.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "name", content = "data")]
pub enum ProgramEvent {
    GameCreated(GameCreated),
    PrizeAdded(PrizeAdded),
    GamePlayInitiated(GamePlayInitiated),
    GameStatusUpdated(GameStatusUpdated),
    SupplyReplenished(SupplyReplenished),
    TreasuryWithdrawn(TreasuryWithdrawn),
    PlayResolved(PlayResolved),
    PrizeClaimed(PrizeClaimed),
    NftListed(NftListed),
    NftDelisted(NftDelisted),
    NftSold(NftSold),
    ListingPriceUpdated(ListingPriceUpdated),
    PlatformFeesWithdrawn(PlatformFeesWithdrawn),
}

impl ProgramEvent {
    /// The on-chain event name (discriminator preimage).
    pub fn name(&self) -> &'static str {
        match self {
            Self::GameCreated(_) => "GameCreated",
            Self::PrizeAdded(_) => "PrizeAdded",
            Self::GamePlayInitiated(_) => "GamePlayInitiated",
            Self::GameStatusUpdated(_) => "GameStatusUpdated",
            Self::SupplyReplenished(_) => "SupplyReplenished",
            Self::TreasuryWithdrawn(_) => "TreasuryWithdrawn",
            Self::PlayResolved(_) => "PlayResolved",
            Self::PrizeClaimed(_) => "PrizeClaimed",
            Self::NftListed(_) => "NFTListed",
            Self::NftDelisted(_) => "NFTDelisted",
            Self::NftSold(_) => "NFTSold",
            Self::ListingPriceUpdated(_) => "PriceUpdated",
            Self::PlatformFeesWithdrawn(_) => "PlatformFeesWithdrawn",
        }
    }
}

/// One decoded event, tagged with its source transaction.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub event: ProgramEvent,
    pub signature: String,
    pub slot: u64,
    /// Index of the originating log line within the transaction.
    pub log_index: u32,
}

// ─── Layout tables ────────────────────────────────────────────────────────────

/// Discriminator dispatch key — one per `ProgramEvent` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    GameCreated,
    PrizeAdded,
    GamePlayInitiated,
    GameStatusUpdated,
    SupplyReplenished,
    TreasuryWithdrawn,
    PlayResolved,
    PrizeClaimed,
    NftListed,
    NftDelisted,
    NftSold,
    ListingPriceUpdated,
    PlatformFeesWithdrawn,
}

const GAME_CREATED: Layout = &[
    ("game_id", FieldSpec::U64),
    ("authority", FieldSpec::Pubkey),
    ("timestamp", FieldSpec::I64),
];

const PRIZE_ADDED: Layout = &[
    ("game_id", FieldSpec::U64),
    ("prize_index", FieldSpec::U8),
    ("prize_id", FieldSpec::U64),
    ("probability_bp", FieldSpec::U16),
    ("supply_total", FieldSpec::U32),
    ("timestamp", FieldSpec::I64),
];

const GAME_PLAY_INITIATED: Layout = &[
    ("user", FieldSpec::Pubkey),
    ("game_id", FieldSpec::U64),
    ("token_amount", FieldSpec::U64),
    ("session", FieldSpec::Pubkey),
    ("timestamp", FieldSpec::I64),
];

const GAME_STATUS_UPDATED: Layout = &[
    ("game_id", FieldSpec::U64),
    ("is_active", FieldSpec::Bool),
    ("timestamp", FieldSpec::I64),
];

const SUPPLY_REPLENISHED: Layout = &[
    ("game_id", FieldSpec::U64),
    ("prize_id", FieldSpec::U64),
    ("prize_index", FieldSpec::U8),
    ("new_supply", FieldSpec::U32),
    ("timestamp", FieldSpec::I64),
];

const TREASURY_WITHDRAWN: Layout = &[
    ("game_id", FieldSpec::U64),
    ("amount", FieldSpec::U64),
    ("destination", FieldSpec::Pubkey),
    ("timestamp", FieldSpec::I64),
];

const PLAY_RESOLVED: Layout = &[
    ("user", FieldSpec::Pubkey),
    ("game_id", FieldSpec::U64),
    ("session", FieldSpec::Pubkey),
    ("prize_id", FieldSpec::Option(&FieldSpec::U64)),
    ("prize_index", FieldSpec::Option(&FieldSpec::U8)),
    ("tier", FieldSpec::Option(&FieldSpec::Tier)),
    ("is_win", FieldSpec::Bool),
    ("random_value", FieldSpec::Bytes32),
    ("timestamp", FieldSpec::I64),
];

const PRIZE_CLAIMED: Layout = &[
    ("user", FieldSpec::Pubkey),
    ("game_id", FieldSpec::U64),
    ("session", FieldSpec::Pubkey),
    ("prize_id", FieldSpec::U64),
    ("prize_index", FieldSpec::U8),
    ("tier", FieldSpec::Tier),
    ("nft_mint", FieldSpec::Pubkey),
    ("timestamp", FieldSpec::I64),
];

const NFT_LISTED: Layout = &[
    ("seller", FieldSpec::Pubkey),
    ("nft_mint", FieldSpec::Pubkey),
    ("price", FieldSpec::U64),
    ("timestamp", FieldSpec::I64),
];

const NFT_DELISTED: Layout = &[
    ("seller", FieldSpec::Pubkey),
    ("nft_mint", FieldSpec::Pubkey),
    ("timestamp", FieldSpec::I64),
];

const NFT_SOLD: Layout = &[
    ("seller", FieldSpec::Pubkey),
    ("buyer", FieldSpec::Pubkey),
    ("nft_mint", FieldSpec::Pubkey),
    ("price", FieldSpec::U64),
    ("fee", FieldSpec::U64),
    ("timestamp", FieldSpec::I64),
];

const PRICE_UPDATED: Layout = &[
    ("nft_mint", FieldSpec::Pubkey),
    ("old_price", FieldSpec::U64),
    ("new_price", FieldSpec::U64),
    ("timestamp", FieldSpec::I64),
];

const PLATFORM_FEES_WITHDRAWN: Layout = &[
    ("amount", FieldSpec::U64),
    ("destination", FieldSpec::Pubkey),
    ("timestamp", FieldSpec::I64),
];

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        EventKind::GameCreated,
        EventKind::PrizeAdded,
        EventKind::GamePlayInitiated,
        EventKind::GameStatusUpdated,
        EventKind::SupplyReplenished,
        EventKind::TreasuryWithdrawn,
        EventKind::PlayResolved,
        EventKind::PrizeClaimed,
        EventKind::NftListed,
        EventKind::NftDelisted,
        EventKind::NftSold,
        EventKind::ListingPriceUpdated,
        EventKind::PlatformFeesWithdrawn,
    ];

    /// The on-chain event name used for discriminator derivation.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GameCreated => "GameCreated",
            Self::PrizeAdded => "PrizeAdded",
            Self::GamePlayInitiated => "GamePlayInitiated",
            Self::GameStatusUpdated => "GameStatusUpdated",
            Self::SupplyReplenished => "SupplyReplenished",
            Self::TreasuryWithdrawn => "TreasuryWithdrawn",
            Self::PlayResolved => "PlayResolved",
            Self::PrizeClaimed => "PrizeClaimed",
            Self::NftListed => "NFTListed",
            Self::NftDelisted => "NFTDelisted",
            Self::NftSold => "NFTSold",
            Self::ListingPriceUpdated => "PriceUpdated",
            Self::PlatformFeesWithdrawn => "PlatformFeesWithdrawn",
        }
    }

    pub fn layout(&self) -> Layout {
        match self {
            Self::GameCreated => GAME_CREATED,
            Self::PrizeAdded => PRIZE_ADDED,
            Self::GamePlayInitiated => GAME_PLAY_INITIATED,
            Self::GameStatusUpdated => GAME_STATUS_UPDATED,
            Self::SupplyReplenished => SUPPLY_REPLENISHED,
            Self::TreasuryWithdrawn => TREASURY_WITHDRAWN,
            Self::PlayResolved => PLAY_RESOLVED,
            Self::PrizeClaimed => PRIZE_CLAIMED,
            Self::NftListed => NFT_LISTED,
            Self::NftDelisted => NFT_DELISTED,
            Self::NftSold => NFT_SOLD,
            Self::ListingPriceUpdated => PRICE_UPDATED,
            Self::PlatformFeesWithdrawn => PLATFORM_FEES_WITHDRAWN,
        }
    }

    /// Build the typed event from the fields decoded via `layout()`.
    pub fn build(&self, f: &DecodedFields) -> Result<ProgramEvent, DecodeError> {
        Ok(match self {
            Self::GameCreated => ProgramEvent::GameCreated(GameCreated {
                game_id: f.u64("game_id")?,
                authority: f.pubkey("authority")?,
                timestamp: f.i64("timestamp")?,
            }),
            Self::PrizeAdded => ProgramEvent::PrizeAdded(PrizeAdded {
                game_id: f.u64("game_id")?,
                prize_index: f.u8("prize_index")?,
                prize_id: f.u64("prize_id")?,
                probability_bp: f.u16("probability_bp")?,
                supply_total: f.u32("supply_total")?,
                timestamp: f.i64("timestamp")?,
            }),
            Self::GamePlayInitiated => ProgramEvent::GamePlayInitiated(GamePlayInitiated {
                user: f.pubkey("user")?,
                game_id: f.u64("game_id")?,
                token_amount: f.u64("token_amount")?,
                session: f.pubkey("session")?,
                timestamp: f.i64("timestamp")?,
            }),
            Self::GameStatusUpdated => ProgramEvent::GameStatusUpdated(GameStatusUpdated {
                game_id: f.u64("game_id")?,
                is_active: f.boolean("is_active")?,
                timestamp: f.i64("timestamp")?,
            }),
            Self::SupplyReplenished => ProgramEvent::SupplyReplenished(SupplyReplenished {
                game_id: f.u64("game_id")?,
                prize_id: f.u64("prize_id")?,
                prize_index: f.u8("prize_index")?,
                new_supply: f.u32("new_supply")?,
                timestamp: f.i64("timestamp")?,
            }),
            Self::TreasuryWithdrawn => ProgramEvent::TreasuryWithdrawn(TreasuryWithdrawn {
                game_id: f.u64("game_id")?,
                amount: f.u64("amount")?,
                destination: f.pubkey("destination")?,
                timestamp: f.i64("timestamp")?,
            }),
            Self::PlayResolved => ProgramEvent::PlayResolved(PlayResolved {
                user: f.pubkey("user")?,
                game_id: f.u64("game_id")?,
                session: f.pubkey("session")?,
                prize_id: f.opt_u64("prize_id")?,
                prize_index: f.opt_u8("prize_index")?,
                tier: f.opt_tier("tier")?,
                is_win: f.boolean("is_win")?,
                random_value: f.bytes32("random_value")?,
                timestamp: f.i64("timestamp")?,
            }),
            Self::PrizeClaimed => ProgramEvent::PrizeClaimed(PrizeClaimed {
                user: f.pubkey("user")?,
                game_id: f.u64("game_id")?,
                session: f.pubkey("session")?,
                prize_id: f.u64("prize_id")?,
                prize_index: f.u8("prize_index")?,
                tier: f.tier("tier")?,
                nft_mint: f.pubkey("nft_mint")?,
                timestamp: f.i64("timestamp")?,
            }),
            Self::NftListed => ProgramEvent::NftListed(NftListed {
                seller: f.pubkey("seller")?,
                nft_mint: f.pubkey("nft_mint")?,
                price: f.u64("price")?,
                timestamp: f.i64("timestamp")?,
            }),
            Self::NftDelisted => ProgramEvent::NftDelisted(NftDelisted {
                seller: f.pubkey("seller")?,
                nft_mint: f.pubkey("nft_mint")?,
                timestamp: f.i64("timestamp")?,
            }),
            Self::NftSold => ProgramEvent::NftSold(NftSold {
                seller: f.pubkey("seller")?,
                buyer: f.pubkey("buyer")?,
                nft_mint: f.pubkey("nft_mint")?,
                price: f.u64("price")?,
                fee: f.u64("fee")?,
                timestamp: f.i64("timestamp")?,
            }),
            Self::ListingPriceUpdated => ProgramEvent::ListingPriceUpdated(ListingPriceUpdated {
                nft_mint: f.pubkey("nft_mint")?,
                old_price: f.u64("old_price")?,
                new_price: f.u64("new_price")?,
                timestamp: f.i64("timestamp")?,
            }),
            Self::PlatformFeesWithdrawn => {
                ProgramEvent::PlatformFeesWithdrawn(PlatformFeesWithdrawn {
                    amount: f.u64("amount")?,
                    destination: f.pubkey("destination")?,
                    timestamp: f.i64("timestamp")?,
                })
            }
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::decode_layout;

    #[test]
    fn every_kind_has_a_distinct_name() {
        let mut names: Vec<_> = EventKind::ALL.iter().map(|k| k.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), EventKind::ALL.len());
    }

    #[test]
    fn tier_byte_mapping() {
        assert_eq!(PrizeTier::from_byte(0), Some(PrizeTier::Common));
        assert_eq!(PrizeTier::from_byte(3), Some(PrizeTier::Legendary));
        assert_eq!(PrizeTier::from_byte(4), None);
        assert_eq!(PrizeTier::Rare.to_string(), "rare");
    }

    #[test]
    fn build_game_created() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7u64.to_le_bytes());
        bytes.extend_from_slice(&[1u8; 32]);
        bytes.extend_from_slice(&1_700_000_000i64.to_le_bytes());

        let kind = EventKind::GameCreated;
        let fields = decode_layout(kind.layout(), &bytes).unwrap();
        let event = kind.build(&fields).unwrap();
        match event {
            ProgramEvent::GameCreated(e) => {
                assert_eq!(e.game_id, 7);
                assert_eq!(e.timestamp, 1_700_000_000);
            }
            other => panic!("wrong variant: {}", other.name()),
        }
    }

    #[test]
    fn event_name_matches_kind_name() {
        // PriceUpdated is the one variant whose Rust name diverges from the
        // on-chain name; make sure both sides agree.
        assert_eq!(EventKind::ListingPriceUpdated.name(), "PriceUpdated");
    }
}
