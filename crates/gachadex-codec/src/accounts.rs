//! On-chain account decoding.
//!
//! The game-created reconciliation path trusts the account state over the
//! event fields, so the indexer needs to read the program's `Game` and
//! `Prize` accounts plus the SPL mint's decimal byte. Accounts follow the
//! Anchor convention: 8-byte account discriminator, then borsh fields in
//! declaration order.

use crate::discriminator::account_discriminator;
use crate::error::DecodeError;
use crate::events::PrizeTier;
use crate::wire::{decode_layout, FieldSpec, Layout};

pub const MAX_PRIZES: usize = 16;

/// Decimals live at a fixed offset in SPL mint account data.
const MINT_DECIMALS_OFFSET: usize = 44;

/// Decoded `Game` program account.
#[derive(Debug, Clone)]
pub struct GameAccount {
    pub authority: String,
    pub game_id: u64,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub token_mint: String,
    pub cost_usd_cents: u64,
    pub treasury: String,
    pub prize_count: u8,
    pub prize_probabilities: Vec<u16>,
    pub total_supply_remaining: u32,
    pub total_plays: u64,
    pub is_active: bool,
}

const GAME_ACCOUNT: Layout = &[
    ("authority", FieldSpec::Pubkey),
    ("game_id", FieldSpec::U64),
    ("name", FieldSpec::Str),
    ("description", FieldSpec::Str),
    ("image_url", FieldSpec::Str),
    ("token_mint", FieldSpec::Pubkey),
    ("cost_usd", FieldSpec::U64),
    ("treasury", FieldSpec::Pubkey),
    ("prize_count", FieldSpec::U8),
    ("prize_probabilities", FieldSpec::U16Vec(MAX_PRIZES)),
    ("total_supply_remaining", FieldSpec::U32),
    ("total_plays", FieldSpec::U64),
    ("is_active", FieldSpec::Bool),
    ("last_random_value", FieldSpec::Bytes32),
];

/// Decoded `Prize` program account.
#[derive(Debug, Clone)]
pub struct PrizeAccount {
    pub game: String,
    pub prize_index: u8,
    pub prize_id: u64,
    pub name: String,
    pub description: String,
    pub metadata_uri: String,
    pub tier: PrizeTier,
    pub probability_bp: u16,
    pub supply_total: u32,
    pub supply_remaining: u32,
}

const PRIZE_ACCOUNT: Layout = &[
    ("game", FieldSpec::Pubkey),
    ("prize_index", FieldSpec::U8),
    ("prize_id", FieldSpec::U64),
    ("name", FieldSpec::Str),
    ("description", FieldSpec::Str),
    ("image_url", FieldSpec::Str),
    ("metadata_uri", FieldSpec::Str),
    ("physical_sku", FieldSpec::Str),
    ("tier", FieldSpec::Tier),
    ("probability_bp", FieldSpec::U16),
    ("cost_usd", FieldSpec::U64),
    ("weight_grams", FieldSpec::U32),
    ("length_hundredths", FieldSpec::U16),
    ("width_hundredths", FieldSpec::U16),
    ("height_hundredths", FieldSpec::U16),
    ("supply_total", FieldSpec::U32),
    ("supply_remaining", FieldSpec::U32),
];

fn check_discriminator(data: &[u8], name: &'static str) -> Result<&[u8], DecodeError> {
    if data.len() < 8 || data[..8] != account_discriminator(name) {
        return Err(DecodeError::WrongAccount { expected: name });
    }
    Ok(&data[8..])
}

/// Decode a `Game` account's raw data.
pub fn decode_game_account(data: &[u8]) -> Result<GameAccount, DecodeError> {
    let f = decode_layout(GAME_ACCOUNT, check_discriminator(data, "Game")?)?;
    Ok(GameAccount {
        authority: f.pubkey("authority")?,
        game_id: f.u64("game_id")?,
        name: f.string("name")?,
        description: f.string("description")?,
        image_url: f.string("image_url")?,
        token_mint: f.pubkey("token_mint")?,
        cost_usd_cents: f.u64("cost_usd")?,
        treasury: f.pubkey("treasury")?,
        prize_count: f.u8("prize_count")?,
        prize_probabilities: f.u16_vec("prize_probabilities")?,
        total_supply_remaining: f.u32("total_supply_remaining")?,
        total_plays: f.u64("total_plays")?,
        is_active: f.boolean("is_active")?,
    })
}

/// Decode a `Prize` account's raw data.
pub fn decode_prize_account(data: &[u8]) -> Result<PrizeAccount, DecodeError> {
    let f = decode_layout(PRIZE_ACCOUNT, check_discriminator(data, "Prize")?)?;
    Ok(PrizeAccount {
        game: f.pubkey("game")?,
        prize_index: f.u8("prize_index")?,
        prize_id: f.u64("prize_id")?,
        name: f.string("name")?,
        description: f.string("description")?,
        metadata_uri: f.string("metadata_uri")?,
        tier: f.tier("tier")?,
        probability_bp: f.u16("probability_bp")?,
        supply_total: f.u32("supply_total")?,
        supply_remaining: f.u32("supply_remaining")?,
    })
}

/// Read the decimals byte out of SPL mint account data.
pub fn mint_decimals(data: &[u8]) -> Result<u8, DecodeError> {
    data.get(MINT_DECIMALS_OFFSET)
        .copied()
        .ok_or(DecodeError::Truncated {
            need: MINT_DECIMALS_OFFSET + 1,
            have: data.len(),
        })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn push_str(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
        buf.extend_from_slice(s.as_bytes());
    }

    fn game_account_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&account_discriminator("Game"));
        buf.extend_from_slice(&[1u8; 32]); // authority
        buf.extend_from_slice(&7u64.to_le_bytes());
        push_str(&mut buf, "Capsule Rush");
        push_str(&mut buf, "A capsule machine");
        push_str(&mut buf, "https://img.example/7.png");
        buf.extend_from_slice(&[2u8; 32]); // token_mint
        buf.extend_from_slice(&500u64.to_le_bytes()); // $5.00
        buf.extend_from_slice(&[3u8; 32]); // treasury
        buf.push(2); // prize_count
        for i in 0..MAX_PRIZES {
            buf.extend_from_slice(&((i as u16) * 100).to_le_bytes());
        }
        buf.extend_from_slice(&150u32.to_le_bytes());
        buf.extend_from_slice(&42u64.to_le_bytes());
        buf.push(1); // is_active
        buf.extend_from_slice(&[0u8; 32]); // last_random_value
        buf.extend_from_slice(&[0u8; 100]); // rent padding
        buf
    }

    #[test]
    fn decode_game_account_roundtrip() {
        let game = decode_game_account(&game_account_bytes()).unwrap();
        assert_eq!(game.game_id, 7);
        assert_eq!(game.name, "Capsule Rush");
        assert_eq!(game.cost_usd_cents, 500);
        assert_eq!(game.prize_count, 2);
        assert_eq!(game.prize_probabilities.len(), MAX_PRIZES);
        assert_eq!(game.total_plays, 42);
        assert!(game.is_active);
    }

    #[test]
    fn wrong_discriminator_rejected() {
        let mut bytes = game_account_bytes();
        bytes[..8].copy_from_slice(&account_discriminator("Prize"));
        assert!(matches!(
            decode_game_account(&bytes).unwrap_err(),
            DecodeError::WrongAccount { expected: "Game" }
        ));
    }

    #[test]
    fn decode_prize_account_roundtrip() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&account_discriminator("Prize"));
        buf.extend_from_slice(&[5u8; 32]); // game
        buf.push(1); // prize_index
        buf.extend_from_slice(&55u64.to_le_bytes());
        push_str(&mut buf, "Golden Cat");
        push_str(&mut buf, "Shiny");
        push_str(&mut buf, "https://img.example/cat.png");
        push_str(&mut buf, "https://meta.example/cat.json");
        push_str(&mut buf, "SKU-CAT-01");
        buf.push(3); // legendary
        buf.extend_from_slice(&250u16.to_le_bytes());
        buf.extend_from_slice(&10_000u64.to_le_bytes());
        buf.extend_from_slice(&120u32.to_le_bytes());
        buf.extend_from_slice(&650u16.to_le_bytes());
        buf.extend_from_slice(&300u16.to_le_bytes());
        buf.extend_from_slice(&300u16.to_le_bytes());
        buf.extend_from_slice(&10u32.to_le_bytes());
        buf.extend_from_slice(&4u32.to_le_bytes());

        let prize = decode_prize_account(&buf).unwrap();
        assert_eq!(prize.prize_id, 55);
        assert_eq!(prize.tier, PrizeTier::Legendary);
        assert_eq!(prize.probability_bp, 250);
        assert_eq!(prize.supply_total, 10);
        assert_eq!(prize.supply_remaining, 4);
    }

    #[test]
    fn mint_decimals_at_fixed_offset() {
        let mut data = vec![0u8; 82];
        data[MINT_DECIMALS_OFFSET] = 9;
        assert_eq!(mint_decimals(&data).unwrap(), 9);
        assert!(mint_decimals(&data[..10]).is_err());
    }
}
