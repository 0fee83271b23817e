//! On-chain state reads used during reconciliation.
//!
//! The game-created path trusts account state over event fields, and
//! payment verification needs the payment mint's decimals. Both reads go
//! through `ChainStateReader` so handlers stay testable without a node.

use async_trait::async_trait;

use gachadex_codec::accounts::{
    decode_game_account, decode_prize_account, mint_decimals, GameAccount, PrizeAccount,
};
use gachadex_codec::discriminator::account_discriminator;
use gachadex_rpc::SolanaRpcClient;
use tracing::warn;

use crate::error::IndexerError;

/// Chain-state lookups the reconciler depends on.
#[async_trait]
pub trait ChainStateReader: Send + Sync {
    /// The `Game` account (and its address) for an on-chain game id.
    async fn game_by_id(&self, game_id: u64)
        -> Result<Option<(String, GameAccount)>, IndexerError>;

    /// All `Prize` accounts belonging to a game address.
    async fn prizes_for_game(&self, game_pubkey: &str)
        -> Result<Vec<PrizeAccount>, IndexerError>;

    /// One `Prize` account by game id and prize index.
    async fn prize(
        &self,
        game_id: u64,
        prize_index: u8,
    ) -> Result<Option<PrizeAccount>, IndexerError>;

    /// Decimal precision of an SPL mint.
    async fn mint_decimals(&self, mint: &str) -> Result<Option<u8>, IndexerError>;
}

/// `ChainStateReader` over the HTTP RPC, using `getProgramAccounts` with
/// memcmp filters so no PDA derivation is needed off-chain.
pub struct RpcChainReader {
    rpc: SolanaRpcClient,
    game_program: String,
}

// Byte offsets into the account layouts (8-byte discriminator included).
const GAME_ID_OFFSET: usize = 8 + 32; // discriminator + authority
const PRIZE_GAME_OFFSET: usize = 8;
const PRIZE_INDEX_OFFSET: usize = 8 + 32; // discriminator + game

impl RpcChainReader {
    pub fn new(rpc: SolanaRpcClient, game_program: impl Into<String>) -> Self {
        Self {
            rpc,
            game_program: game_program.into(),
        }
    }
}

#[async_trait]
impl ChainStateReader for RpcChainReader {
    async fn game_by_id(
        &self,
        game_id: u64,
    ) -> Result<Option<(String, GameAccount)>, IndexerError> {
        let accounts = self
            .rpc
            .get_program_accounts(
                &self.game_program,
                &[
                    (0, account_discriminator("Game").to_vec()),
                    (GAME_ID_OFFSET, game_id.to_le_bytes().to_vec()),
                ],
            )
            .await?;
        match accounts.into_iter().next() {
            Some((pubkey, data)) => Ok(Some((pubkey, decode_game_account(&data)?))),
            None => Ok(None),
        }
    }

    async fn prizes_for_game(
        &self,
        game_pubkey: &str,
    ) -> Result<Vec<PrizeAccount>, IndexerError> {
        let game_bytes = bs58::decode(game_pubkey)
            .into_vec()
            .map_err(|e| IndexerError::Other(format!("bad game pubkey: {e}")))?;
        let accounts = self
            .rpc
            .get_program_accounts(
                &self.game_program,
                &[
                    (0, account_discriminator("Prize").to_vec()),
                    (PRIZE_GAME_OFFSET, game_bytes),
                ],
            )
            .await?;

        let mut prizes = Vec::with_capacity(accounts.len());
        for (pubkey, data) in accounts {
            match decode_prize_account(&data) {
                Ok(prize) => prizes.push(prize),
                Err(e) => warn!(account = %pubkey, error = %e, "skipping undecodable prize account"),
            }
        }
        prizes.sort_by_key(|p| p.prize_index);
        Ok(prizes)
    }

    async fn prize(
        &self,
        game_id: u64,
        prize_index: u8,
    ) -> Result<Option<PrizeAccount>, IndexerError> {
        let Some((game_pubkey, _)) = self.game_by_id(game_id).await? else {
            return Ok(None);
        };
        let game_bytes = bs58::decode(&game_pubkey)
            .into_vec()
            .map_err(|e| IndexerError::Other(format!("bad game pubkey: {e}")))?;
        let accounts = self
            .rpc
            .get_program_accounts(
                &self.game_program,
                &[
                    (0, account_discriminator("Prize").to_vec()),
                    (PRIZE_GAME_OFFSET, game_bytes),
                    (PRIZE_INDEX_OFFSET, vec![prize_index]),
                ],
            )
            .await?;
        match accounts.into_iter().next() {
            Some((_, data)) => Ok(Some(decode_prize_account(&data)?)),
            None => Ok(None),
        }
    }

    async fn mint_decimals(&self, mint: &str) -> Result<Option<u8>, IndexerError> {
        match self.rpc.get_account_data(mint).await? {
            Some(data) => Ok(Some(mint_decimals(&data)?)),
            None => Ok(None),
        }
    }
}
