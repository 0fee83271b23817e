//! Idempotent state reconciliation.
//!
//! Each handler applies one decoded event to the store. Handlers tolerate
//! duplicate delivery (at-least-once upstream) and out-of-relative-order
//! arrival: writes are keyed upserts and every state transition is guarded
//! by the row's current status, so replays and stragglers degrade to
//! no-ops instead of corrupting counters.

use tracing::{debug, info, warn};

use gachadex_codec::accounts::{GameAccount, PrizeAccount};
use gachadex_codec::events::{
    GameCreated, GamePlayInitiated, GameStatusUpdated, ListingPriceUpdated, NftDelisted,
    NftListed, NftSold, PlatformFeesWithdrawn, PlayResolved, PrizeAdded, PrizeClaimed,
    SupplyReplenished, TreasuryWithdrawn,
};
use gachadex_codec::{EventRecord, ProgramEvent};
use gachadex_oracle::{PaymentVerifier, PriceOracle, RiskFlags, Verdict, VerdictStatus};
use gachadex_store::{Game, Nft, Play, PlayStatus, Prize, SqliteStore};

use crate::chain::ChainStateReader;
use crate::error::IndexerError;
use crate::notify::{publish_best_effort, FinalizedPayload, Notifier, PaymentVerifiedPayload};

/// Applies decoded events to the relational store.
pub struct Reconciler<C, O, N> {
    store: SqliteStore,
    chain: C,
    verifier: PaymentVerifier<O>,
    notifier: N,
}

impl<C, O, N> Reconciler<C, O, N>
where
    C: ChainStateReader,
    O: PriceOracle,
    N: Notifier,
{
    pub fn new(store: SqliteStore, chain: C, verifier: PaymentVerifier<O>, notifier: N) -> Self {
        Self {
            store,
            chain,
            verifier,
            notifier,
        }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Route one decoded event to its handler.
    pub async fn apply(&self, record: &EventRecord) -> Result<(), IndexerError> {
        match &record.event {
            ProgramEvent::GameCreated(ev) => self.handle_game_created(ev).await,
            ProgramEvent::PrizeAdded(ev) => self.handle_prize_added(ev).await,
            ProgramEvent::GamePlayInitiated(ev) => {
                self.handle_play_initiated(ev, &record.signature).await
            }
            ProgramEvent::GameStatusUpdated(ev) => self.handle_game_status(ev).await,
            ProgramEvent::SupplyReplenished(ev) => self.handle_supply_replenished(ev).await,
            ProgramEvent::TreasuryWithdrawn(ev) => {
                self.handle_treasury_withdrawn(ev, record).await
            }
            ProgramEvent::PlayResolved(ev) => self.handle_play_resolved(ev).await,
            ProgramEvent::PrizeClaimed(ev) => self.handle_prize_claimed(ev).await,
            ProgramEvent::NftListed(ev) => self.handle_nft_listed(ev).await,
            ProgramEvent::NftDelisted(ev) => self.handle_nft_delisted(ev).await,
            ProgramEvent::NftSold(ev) => self.handle_nft_sold(ev).await,
            ProgramEvent::ListingPriceUpdated(ev) => self.handle_price_updated(ev).await,
            ProgramEvent::PlatformFeesWithdrawn(ev) => {
                self.handle_platform_fees_withdrawn(ev, record).await
            }
        }
    }

    // ─── Games and prizes ───────────────────────────────────────────────────────

    /// The event only carries the game id; the authoritative metadata
    /// (name, cost, mint, prize list) is read from the on-chain account.
    /// When the account cannot be fetched a minimal row is indexed from
    /// the event so later events still have something to attach to.
    async fn handle_game_created(&self, ev: &GameCreated) -> Result<(), IndexerError> {
        if self.store.game_exists(ev.game_id).await? {
            debug!(game_id = ev.game_id, "game already indexed");
            return Ok(());
        }

        let fetched = match self.chain.game_by_id(ev.game_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(game_id = ev.game_id, error = %e, "game account fetch failed");
                None
            }
        };

        let (game, prizes) = match fetched {
            Some((pubkey, account)) => {
                let prizes = match self.chain.prizes_for_game(&pubkey).await {
                    Ok(list) => list
                        .iter()
                        .map(|p| prize_from_account(ev.game_id, p))
                        .collect(),
                    Err(e) => {
                        warn!(game_id = ev.game_id, error = %e, "prize account fetch failed");
                        Vec::new()
                    }
                };
                (game_from_account(&account), prizes)
            }
            None => {
                warn!(
                    game_id = ev.game_id,
                    "game account unavailable; indexing minimal row from event"
                );
                (
                    Game {
                        game_id: ev.game_id,
                        name: String::new(),
                        description: String::new(),
                        image_url: String::new(),
                        token_mint: String::new(),
                        cost_usd_cents: 0,
                        treasury: String::new(),
                        is_active: false,
                        total_plays: 0,
                    },
                    Vec::new(),
                )
            }
        };

        self.store.insert_game_with_prizes(&game, &prizes).await?;
        info!(game_id = ev.game_id, prizes = prizes.len(), "game indexed");
        Ok(())
    }

    async fn handle_prize_added(&self, ev: &PrizeAdded) -> Result<(), IndexerError> {
        let account = match self.chain.prize(ev.game_id, ev.prize_index).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    game_id = ev.game_id,
                    prize_id = ev.prize_id,
                    error = %e,
                    "prize account fetch failed; falling back to event fields"
                );
                None
            }
        };

        let prize = match account {
            Some(acct) => prize_from_account(ev.game_id, &acct),
            None => {
                // Merge the event over whatever is already indexed so a
                // fallback replay does not clobber fetched metadata.
                let existing = self.store.get_prize(ev.game_id, ev.prize_id).await?;
                let mut prize = existing.unwrap_or(Prize {
                    game_id: ev.game_id,
                    prize_id: ev.prize_id,
                    prize_index: ev.prize_index,
                    name: String::new(),
                    tier: "common".into(),
                    probability_bp: 0,
                    supply_total: 0,
                    supply_remaining: ev.supply_total,
                    metadata_uri: String::new(),
                });
                prize.prize_index = ev.prize_index;
                prize.probability_bp = ev.probability_bp;
                prize.supply_total = ev.supply_total;
                prize
            }
        };

        self.store.upsert_prize(&prize).await?;
        debug!(game_id = ev.game_id, prize_id = ev.prize_id, "prize upserted");
        Ok(())
    }

    async fn handle_game_status(&self, ev: &GameStatusUpdated) -> Result<(), IndexerError> {
        if !self.store.update_game_status(ev.game_id, ev.is_active).await? {
            warn!(game_id = ev.game_id, "status update for unknown game dropped");
        }
        Ok(())
    }

    async fn handle_supply_replenished(&self, ev: &SupplyReplenished) -> Result<(), IndexerError> {
        if !self
            .store
            .set_prize_supply(ev.game_id, ev.prize_id, ev.new_supply)
            .await?
        {
            warn!(
                game_id = ev.game_id,
                prize_id = ev.prize_id,
                "replenishment for unknown prize dropped"
            );
        }
        Ok(())
    }

    // ─── Plays ──────────────────────────────────────────────────────────────────

    async fn handle_play_initiated(
        &self,
        ev: &GamePlayInitiated,
        signature: &str,
    ) -> Result<(), IndexerError> {
        if self.store.get_play(signature).await?.is_some() {
            debug!(signature, "play already indexed");
            return Ok(());
        }

        let verdict = self.decide_payment(ev).await?;
        let status = match verdict.status {
            VerdictStatus::Rejected => PlayStatus::Failed,
            VerdictStatus::Accepted | VerdictStatus::Provisional => PlayStatus::Pending,
        };

        self.store
            .insert_play(&Play {
                signature: signature.to_string(),
                session: ev.session.clone(),
                game_id: ev.game_id,
                user_wallet: ev.user.clone(),
                token_amount_paid: ev.token_amount,
                status,
                prize_id: None,
                nft_mint: None,
                random_value: None,
                played_at: ev.timestamp,
            })
            .await?;
        info!(
            signature,
            game_id = ev.game_id,
            status = %status,
            usd_cents = verdict.actual_usd_cents,
            "play indexed"
        );

        publish_best_effort(
            &self.notifier,
            signature,
            "payment_verified",
            PaymentVerifiedPayload {
                transaction_signature: signature.to_string(),
                status: match verdict.status {
                    VerdictStatus::Rejected => "rejected",
                    _ => "verified",
                },
                message: verdict.reason,
                actual_usd_value: verdict.actual_usd_cents as f64 / 100.0,
            },
        )
        .await;
        Ok(())
    }

    /// Run payment verification for a new play, failing open when the
    /// required context (game row, mint decimals) cannot be fetched.
    async fn decide_payment(&self, ev: &GamePlayInitiated) -> Result<Verdict, IndexerError> {
        let Some(game) = self.store.get_game(ev.game_id).await? else {
            warn!(game_id = ev.game_id, "game not indexed; provisionally accepting play");
            return Ok(provisional("game not indexed yet"));
        };
        if game.token_mint.is_empty() || game.cost_usd_cents == 0 {
            warn!(game_id = ev.game_id, "game indexed without pricing data; provisionally accepting");
            return Ok(provisional("game pricing unavailable"));
        }

        let decimals = match self.chain.mint_decimals(&game.token_mint).await {
            Ok(Some(d)) => d,
            Ok(None) => {
                warn!(mint = %game.token_mint, "payment mint account missing; provisionally accepting");
                return Ok(provisional("payment mint unavailable"));
            }
            Err(e) => {
                warn!(mint = %game.token_mint, error = %e, "mint fetch failed; provisionally accepting");
                return Ok(provisional("payment mint fetch failed"));
            }
        };

        Ok(self
            .verifier
            .verify(
                &game.token_mint,
                ev.token_amount,
                decimals,
                game.cost_usd_cents,
                ev.timestamp,
            )
            .await)
    }

    async fn handle_play_resolved(&self, ev: &PlayResolved) -> Result<(), IndexerError> {
        if ev.is_win {
            self.apply_win(ev).await
        } else {
            self.apply_loss(ev).await
        }
    }

    async fn apply_win(&self, ev: &PlayResolved) -> Result<(), IndexerError> {
        let Some(prize_id) = ev.prize_id else {
            warn!(session = %ev.session, "win event without prize id dropped");
            return Ok(());
        };
        let Some(play) = self.store.get_play_by_session(&ev.session).await? else {
            warn!(session = %ev.session, "no play indexed for resolved session; event dropped");
            return Ok(());
        };

        // A rejected payment is final: the play must never be upgraded to
        // a win regardless of what arrives afterwards.
        if play.status == PlayStatus::Failed {
            warn!(
                signature = %play.signature,
                prize_id,
                "refusing to award prize: payment was rejected"
            );
            publish_best_effort(
                &self.notifier,
                &play.signature,
                "finalized",
                FinalizedPayload {
                    transaction_signature: play.signature.clone(),
                    status: "failed",
                    prize_id: None,
                    nft_mint: None,
                },
            )
            .await;
            return Ok(());
        }

        if !self
            .store
            .complete_play(&ev.session, prize_id, &ev.random_value)
            .await?
        {
            debug!(session = %ev.session, "play already completed; replay ignored");
            return Ok(());
        }

        if !self.store.decrement_prize_supply(ev.game_id, prize_id).await? {
            warn!(game_id = ev.game_id, prize_id, "won prize not indexed; supply not adjusted");
        }
        self.store.increment_total_plays(ev.game_id).await?;
        info!(signature = %play.signature, prize_id, "play completed");

        publish_best_effort(
            &self.notifier,
            &play.signature,
            "finalized",
            FinalizedPayload {
                transaction_signature: play.signature.clone(),
                status: "completed",
                prize_id: Some(prize_id),
                nft_mint: play.nft_mint.clone(),
            },
        )
        .await;
        Ok(())
    }

    async fn apply_loss(&self, ev: &PlayResolved) -> Result<(), IndexerError> {
        match self.store.get_play_by_session(&ev.session).await? {
            Some(play) => {
                if self.store.fail_play(&ev.session, Some(&ev.random_value)).await? {
                    self.store.increment_total_plays(ev.game_id).await?;
                    info!(signature = %play.signature, "play lost");
                    publish_best_effort(
                        &self.notifier,
                        &play.signature,
                        "finalized",
                        FinalizedPayload {
                            transaction_signature: play.signature.clone(),
                            status: "failed",
                            prize_id: None,
                            nft_mint: None,
                        },
                    )
                    .await;
                } else {
                    debug!(session = %ev.session, "play already terminal; replay ignored");
                }
            }
            None => {
                // The counter mirrors on-chain state even when the play
                // row itself was never indexed.
                warn!(session = %ev.session, "no play indexed for lost session; counting play");
                self.store.increment_total_plays(ev.game_id).await?;
            }
        }
        Ok(())
    }

    async fn handle_prize_claimed(&self, ev: &PrizeClaimed) -> Result<(), IndexerError> {
        // The rejected-payment guard extends to the claim: no NFT record
        // for a play whose payment was refused.
        if let Some(play) = self.store.get_play_by_session(&ev.session).await? {
            if play.status == PlayStatus::Failed {
                warn!(
                    signature = %play.signature,
                    mint = %ev.nft_mint,
                    "refusing NFT record: payment was rejected"
                );
                return Ok(());
            }
        }

        if !self.store.set_play_nft_mint(&ev.session, &ev.nft_mint).await? {
            debug!(
                session = %ev.session,
                "no completed play awaiting mint; NFT record still upserted"
            );
        }
        self.store
            .upsert_nft(&Nft {
                mint_address: ev.nft_mint.clone(),
                game_id: ev.game_id,
                prize_id: ev.prize_id,
                current_owner: ev.user.clone(),
                is_redeemed: false,
                redeem_signature: None,
                redeemed_at: None,
            })
            .await?;
        self.store.upsert_ownership(&ev.nft_mint, &ev.user, 1).await?;
        info!(mint = %ev.nft_mint, prize_id = ev.prize_id, "prize NFT indexed");
        Ok(())
    }

    // ─── Marketplace ────────────────────────────────────────────────────────────

    async fn handle_nft_listed(&self, ev: &NftListed) -> Result<(), IndexerError> {
        self.store
            .open_listing(&ev.nft_mint, &ev.seller, ev.price, ev.timestamp)
            .await?;
        debug!(mint = %ev.nft_mint, price = ev.price, "listing opened");
        Ok(())
    }

    async fn handle_nft_delisted(&self, ev: &NftDelisted) -> Result<(), IndexerError> {
        if !self.store.close_listing(&ev.nft_mint, None, ev.timestamp).await? {
            warn!(mint = %ev.nft_mint, "cancel for a listing that is not active dropped");
        }
        Ok(())
    }

    async fn handle_nft_sold(&self, ev: &NftSold) -> Result<(), IndexerError> {
        if !self
            .store
            .close_listing(&ev.nft_mint, Some(&ev.buyer), ev.timestamp)
            .await?
        {
            warn!(mint = %ev.nft_mint, "sale for a listing that is not active dropped");
            return Ok(());
        }
        self.store.set_nft_owner(&ev.nft_mint, &ev.buyer).await?;
        self.store
            .transfer_ownership(&ev.nft_mint, &ev.seller, &ev.buyer)
            .await?;
        info!(mint = %ev.nft_mint, buyer = %ev.buyer, "NFT sold");
        Ok(())
    }

    async fn handle_price_updated(&self, ev: &ListingPriceUpdated) -> Result<(), IndexerError> {
        if !self.store.update_listing_price(&ev.nft_mint, ev.new_price).await? {
            warn!(mint = %ev.nft_mint, "price update for inactive listing dropped");
        }
        Ok(())
    }

    // ─── Treasury audit log ─────────────────────────────────────────────────────

    async fn handle_treasury_withdrawn(
        &self,
        ev: &TreasuryWithdrawn,
        record: &EventRecord,
    ) -> Result<(), IndexerError> {
        self.store
            .insert_treasury_event(
                &record.signature,
                record.log_index,
                "game_treasury",
                Some(ev.game_id),
                ev.amount,
                &ev.destination,
                ev.timestamp,
            )
            .await?;
        Ok(())
    }

    async fn handle_platform_fees_withdrawn(
        &self,
        ev: &PlatformFeesWithdrawn,
        record: &EventRecord,
    ) -> Result<(), IndexerError> {
        self.store
            .insert_treasury_event(
                &record.signature,
                record.log_index,
                "marketplace_fees",
                None,
                ev.amount,
                &ev.destination,
                ev.timestamp,
            )
            .await?;
        Ok(())
    }
}

fn provisional(reason: &str) -> Verdict {
    Verdict {
        status: VerdictStatus::Provisional,
        actual_usd_cents: 0,
        reason: reason.into(),
        flags: RiskFlags::default(),
    }
}

fn game_from_account(account: &GameAccount) -> Game {
    Game {
        game_id: account.game_id,
        name: account.name.clone(),
        description: account.description.clone(),
        image_url: account.image_url.clone(),
        token_mint: account.token_mint.clone(),
        cost_usd_cents: account.cost_usd_cents,
        treasury: account.treasury.clone(),
        is_active: account.is_active,
        total_plays: account.total_plays,
    }
}

fn prize_from_account(game_id: u64, account: &PrizeAccount) -> Prize {
    Prize {
        game_id,
        prize_id: account.prize_id,
        prize_index: account.prize_index,
        name: account.name.clone(),
        tier: account.tier.as_str().into(),
        probability_bp: account.probability_bp,
        supply_total: account.supply_total,
        supply_remaining: account.supply_remaining,
        metadata_uri: account.metadata_uri.clone(),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::Value;

    use gachadex_codec::PrizeTier;
    use gachadex_oracle::{OracleError, PriceQuote, VerifierConfig};

    use crate::notify::NotifyError;

    const TS: i64 = 1_700_000_000;
    const MINT: &str = "MintAAA";

    // ── Scripted collaborators ────────────────────────────────────────────────

    #[derive(Default)]
    struct MockChain {
        games: HashMap<u64, (String, GameAccount)>,
        prizes: HashMap<String, Vec<PrizeAccount>>,
        decimals: HashMap<String, u8>,
    }

    #[async_trait]
    impl ChainStateReader for MockChain {
        async fn game_by_id(
            &self,
            game_id: u64,
        ) -> Result<Option<(String, GameAccount)>, IndexerError> {
            Ok(self.games.get(&game_id).cloned())
        }

        async fn prizes_for_game(
            &self,
            game_pubkey: &str,
        ) -> Result<Vec<PrizeAccount>, IndexerError> {
            Ok(self.prizes.get(game_pubkey).cloned().unwrap_or_default())
        }

        async fn prize(
            &self,
            game_id: u64,
            prize_index: u8,
        ) -> Result<Option<PrizeAccount>, IndexerError> {
            let Some((pubkey, _)) = self.games.get(&game_id) else {
                return Ok(None);
            };
            Ok(self
                .prizes
                .get(pubkey)
                .and_then(|list| list.iter().find(|p| p.prize_index == prize_index).cloned()))
        }

        async fn mint_decimals(&self, mint: &str) -> Result<Option<u8>, IndexerError> {
            Ok(self.decimals.get(mint).copied())
        }
    }

    struct FixedOracle(Option<PriceQuote>);

    #[async_trait]
    impl PriceOracle for FixedOracle {
        async fn quote(&self, _mint: &str) -> Result<Option<PriceQuote>, OracleError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        messages: Arc<Mutex<Vec<(String, String, Value)>>>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(String, String, Value)> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn publish(
            &self,
            channel: &str,
            event: &str,
            payload: Value,
        ) -> Result<(), NotifyError> {
            self.messages
                .lock()
                .unwrap()
                .push((channel.to_string(), event.to_string(), payload));
            Ok(())
        }
    }

    // ── Fixtures ──────────────────────────────────────────────────────────────

    fn game_account(game_id: u64) -> GameAccount {
        GameAccount {
            authority: "AuthAAA".into(),
            game_id,
            name: "Capsule Rush".into(),
            description: "A capsule machine".into(),
            image_url: "https://img.example/7.png".into(),
            token_mint: MINT.into(),
            cost_usd_cents: 500,
            treasury: "TreasuryAAA".into(),
            prize_count: 1,
            prize_probabilities: vec![0; 16],
            total_supply_remaining: 10,
            total_plays: 0,
            is_active: true,
        }
    }

    fn prize_account(prize_id: u64, remaining: u32) -> PrizeAccount {
        PrizeAccount {
            game: "GamePda7".into(),
            prize_index: 0,
            prize_id,
            name: "Golden Cat".into(),
            description: "Shiny".into(),
            metadata_uri: "https://meta.example/cat.json".into(),
            tier: PrizeTier::Legendary,
            probability_bp: 250,
            supply_total: 10,
            supply_remaining: remaining,
        }
    }

    fn chain_with_game() -> MockChain {
        let mut chain = MockChain::default();
        chain.games.insert(7, ("GamePda7".into(), game_account(7)));
        chain
            .prizes
            .insert("GamePda7".into(), vec![prize_account(55, 10)]);
        chain.decimals.insert(MINT.into(), 6);
        chain
    }

    /// Default oracle quote: $0.01/token, healthy market cap, fresh.
    fn healthy_quote() -> PriceQuote {
        PriceQuote {
            price_usd: 0.01,
            price_sol: 0.0,
            market_cap_usd: 1_000_000.0,
            timestamp: TS,
        }
    }

    type TestReconciler = Reconciler<MockChain, FixedOracle, RecordingNotifier>;

    async fn setup(chain: MockChain, quote: Option<PriceQuote>) -> (TestReconciler, RecordingNotifier) {
        let store = SqliteStore::in_memory().await.unwrap();
        let notifier = RecordingNotifier::default();
        let reconciler = Reconciler::new(
            store,
            chain,
            PaymentVerifier::new(FixedOracle(quote), VerifierConfig::default()),
            notifier.clone(),
        );
        (reconciler, notifier)
    }

    fn record(event: ProgramEvent, signature: &str) -> EventRecord {
        EventRecord {
            event,
            signature: signature.into(),
            slot: 1_000,
            log_index: 0,
        }
    }

    fn game_created(game_id: u64) -> ProgramEvent {
        ProgramEvent::GameCreated(GameCreated {
            game_id,
            authority: "AuthAAA".into(),
            timestamp: TS,
        })
    }

    fn play_initiated(session: &str, token_amount: u64) -> ProgramEvent {
        ProgramEvent::GamePlayInitiated(GamePlayInitiated {
            user: "UserAAA".into(),
            game_id: 7,
            token_amount,
            session: session.into(),
            timestamp: TS,
        })
    }

    fn play_won(session: &str, prize_id: u64) -> ProgramEvent {
        ProgramEvent::PlayResolved(PlayResolved {
            user: "UserAAA".into(),
            game_id: 7,
            session: session.into(),
            prize_id: Some(prize_id),
            prize_index: Some(0),
            tier: Some(PrizeTier::Legendary),
            is_win: true,
            random_value: "ab".repeat(32),
            timestamp: TS + 5,
        })
    }

    fn play_lost(session: &str) -> ProgramEvent {
        ProgramEvent::PlayResolved(PlayResolved {
            user: "UserAAA".into(),
            game_id: 7,
            session: session.into(),
            prize_id: None,
            prize_index: None,
            tier: None,
            is_win: false,
            random_value: "cd".repeat(32),
            timestamp: TS + 5,
        })
    }

    fn prize_claimed(session: &str, mint: &str) -> ProgramEvent {
        ProgramEvent::PrizeClaimed(PrizeClaimed {
            user: "UserAAA".into(),
            game_id: 7,
            session: session.into(),
            prize_id: 55,
            prize_index: 0,
            tier: PrizeTier::Legendary,
            nft_mint: mint.into(),
            timestamp: TS + 6,
        })
    }

    // 1000 tokens at $0.01 = $10.00, comfortably above the $5.00 cost.
    const AMPLE_AMOUNT: u64 = 1_000_000_000;
    // 100 tokens = $1.00, well below.
    const SHORT_AMOUNT: u64 = 100_000_000;

    // ── Game indexing ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn duplicate_game_created_indexes_once() {
        let (reconciler, _) = setup(chain_with_game(), Some(healthy_quote())).await;

        reconciler.apply(&record(game_created(7), "sig1")).await.unwrap();
        reconciler.apply(&record(game_created(7), "sig2")).await.unwrap();

        let game = reconciler.store().get_game(7).await.unwrap().unwrap();
        assert_eq!(game.name, "Capsule Rush");
        let prize = reconciler.store().get_prize(7, 55).await.unwrap().unwrap();
        assert_eq!(prize.tier, "legendary");
    }

    #[tokio::test]
    async fn game_created_without_account_indexes_minimal_row() {
        let (reconciler, _) = setup(MockChain::default(), Some(healthy_quote())).await;
        reconciler.apply(&record(game_created(9), "sig1")).await.unwrap();
        let game = reconciler.store().get_game(9).await.unwrap().unwrap();
        assert_eq!(game.name, "");
        assert!(!game.is_active);
    }

    #[tokio::test]
    async fn prize_added_prefers_account_state() {
        let (reconciler, _) = setup(chain_with_game(), Some(healthy_quote())).await;
        reconciler
            .apply(&record(
                ProgramEvent::PrizeAdded(PrizeAdded {
                    game_id: 7,
                    prize_index: 0,
                    prize_id: 55,
                    probability_bp: 999, // event value; account says 250
                    supply_total: 10,
                    timestamp: TS,
                }),
                "sig1",
            ))
            .await
            .unwrap();
        let prize = reconciler.store().get_prize(7, 55).await.unwrap().unwrap();
        assert_eq!(prize.probability_bp, 250);
        assert_eq!(prize.name, "Golden Cat");
    }

    #[tokio::test]
    async fn status_and_replenish_overwrite() {
        let (reconciler, _) = setup(chain_with_game(), Some(healthy_quote())).await;
        reconciler.apply(&record(game_created(7), "sig1")).await.unwrap();

        reconciler
            .apply(&record(
                ProgramEvent::GameStatusUpdated(GameStatusUpdated {
                    game_id: 7,
                    is_active: false,
                    timestamp: TS,
                }),
                "sig2",
            ))
            .await
            .unwrap();
        assert!(!reconciler.store().get_game(7).await.unwrap().unwrap().is_active);

        reconciler
            .apply(&record(
                ProgramEvent::SupplyReplenished(SupplyReplenished {
                    game_id: 7,
                    prize_id: 55,
                    prize_index: 0,
                    new_supply: 25,
                    timestamp: TS,
                }),
                "sig3",
            ))
            .await
            .unwrap();
        let prize = reconciler.store().get_prize(7, 55).await.unwrap().unwrap();
        assert_eq!(prize.supply_remaining, 25);
    }

    // ── Payment verification on play initiation ───────────────────────────────

    #[tokio::test]
    async fn sufficient_payment_recorded_pending_and_notified() {
        let (reconciler, notifier) = setup(chain_with_game(), Some(healthy_quote())).await;
        reconciler.apply(&record(game_created(7), "sig0")).await.unwrap();

        reconciler
            .apply(&record(play_initiated("sessA", AMPLE_AMOUNT), "sigA"))
            .await
            .unwrap();

        let play = reconciler.store().get_play("sigA").await.unwrap().unwrap();
        assert_eq!(play.status, PlayStatus::Pending);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        let (channel, event, payload) = &sent[0];
        assert_eq!(channel, "plays:sigA");
        assert_eq!(event, "payment_verified");
        assert_eq!(payload["status"], "verified");
        assert_eq!(payload["actualUsdValue"], 10.0);
    }

    #[tokio::test]
    async fn insufficient_payment_recorded_failed() {
        let (reconciler, notifier) = setup(chain_with_game(), Some(healthy_quote())).await;
        reconciler.apply(&record(game_created(7), "sig0")).await.unwrap();

        reconciler
            .apply(&record(play_initiated("sessA", SHORT_AMOUNT), "sigA"))
            .await
            .unwrap();

        let play = reconciler.store().get_play("sigA").await.unwrap().unwrap();
        assert_eq!(play.status, PlayStatus::Failed);
        let (_, event, payload) = notifier.sent().into_iter().last().unwrap();
        assert_eq!(event, "payment_verified");
        assert_eq!(payload["status"], "rejected");
    }

    #[tokio::test]
    async fn oracle_outage_fails_open_to_pending() {
        let (reconciler, _) = setup(chain_with_game(), None).await;
        reconciler.apply(&record(game_created(7), "sig0")).await.unwrap();

        reconciler
            .apply(&record(play_initiated("sessA", 1), "sigA"))
            .await
            .unwrap();
        let play = reconciler.store().get_play("sigA").await.unwrap().unwrap();
        assert_eq!(play.status, PlayStatus::Pending);
    }

    // ── Terminal transitions ──────────────────────────────────────────────────

    #[tokio::test]
    async fn rejected_play_is_never_awarded() {
        let (reconciler, notifier) = setup(chain_with_game(), Some(healthy_quote())).await;
        reconciler.apply(&record(game_created(7), "sig0")).await.unwrap();

        // Underpaid play → failed.
        reconciler
            .apply(&record(play_initiated("sessA", SHORT_AMOUNT), "sigA"))
            .await
            .unwrap();
        // A win for the same session must be refused by the guard.
        reconciler.apply(&record(play_won("sessA", 55), "sigFin")).await.unwrap();
        // And the claim that follows must not attach a mint to the play.
        reconciler
            .apply(&record(prize_claimed("sessA", "MintXYZ"), "sigFin"))
            .await
            .unwrap();

        let play = reconciler.store().get_play("sigA").await.unwrap().unwrap();
        assert_eq!(play.status, PlayStatus::Failed);
        assert_eq!(play.prize_id, None);
        assert_eq!(play.nft_mint, None);

        // Supply untouched, plays counter untouched, no NFT record.
        let prize = reconciler.store().get_prize(7, 55).await.unwrap().unwrap();
        assert_eq!(prize.supply_remaining, 10);
        assert_eq!(reconciler.store().get_game(7).await.unwrap().unwrap().total_plays, 0);
        assert!(reconciler.store().get_nft("MintXYZ").await.unwrap().is_none());

        // The rejection was surfaced on the play's channel.
        let finalized: Vec<_> = notifier
            .sent()
            .into_iter()
            .filter(|(_, event, _)| event == "finalized")
            .collect();
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].2["status"], "failed");
    }

    #[tokio::test]
    async fn win_completes_play_and_decrements_supply_once() {
        let (reconciler, notifier) = setup(chain_with_game(), Some(healthy_quote())).await;
        reconciler.apply(&record(game_created(7), "sig0")).await.unwrap();
        reconciler
            .apply(&record(play_initiated("sessA", AMPLE_AMOUNT), "sigA"))
            .await
            .unwrap();

        reconciler.apply(&record(play_won("sessA", 55), "sigFin")).await.unwrap();
        // Duplicate delivery of the same resolution.
        reconciler.apply(&record(play_won("sessA", 55), "sigFin")).await.unwrap();

        let play = reconciler.store().get_play("sigA").await.unwrap().unwrap();
        assert_eq!(play.status, PlayStatus::Completed);
        assert_eq!(play.prize_id, Some(55));

        let prize = reconciler.store().get_prize(7, 55).await.unwrap().unwrap();
        assert_eq!(prize.supply_remaining, 9); // decremented exactly once
        assert_eq!(reconciler.store().get_game(7).await.unwrap().unwrap().total_plays, 1);

        let finalized: Vec<_> = notifier
            .sent()
            .into_iter()
            .filter(|(_, event, _)| event == "finalized")
            .collect();
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].0, "plays:sigA");
        assert_eq!(finalized[0].2["status"], "completed");
        assert_eq!(finalized[0].2["prizeId"], 55);
    }

    #[tokio::test]
    async fn supply_floors_at_zero_across_wins() {
        let mut chain = chain_with_game();
        chain.prizes.insert("GamePda7".into(), vec![prize_account(55, 1)]);
        let (reconciler, _) = setup(chain, Some(healthy_quote())).await;
        reconciler.apply(&record(game_created(7), "sig0")).await.unwrap();

        for (sig, sess) in [("sigA", "sessA"), ("sigB", "sessB")] {
            reconciler
                .apply(&record(play_initiated(sess, AMPLE_AMOUNT), sig))
                .await
                .unwrap();
        }
        reconciler.apply(&record(play_won("sessA", 55), "sigF1")).await.unwrap();
        reconciler.apply(&record(play_won("sessB", 55), "sigF2")).await.unwrap();

        let prize = reconciler.store().get_prize(7, 55).await.unwrap().unwrap();
        assert_eq!(prize.supply_remaining, 0); // floored, never negative
        assert_eq!(reconciler.store().get_game(7).await.unwrap().unwrap().total_plays, 2);
    }

    #[tokio::test]
    async fn loss_marks_failed_and_counts_play() {
        let (reconciler, _) = setup(chain_with_game(), Some(healthy_quote())).await;
        reconciler.apply(&record(game_created(7), "sig0")).await.unwrap();
        reconciler
            .apply(&record(play_initiated("sessA", AMPLE_AMOUNT), "sigA"))
            .await
            .unwrap();

        reconciler.apply(&record(play_lost("sessA"), "sigF")).await.unwrap();
        // Replay does not double-count.
        reconciler.apply(&record(play_lost("sessA"), "sigF")).await.unwrap();

        let play = reconciler.store().get_play("sigA").await.unwrap().unwrap();
        assert_eq!(play.status, PlayStatus::Failed);
        assert_eq!(reconciler.store().get_game(7).await.unwrap().unwrap().total_plays, 1);
    }

    #[tokio::test]
    async fn loss_without_indexed_play_still_counts() {
        let (reconciler, _) = setup(chain_with_game(), Some(healthy_quote())).await;
        reconciler.apply(&record(game_created(7), "sig0")).await.unwrap();

        reconciler.apply(&record(play_lost("sessGhost"), "sigF")).await.unwrap();
        assert_eq!(reconciler.store().get_game(7).await.unwrap().unwrap().total_plays, 1);
    }

    // ── Prize claims and NFTs ─────────────────────────────────────────────────

    #[tokio::test]
    async fn claim_attaches_mint_and_creates_nft() {
        let (reconciler, _) = setup(chain_with_game(), Some(healthy_quote())).await;
        reconciler.apply(&record(game_created(7), "sig0")).await.unwrap();
        reconciler
            .apply(&record(play_initiated("sessA", AMPLE_AMOUNT), "sigA"))
            .await
            .unwrap();
        reconciler.apply(&record(play_won("sessA", 55), "sigFin")).await.unwrap();
        reconciler
            .apply(&record(prize_claimed("sessA", "MintXYZ"), "sigFin"))
            .await
            .unwrap();
        // Duplicate claim delivery.
        reconciler
            .apply(&record(prize_claimed("sessA", "MintXYZ"), "sigFin"))
            .await
            .unwrap();

        let play = reconciler.store().get_play("sigA").await.unwrap().unwrap();
        assert_eq!(play.nft_mint.as_deref(), Some("MintXYZ"));

        let nft = reconciler.store().get_nft("MintXYZ").await.unwrap().unwrap();
        assert_eq!(nft.current_owner, "UserAAA");
        assert_eq!(nft.prize_id, 55);
        assert_eq!(
            reconciler
                .store()
                .get_ownership("MintXYZ", "UserAAA")
                .await
                .unwrap()
                .unwrap()
                .quantity,
            1
        );
    }

    // ── Marketplace ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn sale_moves_listing_and_ownership() {
        let (reconciler, _) = setup(chain_with_game(), Some(healthy_quote())).await;
        reconciler.apply(&record(game_created(7), "sig0")).await.unwrap();
        reconciler
            .apply(&record(play_initiated("sessA", AMPLE_AMOUNT), "sigA"))
            .await
            .unwrap();
        reconciler.apply(&record(play_won("sessA", 55), "sigFin")).await.unwrap();
        reconciler
            .apply(&record(prize_claimed("sessA", "MintXYZ"), "sigFin"))
            .await
            .unwrap();

        reconciler
            .apply(&record(
                ProgramEvent::NftListed(NftListed {
                    seller: "UserAAA".into(),
                    nft_mint: "MintXYZ".into(),
                    price: 500,
                    timestamp: TS + 10,
                }),
                "sigL",
            ))
            .await
            .unwrap();
        reconciler
            .apply(&record(
                ProgramEvent::NftSold(NftSold {
                    seller: "UserAAA".into(),
                    buyer: "UserBBB".into(),
                    nft_mint: "MintXYZ".into(),
                    price: 500,
                    fee: 10,
                    timestamp: TS + 20,
                }),
                "sigS",
            ))
            .await
            .unwrap();

        let listing = reconciler.store().get_listing("MintXYZ").await.unwrap().unwrap();
        assert!(!listing.is_active);
        assert_eq!(listing.buyer.as_deref(), Some("UserBBB"));

        let nft = reconciler.store().get_nft("MintXYZ").await.unwrap().unwrap();
        assert_eq!(nft.current_owner, "UserBBB");
        assert!(reconciler
            .store()
            .get_ownership("MintXYZ", "UserAAA")
            .await
            .unwrap()
            .is_none());
    }

    // ── Treasury audit log ────────────────────────────────────────────────────

    #[tokio::test]
    async fn treasury_withdrawals_recorded_once() {
        let (reconciler, _) = setup(chain_with_game(), Some(healthy_quote())).await;
        let event = ProgramEvent::TreasuryWithdrawn(TreasuryWithdrawn {
            game_id: 7,
            amount: 1_000,
            destination: "DestAAA".into(),
            timestamp: TS,
        });
        reconciler.apply(&record(event.clone(), "sigT")).await.unwrap();
        reconciler.apply(&record(event, "sigT")).await.unwrap();
        // Second insert is dropped by the (signature, log_index) key; no
        // error either way is the property that matters here.
    }
}
