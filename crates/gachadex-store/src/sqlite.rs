//! SQLite storage backend.
//!
//! Single-file (or in-memory) SQLite via `sqlx`, WAL mode. All writes are
//! keyed upserts; the guarded state transitions (`WHERE status =
//! 'pending'`, `WHERE is_active = 1`) return whether they applied so
//! callers can distinguish a first application from a replay.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::StoreError;
use crate::models::{Game, MarketplaceListing, Nft, NftOwnership, Play, PlayStatus, Prize};

/// SQLite-backed store for the full relational view.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database at `path`. Accepts a plain file path or
    /// a full SQLite URL.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database for tests. Pinned to one connection so every
    /// query sees the same memory database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode=WAL;").execute(&self.pool).await?;

        for ddl in [
            "CREATE TABLE IF NOT EXISTS games (
                game_id        INTEGER PRIMARY KEY,
                name           TEXT    NOT NULL,
                description    TEXT    NOT NULL,
                image_url      TEXT    NOT NULL,
                token_mint     TEXT    NOT NULL,
                cost_usd_cents INTEGER NOT NULL,
                treasury       TEXT    NOT NULL,
                is_active      INTEGER NOT NULL,
                total_plays    INTEGER NOT NULL DEFAULT 0
            );",
            "CREATE TABLE IF NOT EXISTS prizes (
                game_id          INTEGER NOT NULL,
                prize_id         INTEGER NOT NULL,
                prize_index      INTEGER NOT NULL,
                name             TEXT    NOT NULL,
                tier             TEXT    NOT NULL,
                probability_bp   INTEGER NOT NULL,
                supply_total     INTEGER NOT NULL,
                supply_remaining INTEGER NOT NULL,
                metadata_uri     TEXT    NOT NULL,
                PRIMARY KEY (game_id, prize_id)
            );",
            "CREATE TABLE IF NOT EXISTS plays (
                signature         TEXT PRIMARY KEY,
                session           TEXT    NOT NULL UNIQUE,
                game_id           INTEGER NOT NULL,
                user_wallet       TEXT    NOT NULL,
                token_amount_paid INTEGER NOT NULL,
                status            TEXT    NOT NULL
                    CHECK (status IN ('pending', 'completed', 'failed')),
                prize_id          INTEGER,
                nft_mint          TEXT,
                random_value      TEXT,
                played_at         INTEGER NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS nfts (
                mint_address     TEXT PRIMARY KEY,
                game_id          INTEGER NOT NULL,
                prize_id         INTEGER NOT NULL,
                current_owner    TEXT    NOT NULL,
                is_redeemed      INTEGER NOT NULL DEFAULT 0,
                redeem_signature TEXT,
                redeemed_at      INTEGER
            );",
            "CREATE TABLE IF NOT EXISTS nft_ownerships (
                mint_address TEXT    NOT NULL,
                owner        TEXT    NOT NULL,
                quantity     INTEGER NOT NULL,
                PRIMARY KEY (mint_address, owner)
            );",
            "CREATE TABLE IF NOT EXISTS marketplace_listings (
                nft_mint     TEXT PRIMARY KEY,
                seller       TEXT    NOT NULL,
                price_tokens INTEGER NOT NULL,
                is_active    INTEGER NOT NULL,
                listed_at    INTEGER NOT NULL,
                closed_at    INTEGER,
                buyer        TEXT
            );",
            "CREATE TABLE IF NOT EXISTS treasury_events (
                signature   TEXT    NOT NULL,
                log_index   INTEGER NOT NULL,
                kind        TEXT    NOT NULL,
                game_id     INTEGER,
                amount      INTEGER NOT NULL,
                destination TEXT    NOT NULL,
                occurred_at INTEGER NOT NULL,
                PRIMARY KEY (signature, log_index)
            );",
            "CREATE INDEX IF NOT EXISTS idx_plays_game ON plays (game_id);",
            "CREATE INDEX IF NOT EXISTS idx_prizes_game ON prizes (game_id);",
        ] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    // ─── Games ──────────────────────────────────────────────────────────────────

    pub async fn game_exists(&self, game_id: u64) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM games WHERE game_id = ?")
            .bind(game_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn get_game(&self, game_id: u64) -> Result<Option<Game>, StoreError> {
        let row = sqlx::query("SELECT * FROM games WHERE game_id = ?")
            .bind(game_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| game_from_row(&r)))
    }

    /// Insert a game together with its prizes as one logical unit.
    /// Replays are no-ops: every statement is conflict-tolerant.
    pub async fn insert_game_with_prizes(
        &self,
        game: &Game,
        prizes: &[Prize],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO games
             (game_id, name, description, image_url, token_mint, cost_usd_cents,
              treasury, is_active, total_plays)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (game_id) DO NOTHING",
        )
        .bind(game.game_id as i64)
        .bind(&game.name)
        .bind(&game.description)
        .bind(&game.image_url)
        .bind(&game.token_mint)
        .bind(game.cost_usd_cents as i64)
        .bind(&game.treasury)
        .bind(game.is_active as i64)
        .bind(game.total_plays as i64)
        .execute(&mut *tx)
        .await?;

        for prize in prizes {
            sqlx::query(
                "INSERT INTO prizes
                 (game_id, prize_id, prize_index, name, tier, probability_bp,
                  supply_total, supply_remaining, metadata_uri)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (game_id, prize_id) DO NOTHING",
            )
            .bind(prize.game_id as i64)
            .bind(prize.prize_id as i64)
            .bind(prize.prize_index as i64)
            .bind(&prize.name)
            .bind(&prize.tier)
            .bind(prize.probability_bp as i64)
            .bind(prize.supply_total as i64)
            .bind(prize.supply_remaining as i64)
            .bind(&prize.metadata_uri)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(game_id = game.game_id, prizes = prizes.len(), "game indexed");
        Ok(())
    }

    /// Pure overwrite; safe to apply any number of times.
    pub async fn update_game_status(&self, game_id: u64, is_active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE games SET is_active = ? WHERE game_id = ?")
            .bind(is_active as i64)
            .bind(game_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn increment_total_plays(&self, game_id: u64) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE games SET total_plays = total_plays + 1 WHERE game_id = ?")
            .bind(game_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Prizes ─────────────────────────────────────────────────────────────────

    pub async fn get_prize(&self, game_id: u64, prize_id: u64) -> Result<Option<Prize>, StoreError> {
        let row = sqlx::query("SELECT * FROM prizes WHERE game_id = ? AND prize_id = ?")
            .bind(game_id as i64)
            .bind(prize_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| prize_from_row(&r)))
    }

    /// Insert or update a prize. On update, `supply_remaining` is clamped
    /// so a replayed event can never regress it above `supply_total`.
    pub async fn upsert_prize(&self, prize: &Prize) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO prizes
             (game_id, prize_id, prize_index, name, tier, probability_bp,
              supply_total, supply_remaining, metadata_uri)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (game_id, prize_id) DO UPDATE SET
                 prize_index      = excluded.prize_index,
                 name             = excluded.name,
                 tier             = excluded.tier,
                 probability_bp   = excluded.probability_bp,
                 supply_total     = excluded.supply_total,
                 supply_remaining = MIN(excluded.supply_remaining, excluded.supply_total),
                 metadata_uri     = excluded.metadata_uri",
        )
        .bind(prize.game_id as i64)
        .bind(prize.prize_id as i64)
        .bind(prize.prize_index as i64)
        .bind(&prize.name)
        .bind(&prize.tier)
        .bind(prize.probability_bp as i64)
        .bind(prize.supply_total as i64)
        .bind(prize.supply_remaining as i64)
        .bind(&prize.metadata_uri)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replenishment: overwrite the remaining supply and raise the total
    /// when the new remaining exceeds it.
    pub async fn set_prize_supply(
        &self,
        game_id: u64,
        prize_id: u64,
        new_supply: u32,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE prizes SET
                 supply_remaining = ?,
                 supply_total     = MAX(supply_total, ?)
             WHERE game_id = ? AND prize_id = ?",
        )
        .bind(new_supply as i64)
        .bind(new_supply as i64)
        .bind(game_id as i64)
        .bind(prize_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Decrement remaining supply by one, floored at zero.
    pub async fn decrement_prize_supply(
        &self,
        game_id: u64,
        prize_id: u64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE prizes SET supply_remaining = MAX(supply_remaining - 1, 0)
             WHERE game_id = ? AND prize_id = ?",
        )
        .bind(game_id as i64)
        .bind(prize_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Plays ──────────────────────────────────────────────────────────────────

    /// Insert a play row. Returns `false` when the signature was already
    /// indexed (duplicate delivery).
    pub async fn insert_play(&self, play: &Play) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO plays
             (signature, session, game_id, user_wallet, token_amount_paid,
              status, prize_id, nft_mint, random_value, played_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (signature) DO NOTHING",
        )
        .bind(&play.signature)
        .bind(&play.session)
        .bind(play.game_id as i64)
        .bind(&play.user_wallet)
        .bind(play.token_amount_paid as i64)
        .bind(play.status.as_str())
        .bind(play.prize_id.map(|v| v as i64))
        .bind(&play.nft_mint)
        .bind(&play.random_value)
        .bind(play.played_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_play(&self, signature: &str) -> Result<Option<Play>, StoreError> {
        let row = sqlx::query("SELECT * FROM plays WHERE signature = ?")
            .bind(signature)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| play_from_row(&r)))
    }

    pub async fn get_play_by_session(&self, session: &str) -> Result<Option<Play>, StoreError> {
        let row = sqlx::query("SELECT * FROM plays WHERE session = ?")
            .bind(session)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| play_from_row(&r)))
    }

    /// `pending → completed`, guarded: a play already terminal (notably a
    /// rejected payment in `failed`) is never upgraded. Returns whether
    /// the transition applied.
    pub async fn complete_play(
        &self,
        session: &str,
        prize_id: u64,
        random_value: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE plays SET status = 'completed', prize_id = ?, random_value = ?
             WHERE session = ? AND status = 'pending'",
        )
        .bind(prize_id as i64)
        .bind(random_value)
        .bind(session)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `pending → failed`, guarded the same way.
    pub async fn fail_play(&self, session: &str, random_value: Option<&str>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE plays SET status = 'failed', random_value = COALESCE(?, random_value)
             WHERE session = ? AND status = 'pending'",
        )
        .bind(random_value)
        .bind(session)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the minted NFT on a completed play (idempotent overwrite).
    pub async fn set_play_nft_mint(&self, session: &str, mint: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE plays SET nft_mint = ? WHERE session = ? AND status = 'completed'",
        )
        .bind(mint)
        .bind(session)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── NFTs and ownerships ────────────────────────────────────────────────────

    pub async fn get_nft(&self, mint: &str) -> Result<Option<Nft>, StoreError> {
        let row = sqlx::query("SELECT * FROM nfts WHERE mint_address = ?")
            .bind(mint)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| nft_from_row(&r)))
    }

    /// Create or refresh the NFT record. Redemption fields are only ever
    /// set by `mark_nft_redeemed`, so the upsert leaves them alone.
    pub async fn upsert_nft(&self, nft: &Nft) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO nfts (mint_address, game_id, prize_id, current_owner, is_redeemed)
             VALUES (?, ?, ?, ?, 0)
             ON CONFLICT (mint_address) DO UPDATE SET
                 current_owner = excluded.current_owner",
        )
        .bind(&nft.mint_address)
        .bind(nft.game_id as i64)
        .bind(nft.prize_id as i64)
        .bind(&nft.current_owner)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_nft_owner(&self, mint: &str, owner: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE nfts SET current_owner = ? WHERE mint_address = ?")
            .bind(owner)
            .bind(mint)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_nft_redeemed(
        &self,
        mint: &str,
        redeem_signature: &str,
        redeemed_at: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE nfts SET is_redeemed = 1, redeem_signature = ?, redeemed_at = ?
             WHERE mint_address = ? AND is_redeemed = 0",
        )
        .bind(redeem_signature)
        .bind(redeemed_at)
        .bind(mint)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_ownership(
        &self,
        mint: &str,
        owner: &str,
    ) -> Result<Option<NftOwnership>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM nft_ownerships WHERE mint_address = ? AND owner = ?",
        )
        .bind(mint)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| NftOwnership {
            mint_address: r.get("mint_address"),
            owner: r.get("owner"),
            quantity: r.get::<i64, _>("quantity") as u64,
        }))
    }

    /// Overwrite the holder balance for one `(mint, owner)` pair.
    pub async fn upsert_ownership(
        &self,
        mint: &str,
        owner: &str,
        quantity: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO nft_ownerships (mint_address, owner, quantity)
             VALUES (?, ?, ?)
             ON CONFLICT (mint_address, owner) DO UPDATE SET quantity = excluded.quantity",
        )
        .bind(mint)
        .bind(owner)
        .bind(quantity as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Move a 1-of-1 from one holder to another (sales).
    pub async fn transfer_ownership(
        &self,
        mint: &str,
        from: &str,
        to: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM nft_ownerships WHERE mint_address = ? AND owner = ?")
            .bind(mint)
            .bind(from)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO nft_ownerships (mint_address, owner, quantity)
             VALUES (?, ?, 1)
             ON CONFLICT (mint_address, owner) DO UPDATE SET quantity = 1",
        )
        .bind(mint)
        .bind(to)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // ─── Marketplace listings ───────────────────────────────────────────────────

    pub async fn get_listing(&self, mint: &str) -> Result<Option<MarketplaceListing>, StoreError> {
        let row = sqlx::query("SELECT * FROM marketplace_listings WHERE nft_mint = ?")
            .bind(mint)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| listing_from_row(&r)))
    }

    /// Open a listing. A duplicate delivery while the listing is active is
    /// a no-op; relisting after a terminal close opens it again.
    pub async fn open_listing(
        &self,
        mint: &str,
        seller: &str,
        price_tokens: u64,
        listed_at: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO marketplace_listings
             (nft_mint, seller, price_tokens, is_active, listed_at, closed_at, buyer)
             VALUES (?, ?, ?, 1, ?, NULL, NULL)
             ON CONFLICT (nft_mint) DO UPDATE SET
                 seller       = excluded.seller,
                 price_tokens = excluded.price_tokens,
                 is_active    = 1,
                 listed_at    = excluded.listed_at,
                 closed_at    = NULL,
                 buyer        = NULL
             WHERE marketplace_listings.is_active = 0",
        )
        .bind(mint)
        .bind(seller)
        .bind(price_tokens as i64)
        .bind(listed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Terminal close (cancel or sale), guarded by `is_active`.
    pub async fn close_listing(
        &self,
        mint: &str,
        buyer: Option<&str>,
        closed_at: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE marketplace_listings
             SET is_active = 0, closed_at = ?, buyer = ?
             WHERE nft_mint = ? AND is_active = 1",
        )
        .bind(closed_at)
        .bind(buyer)
        .bind(mint)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_listing_price(&self, mint: &str, price_tokens: u64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE marketplace_listings SET price_tokens = ?
             WHERE nft_mint = ? AND is_active = 1",
        )
        .bind(price_tokens as i64)
        .bind(mint)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Treasury audit log ─────────────────────────────────────────────────────

    /// Append a withdrawal record; duplicates (same signature + log index)
    /// are dropped.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_treasury_event(
        &self,
        signature: &str,
        log_index: u32,
        kind: &str,
        game_id: Option<u64>,
        amount: u64,
        destination: &str,
        occurred_at: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO treasury_events
             (signature, log_index, kind, game_id, amount, destination, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (signature, log_index) DO NOTHING",
        )
        .bind(signature)
        .bind(log_index as i64)
        .bind(kind)
        .bind(game_id.map(|v| v as i64))
        .bind(amount as i64)
        .bind(destination)
        .bind(occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ─── Row mapping ──────────────────────────────────────────────────────────────

fn game_from_row(r: &sqlx::sqlite::SqliteRow) -> Game {
    Game {
        game_id: r.get::<i64, _>("game_id") as u64,
        name: r.get("name"),
        description: r.get("description"),
        image_url: r.get("image_url"),
        token_mint: r.get("token_mint"),
        cost_usd_cents: r.get::<i64, _>("cost_usd_cents") as u64,
        treasury: r.get("treasury"),
        is_active: r.get::<i64, _>("is_active") != 0,
        total_plays: r.get::<i64, _>("total_plays") as u64,
    }
}

fn prize_from_row(r: &sqlx::sqlite::SqliteRow) -> Prize {
    Prize {
        game_id: r.get::<i64, _>("game_id") as u64,
        prize_id: r.get::<i64, _>("prize_id") as u64,
        prize_index: r.get::<i64, _>("prize_index") as u8,
        name: r.get("name"),
        tier: r.get("tier"),
        probability_bp: r.get::<i64, _>("probability_bp") as u16,
        supply_total: r.get::<i64, _>("supply_total") as u32,
        supply_remaining: r.get::<i64, _>("supply_remaining") as u32,
        metadata_uri: r.get("metadata_uri"),
    }
}

fn play_from_row(r: &sqlx::sqlite::SqliteRow) -> Play {
    Play {
        signature: r.get("signature"),
        session: r.get("session"),
        game_id: r.get::<i64, _>("game_id") as u64,
        user_wallet: r.get("user_wallet"),
        token_amount_paid: r.get::<i64, _>("token_amount_paid") as u64,
        status: PlayStatus::from_str(r.get::<String, _>("status").as_str())
            .unwrap_or(PlayStatus::Pending),
        prize_id: r.get::<Option<i64>, _>("prize_id").map(|v| v as u64),
        nft_mint: r.get("nft_mint"),
        random_value: r.get("random_value"),
        played_at: r.get("played_at"),
    }
}

fn nft_from_row(r: &sqlx::sqlite::SqliteRow) -> Nft {
    Nft {
        mint_address: r.get("mint_address"),
        game_id: r.get::<i64, _>("game_id") as u64,
        prize_id: r.get::<i64, _>("prize_id") as u64,
        current_owner: r.get("current_owner"),
        is_redeemed: r.get::<i64, _>("is_redeemed") != 0,
        redeem_signature: r.get("redeem_signature"),
        redeemed_at: r.get("redeemed_at"),
    }
}

fn listing_from_row(r: &sqlx::sqlite::SqliteRow) -> MarketplaceListing {
    MarketplaceListing {
        nft_mint: r.get("nft_mint"),
        seller: r.get("seller"),
        price_tokens: r.get::<i64, _>("price_tokens") as u64,
        is_active: r.get::<i64, _>("is_active") != 0,
        listed_at: r.get("listed_at"),
        closed_at: r.get("closed_at"),
        buyer: r.get("buyer"),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
