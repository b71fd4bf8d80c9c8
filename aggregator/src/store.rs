//! SQLite backed storage for players, matches, participations and rank history.

use crate::config::StoreConfig;
use crate::types::{Match, MatchPlayer, MatchSummary, MmrHistoryRecord, MmrSource, Player};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("could not prepare store directory: {0}")]
    Io(#[from] std::io::Error),
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS players (
    puuid TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    tag TEXT NOT NULL,
    region TEXT NOT NULL DEFAULT '',
    account_level INTEGER NOT NULL DEFAULT 0,
    card TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    current_tier INTEGER NOT NULL DEFAULT 0,
    current_tier_name TEXT NOT NULL DEFAULT '',
    current_rr INTEGER NOT NULL DEFAULT 0,
    is_partial INTEGER NOT NULL DEFAULT 0,
    last_fetch_at TEXT,
    matches_fetched_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_players_name_tag ON players (name COLLATE NOCASE, tag COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS matches (
    match_id TEXT PRIMARY KEY,
    map_id TEXT NOT NULL DEFAULT '',
    map_name TEXT NOT NULL DEFAULT '',
    mode TEXT NOT NULL DEFAULT '',
    started_at TEXT NOT NULL,
    season_id TEXT NOT NULL DEFAULT '',
    team_red_score INTEGER NOT NULL DEFAULT 0,
    team_blue_score INTEGER NOT NULL DEFAULT 0,
    region TEXT NOT NULL DEFAULT '',
    cluster TEXT NOT NULL DEFAULT '',
    version TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_matches_started_at ON matches (started_at);

CREATE TABLE IF NOT EXISTS match_players (
    match_id TEXT NOT NULL REFERENCES matches (match_id) ON DELETE CASCADE,
    puuid TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    tag TEXT NOT NULL DEFAULT '',
    tier INTEGER NOT NULL DEFAULT 0,
    tier_name TEXT NOT NULL DEFAULT '',
    kills INTEGER NOT NULL DEFAULT 0,
    deaths INTEGER NOT NULL DEFAULT 0,
    assists INTEGER NOT NULL DEFAULT 0,
    score INTEGER NOT NULL DEFAULT 0,
    damage_dealt INTEGER NOT NULL DEFAULT 0,
    damage_taken INTEGER NOT NULL DEFAULT 0,
    team TEXT NOT NULL DEFAULT '',
    has_won INTEGER NOT NULL DEFAULT 0,
    character_id TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (match_id, puuid)
);
CREATE INDEX IF NOT EXISTS idx_match_players_puuid ON match_players (puuid);

CREATE TABLE IF NOT EXISTS mmr_history (
    id TEXT PRIMARY KEY,
    match_id TEXT NOT NULL REFERENCES matches (match_id) ON DELETE CASCADE,
    puuid TEXT NOT NULL,
    tier INTEGER NOT NULL DEFAULT 0,
    tier_name TEXT NOT NULL DEFAULT '',
    ranking_in_tier INTEGER NOT NULL DEFAULT 0,
    mmr_change INTEGER NOT NULL DEFAULT 0,
    elo INTEGER NOT NULL DEFAULT 0,
    date TEXT NOT NULL,
    source TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_mmr_history_puuid ON mmr_history (puuid, match_id);
"#;

pub(crate) const PLAYER_COLUMNS: &str = "puuid, name, tag, region, account_level, card, title, current_tier, \
     current_tier_name, current_rr, is_partial, last_fetch_at, matches_fetched_at, created_at, updated_at";

const MATCH_COLUMNS: &str = "m.match_id, m.map_id, m.map_name, m.mode, m.started_at, m.season_id, \
     m.team_red_score, m.team_blue_score, m.region, m.cluster, m.version, m.source";

const MATCH_PLAYER_COLUMNS: &str = "match_id, puuid, name, tag, tier, tier_name, kills, deaths, \
     assists, score, damage_dealt, damage_taken, team, has_won, character_id";

const MMR_COLUMNS: &str = "id, match_id, puuid, tier, tier_name, ranking_in_tier, mmr_change, elo, \
     date, source, created_at";

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Store { pool };
        store.migrate().await?;
        tracing::info!(path = %config.path.display(), "Opened store");
        Ok(store)
    }

    /// A private in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Every pooled connection would get its own database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Store { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn player_by_puuid(&self, puuid: &str) -> Result<Option<Player>, StoreError> {
        let player = sqlx::query_as::<_, Player>(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE puuid = ?"
        ))
        .bind(puuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(player)
    }

    /// Case-insensitive lookup. When several rows share a name and tag, the most
    /// recently updated one wins.
    pub async fn player_by_name_tag(
        &self,
        name: &str,
        tag: &str,
    ) -> Result<Option<Player>, StoreError> {
        let player = sqlx::query_as::<_, Player>(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players \
             WHERE name = ? COLLATE NOCASE AND tag = ? COLLATE NOCASE \
             ORDER BY updated_at DESC LIMIT 1"
        ))
        .bind(name)
        .bind(tag)
        .fetch_optional(&self.pool)
        .await?;
        Ok(player)
    }

    /// Case-insensitive substring search over names and tags, ordered by name.
    pub async fn search_players(&self, query: &str, limit: u32) -> Result<Vec<Player>, StoreError> {
        let pattern = format!("%{}%", escape_like(query));
        let players = sqlx::query_as::<_, Player>(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players \
             WHERE name LIKE ? ESCAPE '\\' OR tag LIKE ? ESCAPE '\\' \
             ORDER BY name COLLATE NOCASE, tag COLLATE NOCASE LIMIT ?"
        ))
        .bind(pattern.as_str())
        .bind(pattern.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(players)
    }

    /// Returns false when the player no longer exists.
    pub async fn set_last_fetch_at(
        &self,
        puuid: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE players SET last_fetch_at = ? WHERE puuid = ?")
            .bind(at)
            .bind(puuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether the player's own stored history was imported. Every imported
    /// match carries a stored-history rank entry, and nothing else writes one, so
    /// rows written for someone else's match roster do not count.
    pub async fn has_stored_history(&self, puuid: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM mmr_history mh \
             JOIN match_players mp ON mp.match_id = mh.match_id AND mp.puuid = mh.puuid \
             WHERE mh.puuid = ? AND mh.source = ? LIMIT 1",
        )
        .bind(puuid)
        .bind(MmrSource::StoredMmrHistory.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// All stored matches of one player, newest first, each joined with the
    /// player's own stats and the most recently recorded rank change for it.
    pub async fn matches_for_player(&self, puuid: &str) -> Result<Vec<MatchSummary>, StoreError> {
        let matches = sqlx::query_as::<_, Match>(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches m \
             JOIN match_players mp ON mp.match_id = m.match_id \
             WHERE mp.puuid = ? ORDER BY m.started_at DESC"
        ))
        .bind(puuid)
        .fetch_all(&self.pool)
        .await?;

        let mut stats: HashMap<String, MatchPlayer> = sqlx::query_as::<_, MatchPlayer>(&format!(
            "SELECT {MATCH_PLAYER_COLUMNS} FROM match_players WHERE puuid = ?"
        ))
        .bind(puuid)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| (row.match_id.clone(), row))
        .collect();

        let records = sqlx::query_as::<_, MmrHistoryRecord>(&format!(
            "SELECT {MMR_COLUMNS} FROM mmr_history WHERE puuid = ? ORDER BY created_at, rowid"
        ))
        .bind(puuid)
        .fetch_all(&self.pool)
        .await?;
        let mut latest_mmr: HashMap<String, MmrHistoryRecord> = HashMap::new();
        for record in records {
            latest_mmr.insert(record.match_id.clone(), record);
        }

        let summaries = matches
            .into_iter()
            .filter_map(|match_info| {
                let stats = stats.remove(&match_info.match_id)?;
                let mmr = latest_mmr.remove(&match_info.match_id);
                Some(MatchSummary {
                    match_info,
                    stats,
                    mmr,
                })
            })
            .collect();
        Ok(summaries)
    }

    pub async fn match_by_id(&self, match_id: &str) -> Result<Option<Match>, StoreError> {
        let found = sqlx::query_as::<_, Match>(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches m WHERE m.match_id = ?"
        ))
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found)
    }

    /// Participations of one match ordered by team then score.
    pub async fn participations(&self, match_id: &str) -> Result<Vec<MatchPlayer>, StoreError> {
        let rows = sqlx::query_as::<_, MatchPlayer>(&format!(
            "SELECT {MATCH_PLAYER_COLUMNS} FROM match_players WHERE match_id = ? \
             ORDER BY team, score DESC, puuid"
        ))
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
