//! Transactional, chunked upserts of reconciled batches.
//!
//! Every row of a batch is written inside one transaction, so a failure in any
//! chunk of any table leaves the store exactly as it was before the call.

use crate::histogram;
use crate::metrics_defs::PERSIST_ROWS;
use crate::reconcile::ReconciledBatch;
use crate::store::{PLAYER_COLUMNS, StoreError};
use crate::types::{Match, MatchPlayer, MmrEntry, Player, PlayerRecord};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Marks a player's match history as refreshed in the same transaction as the batch.
#[derive(Clone, Copy, Debug)]
pub struct MatchStamp<'a> {
    pub puuid: &'a str,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub players: usize,
    pub matches: usize,
    pub participations: usize,
    pub mmr_records: usize,
}

#[derive(Clone, Debug)]
pub struct Persister {
    pool: SqlitePool,
    batch_size: usize,
}

impl Persister {
    pub fn new(pool: SqlitePool, batch_size: usize) -> Self {
        Persister {
            pool,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn persist(
        &self,
        batch: &ReconciledBatch,
        stamp: Option<MatchStamp<'_>>,
    ) -> Result<PersistSummary, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for chunk in batch.players.chunks(self.batch_size) {
            upsert_identities(&mut tx, chunk, now).await?;
        }
        // Matches go first so participation and rank rows can reference them.
        for chunk in batch.matches.chunks(self.batch_size) {
            upsert_matches(&mut tx, chunk, now).await?;
        }
        for chunk in batch.participations.chunks(self.batch_size) {
            upsert_participations(&mut tx, chunk, now).await?;
        }
        for chunk in batch.mmr_records.chunks(self.batch_size) {
            append_mmr_records(&mut tx, chunk, now).await?;
        }
        if let Some(stamp) = stamp {
            sqlx::query("UPDATE players SET matches_fetched_at = ? WHERE puuid = ?")
                .bind(stamp.at)
                .bind(stamp.puuid)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let summary = PersistSummary {
            players: batch.players.len(),
            matches: batch.matches.len(),
            participations: batch.participations.len(),
            mmr_records: batch.mmr_records.len(),
        };
        histogram!(PERSIST_ROWS, "table" => "players").record(summary.players as f64);
        histogram!(PERSIST_ROWS, "table" => "matches").record(summary.matches as f64);
        histogram!(PERSIST_ROWS, "table" => "match_players").record(summary.participations as f64);
        histogram!(PERSIST_ROWS, "table" => "mmr_history").record(summary.mmr_records as f64);
        tracing::debug!(?summary, "Persisted batch");

        Ok(summary)
    }

    /// Writes a player's identity and rank together and clears the partial flag.
    /// The last-fetch stamp is left alone.
    pub async fn upsert_player(&self, record: &PlayerRecord) -> Result<Player, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO players (puuid, name, tag, region, account_level, card, title, \
                 current_tier, current_tier_name, current_rr, is_partial, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?) \
             ON CONFLICT (puuid) DO UPDATE SET \
                 name = excluded.name, tag = excluded.tag, region = excluded.region, \
                 account_level = excluded.account_level, card = excluded.card, \
                 title = excluded.title, current_tier = excluded.current_tier, \
                 current_tier_name = excluded.current_tier_name, \
                 current_rr = excluded.current_rr, is_partial = 0, \
                 updated_at = excluded.updated_at",
        )
        .bind(record.puuid.as_str())
        .bind(record.name.as_str())
        .bind(record.tag.as_str())
        .bind(record.region.as_str())
        .bind(record.account_level)
        .bind(record.card.as_str())
        .bind(record.title.as_str())
        .bind(record.current_tier)
        .bind(record.current_tier_name.as_str())
        .bind(record.current_rr)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let player = sqlx::query_as::<_, Player>(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE puuid = ?"
        ))
        .bind(record.puuid.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(player)
    }
}

// Backfilled identities never overwrite rank, partial or fetch state of a known player.
async fn upsert_identities(
    conn: &mut SqliteConnection,
    rows: &[PlayerRecord],
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "INSERT INTO players (puuid, name, tag, region, account_level, card, title, \
             current_tier, current_tier_name, current_rr, is_partial, created_at, updated_at) ",
    );
    qb.push_values(rows, |mut b, r| {
        b.push_bind(r.puuid.as_str())
            .push_bind(r.name.as_str())
            .push_bind(r.tag.as_str())
            .push_bind(r.region.as_str())
            .push_bind(r.account_level)
            .push_bind(r.card.as_str())
            .push_bind(r.title.as_str())
            .push_bind(r.current_tier)
            .push_bind(r.current_tier_name.as_str())
            .push_bind(r.current_rr)
            .push_bind(true)
            .push_bind(now)
            .push_bind(now);
    });
    qb.push(
        " ON CONFLICT (puuid) DO UPDATE SET \
             name = excluded.name, tag = excluded.tag, region = excluded.region, \
             account_level = excluded.account_level, card = excluded.card, \
             title = excluded.title, updated_at = excluded.updated_at",
    );
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

async fn upsert_matches(
    conn: &mut SqliteConnection,
    rows: &[Match],
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "INSERT INTO matches (match_id, map_id, map_name, mode, started_at, season_id, \
             team_red_score, team_blue_score, region, cluster, version, source, created_at, updated_at) ",
    );
    qb.push_values(rows, |mut b, m| {
        b.push_bind(m.match_id.as_str())
            .push_bind(m.map_id.as_str())
            .push_bind(m.map_name.as_str())
            .push_bind(m.mode.as_str())
            .push_bind(m.started_at)
            .push_bind(m.season_id.as_str())
            .push_bind(m.team_red_score)
            .push_bind(m.team_blue_score)
            .push_bind(m.region.as_str())
            .push_bind(m.cluster.as_str())
            .push_bind(m.version.as_str())
            .push_bind(m.source.as_str())
            .push_bind(now)
            .push_bind(now);
    });
    qb.push(
        " ON CONFLICT (match_id) DO UPDATE SET \
             map_id = excluded.map_id, map_name = excluded.map_name, mode = excluded.mode, \
             started_at = excluded.started_at, season_id = excluded.season_id, \
             team_red_score = excluded.team_red_score, team_blue_score = excluded.team_blue_score, \
             region = excluded.region, cluster = excluded.cluster, version = excluded.version, \
             source = excluded.source, updated_at = excluded.updated_at",
    );
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

async fn upsert_participations(
    conn: &mut SqliteConnection,
    rows: &[MatchPlayer],
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "INSERT INTO match_players (match_id, puuid, name, tag, tier, tier_name, kills, deaths, \
             assists, score, damage_dealt, damage_taken, team, has_won, character_id, created_at, updated_at) ",
    );
    qb.push_values(rows, |mut b, p| {
        b.push_bind(p.match_id.as_str())
            .push_bind(p.puuid.as_str())
            .push_bind(p.name.as_str())
            .push_bind(p.tag.as_str())
            .push_bind(p.tier)
            .push_bind(p.tier_name.as_str())
            .push_bind(p.kills)
            .push_bind(p.deaths)
            .push_bind(p.assists)
            .push_bind(p.score)
            .push_bind(p.damage_dealt)
            .push_bind(p.damage_taken)
            .push_bind(p.team.as_str())
            .push_bind(p.has_won)
            .push_bind(p.character_id.as_str())
            .push_bind(now)
            .push_bind(now);
    });
    qb.push(
        " ON CONFLICT (match_id, puuid) DO UPDATE SET \
             name = excluded.name, tag = excluded.tag, tier = excluded.tier, \
             tier_name = excluded.tier_name, kills = excluded.kills, deaths = excluded.deaths, \
             assists = excluded.assists, score = excluded.score, \
             damage_dealt = excluded.damage_dealt, damage_taken = excluded.damage_taken, \
             team = excluded.team, has_won = excluded.has_won, \
             character_id = excluded.character_id, updated_at = excluded.updated_at",
    );
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

// Rank history is append-only: every write gets a fresh id.
async fn append_mmr_records(
    conn: &mut SqliteConnection,
    rows: &[MmrEntry],
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let ids: Vec<String> = rows
        .iter()
        .map(|_| Uuid::new_v4().simple().to_string())
        .collect();

    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "INSERT INTO mmr_history (id, match_id, puuid, tier, tier_name, ranking_in_tier, \
             mmr_change, elo, date, source, created_at) ",
    );
    qb.push_values(ids.iter().zip(rows), |mut b, (id, r)| {
        b.push_bind(id.as_str())
            .push_bind(r.match_id.as_str())
            .push_bind(r.puuid.as_str())
            .push_bind(r.tier)
            .push_bind(r.tier_name.as_str())
            .push_bind(r.ranking_in_tier)
            .push_bind(r.mmr_change)
            .push_bind(r.elo)
            .push_bind(r.date)
            .push_bind(r.source.as_str())
            .push_bind(now);
    });
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::testutils;

    async fn count(store: &Store, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        let persister = Persister::new(store.pool().clone(), 2);

        let mut batch = ReconciledBatch {
            matches: (0..5).map(|i| testutils::match_row(&format!("m-{i}"))).collect(),
            participations: (0..5)
                .map(|i| testutils::participation_row(&format!("m-{i}"), "p-1", 10))
                .collect(),
            mmr_records: (0..5)
                .map(|i| testutils::mmr_entry(&format!("m-{i}"), "p-1"))
                .collect(),
            ..Default::default()
        };
        persister.persist(&batch, None).await.unwrap();

        batch.participations[3].kills = 27;
        batch.matches[3].team_red_score = 7;
        let summary = persister.persist(&batch, None).await.unwrap();
        assert_eq!(summary.matches, 5);

        assert_eq!(count(&store, "matches").await, 5);
        assert_eq!(count(&store, "match_players").await, 5);
        // Rank history appends on every pass
        assert_eq!(count(&store, "mmr_history").await, 10);

        let rows = store.participations("m-3").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kills, 27);
        let m = store.match_by_id("m-3").await.unwrap().unwrap();
        assert_eq!(m.team_red_score, 7);
    }

    #[tokio::test]
    async fn test_failed_chunk_rolls_back_everything() {
        let store = Store::in_memory().await.unwrap();
        let persister = Persister::new(store.pool().clone(), 10);

        let mut participations: Vec<_> = (0..100)
            .map(|i| testutils::participation_row(&format!("m-{}", i / 10), &format!("p-{i}"), 1))
            .collect();
        // Row 51 references a match that is not part of the batch
        participations[50].match_id = "missing".into();

        let batch = ReconciledBatch {
            matches: (0..10).map(|i| testutils::match_row(&format!("m-{i}"))).collect(),
            participations,
            ..Default::default()
        };

        let result = persister.persist(&batch, None).await;
        assert!(result.is_err());
        assert_eq!(count(&store, "matches").await, 0);
        assert_eq!(count(&store, "match_players").await, 0);
    }

    #[tokio::test]
    async fn test_identity_backfill_keeps_rank_state() {
        let store = Store::in_memory().await.unwrap();
        let persister = Persister::new(store.pool().clone(), 100);

        let mut known = testutils::player_record("p-1", "Ghost", "EUW");
        known.current_tier = 21;
        known.current_rr = 55;
        persister.upsert_player(&known).await.unwrap();
        let stamped = Utc::now();
        store.set_last_fetch_at("p-1", stamped).await.unwrap();

        let mut seen = testutils::player_record("p-1", "Ghost2", "EUW");
        seen.current_tier = 3;
        let stranger = testutils::player_record("p-2", "Phantom", "NA1");
        let batch = ReconciledBatch {
            players: vec![seen, stranger],
            ..Default::default()
        };
        persister.persist(&batch, None).await.unwrap();

        let player = store.player_by_puuid("p-1").await.unwrap().unwrap();
        assert_eq!(player.name, "Ghost2");
        assert_eq!(player.current_tier, 21);
        assert_eq!(player.current_rr, 55);
        assert!(!player.is_partial);
        assert!(player.last_fetch_at.is_some());

        let stranger = store.player_by_puuid("p-2").await.unwrap().unwrap();
        assert!(stranger.is_partial);
        assert!(stranger.last_fetch_at.is_none());
    }

    #[tokio::test]
    async fn test_match_stamp_is_written_with_batch() {
        let store = Store::in_memory().await.unwrap();
        let persister = Persister::new(store.pool().clone(), 100);
        persister
            .upsert_player(&testutils::player_record("p-1", "Ghost", "EUW"))
            .await
            .unwrap();

        let at = Utc::now();
        persister
            .persist(
                &ReconciledBatch::default(),
                Some(MatchStamp { puuid: "p-1", at }),
            )
            .await
            .unwrap();

        let player = store.player_by_puuid("p-1").await.unwrap().unwrap();
        assert!(player.matches_fetched_at.is_some());
        assert!(player.last_fetch_at.is_none());
    }
}
