use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Number of participation rows in a complete 5v5 match.
pub const FULL_ROSTER_SIZE: usize = 10;

/// Upstream response shape that produced a match row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MatchSource {
    #[serde(rename = "stored")]
    Stored,
    #[serde(rename = "v4")]
    V4,
    #[serde(rename = "v2")]
    V2,
}

impl MatchSource {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MatchSource::Stored => "stored",
            MatchSource::V4 => "v4",
            MatchSource::V2 => "v2",
        }
    }
}

impl TryFrom<String> for MatchSource {
    type Error = UnknownSource;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "stored" => Ok(MatchSource::Stored),
            "v4" => Ok(MatchSource::V4),
            "v2" => Ok(MatchSource::V2),
            _ => Err(UnknownSource(value)),
        }
    }
}

/// Upstream response shape that produced a rank history record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MmrSource {
    #[serde(rename = "stored-mmr-history")]
    StoredMmrHistory,
    #[serde(rename = "mmr-history")]
    MmrHistory,
    #[serde(rename = "live")]
    Live,
}

impl MmrSource {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MmrSource::StoredMmrHistory => "stored-mmr-history",
            MmrSource::MmrHistory => "mmr-history",
            MmrSource::Live => "live",
        }
    }
}

impl TryFrom<String> for MmrSource {
    type Error = UnknownSource;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "stored-mmr-history" => Ok(MmrSource::StoredMmrHistory),
            "mmr-history" => Ok(MmrSource::MmrHistory),
            "live" => Ok(MmrSource::Live),
            _ => Err(UnknownSource(value)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown source tag: {0}")]
pub struct UnknownSource(String);

/// A stored player row.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Player {
    pub puuid: String,
    pub name: String,
    pub tag: String,
    pub region: String,
    pub account_level: i32,
    pub card: String,
    pub title: String,
    pub current_tier: i32,
    pub current_tier_name: String,
    pub current_rr: i32,
    pub is_partial: bool,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub matches_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.tag)
    }
}

/// Player fields written by a refresh or a match detail backfill.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerRecord {
    pub puuid: String,
    pub name: String,
    pub tag: String,
    pub region: String,
    pub account_level: i32,
    pub card: String,
    pub title: String,
    pub current_tier: i32,
    pub current_tier_name: String,
    pub current_rr: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Match {
    pub match_id: String,
    pub map_id: String,
    pub map_name: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub season_id: String,
    pub team_red_score: i32,
    pub team_blue_score: i32,
    pub region: String,
    pub cluster: String,
    pub version: String,
    #[sqlx(try_from = "String")]
    pub source: MatchSource,
}

/// One player's participation in one match.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct MatchPlayer {
    pub match_id: String,
    pub puuid: String,
    pub name: String,
    pub tag: String,
    pub tier: i32,
    pub tier_name: String,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub score: i32,
    pub damage_dealt: i32,
    pub damage_taken: i32,
    pub team: String,
    pub has_won: bool,
    pub character_id: String,
}

/// A rank change produced by reconciliation, before the store assigns it an id.
#[derive(Clone, Debug, PartialEq)]
pub struct MmrEntry {
    pub match_id: String,
    pub puuid: String,
    pub tier: i32,
    pub tier_name: String,
    pub ranking_in_tier: i32,
    pub mmr_change: i32,
    pub elo: i32,
    pub date: DateTime<Utc>,
    pub source: MmrSource,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct MmrHistoryRecord {
    pub id: String,
    pub match_id: String,
    pub puuid: String,
    pub tier: i32,
    pub tier_name: String,
    pub ranking_in_tier: i32,
    pub mmr_change: i32,
    pub elo: i32,
    pub date: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub source: MmrSource,
    pub created_at: DateTime<Utc>,
}

/// A match from one player's point of view, joined with their latest rank change.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchSummary {
    #[serde(rename = "match")]
    pub match_info: Match,
    pub stats: MatchPlayer,
    pub mmr: Option<MmrHistoryRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchMetadata {
    #[serde(flatten)]
    pub match_info: Match,
    // Sum of both teams' round scores, not the literal round count.
    pub rounds_played: i32,
}

impl From<Match> for MatchMetadata {
    fn from(match_info: Match) -> Self {
        let rounds_played = match_info.team_red_score + match_info.team_blue_score;
        MatchMetadata {
            match_info,
            rounds_played,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchDetail {
    pub metadata: MatchMetadata,
    pub players: Vec<MatchPlayer>,
}

/// A player together with aggregates over their stored matches.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerProfile {
    #[serde(flatten)]
    pub player: Player,
    pub total_matches: usize,
    pub kd_ratio: f32,
    pub win_rate: f32,
}

impl PlayerProfile {
    pub fn new(player: Player, matches: &[MatchSummary]) -> Self {
        let (kills, deaths) = matches.iter().fold((0i64, 0i64), |(k, d), m| {
            (k + i64::from(m.stats.kills), d + i64::from(m.stats.deaths))
        });
        let wins = matches.iter().filter(|m| m.stats.has_won).count();

        PlayerProfile {
            player,
            total_matches: matches.len(),
            kd_ratio: kd_ratio(kills, deaths),
            win_rate: win_rate(wins, matches.len()),
        }
    }
}

pub fn kd_ratio(kills: i64, deaths: i64) -> f32 {
    if deaths == 0 {
        return kills as f32;
    }
    kills as f32 / deaths as f32
}

pub fn win_rate(wins: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    wins as f32 / total as f32
}
