//! Wire shapes of the upstream stats API. Only the fields the reconciler reads
//! are modelled; everything else is ignored on decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Every upstream payload is wrapped in `{"status": ..., "data": ...}`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

// Upstream sends `null` for many strings and numbers it has no value for.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct NamedRef {
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SeasonRef {
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct TierRef {
    #[serde(default, deserialize_with = "nullable")]
    pub id: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
}

// Account

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AccountData {
    pub puuid: String,
    pub region: String,
    #[serde(default, deserialize_with = "nullable")]
    pub account_level: i32,
    pub name: String,
    pub tag: String,
    #[serde(default, deserialize_with = "nullable")]
    pub card: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
}

// Current rank

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CurrentMmr {
    pub current: CurrentRank,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CurrentRank {
    #[serde(default)]
    pub tier: TierRef,
    #[serde(default, deserialize_with = "nullable")]
    pub rr: i32,
}

// Bulk historical: stored matches and stored rank history

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StoredMatch {
    pub meta: StoredMatchMeta,
    pub stats: StoredMatchStats,
    #[serde(default)]
    pub teams: StoredMatchTeams,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StoredMatchMeta {
    pub id: String,
    #[serde(default)]
    pub map: NamedRef,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub season: SeasonRef,
    #[serde(default, deserialize_with = "nullable")]
    pub region: String,
    #[serde(default, deserialize_with = "nullable")]
    pub cluster: String,
    #[serde(default, deserialize_with = "nullable")]
    pub version: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StoredMatchStats {
    #[serde(default, deserialize_with = "nullable")]
    pub tier: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub kills: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub deaths: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub assists: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub score: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub team: String,
    #[serde(default)]
    pub character: NamedRef,
    #[serde(default)]
    pub damage: StoredDamage,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct StoredDamage {
    #[serde(default, deserialize_with = "nullable")]
    pub made: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub received: i32,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct StoredMatchTeams {
    #[serde(default, deserialize_with = "nullable")]
    pub red: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub blue: i32,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StoredMmrEntry {
    pub match_id: String,
    #[serde(default)]
    pub tier: TierRef,
    #[serde(default, deserialize_with = "nullable")]
    pub ranking_in_tier: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub last_mmr_change: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub elo: i32,
    pub date: DateTime<Utc>,
}

// Live incremental: recent matches and recent rank history

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LiveMatch {
    pub metadata: LiveMatchMetadata,
    #[serde(default)]
    pub players: Vec<LivePlayer>,
    #[serde(default)]
    pub teams: Vec<LiveTeam>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LiveMatchMetadata {
    pub match_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub region: String,
    #[serde(default, deserialize_with = "nullable")]
    pub cluster: String,
    #[serde(default)]
    pub map: NamedRef,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub season: SeasonRef,
    #[serde(default, deserialize_with = "nullable")]
    pub game_version: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LivePlayer {
    pub puuid: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tag: String,
    #[serde(default, deserialize_with = "nullable")]
    pub team_id: String,
    #[serde(default)]
    pub agent: NamedRef,
    #[serde(default)]
    pub stats: LivePlayerStats,
    #[serde(default)]
    pub tier: TierRef,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct LivePlayerStats {
    #[serde(default, deserialize_with = "nullable")]
    pub score: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub kills: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub deaths: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub assists: i32,
    #[serde(default)]
    pub damage: LiveDamage,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct LiveDamage {
    #[serde(default, deserialize_with = "nullable")]
    pub dealt: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub received: i32,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LiveTeam {
    pub team_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub won: bool,
    #[serde(default)]
    pub rounds: LiveRounds,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct LiveRounds {
    #[serde(default, deserialize_with = "nullable")]
    pub won: i32,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MmrHistoryEntry {
    pub match_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub currenttier: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub currenttierpatched: String,
    #[serde(default, deserialize_with = "nullable")]
    pub ranking_in_tier: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub mmr_change_to_last_game: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub elo: i32,
}

// Single match detail

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MatchDetailData {
    pub metadata: DetailMetadata,
    #[serde(default)]
    pub players: DetailPlayers,
    #[serde(default)]
    pub teams: DetailTeams,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DetailMetadata {
    pub matchid: String,
    #[serde(default, deserialize_with = "nullable")]
    pub map: String,
    #[serde(default, deserialize_with = "nullable")]
    pub game_version: String,
    #[serde(default, deserialize_with = "nullable")]
    pub region: String,
    #[serde(default, deserialize_with = "nullable")]
    pub cluster: String,
    #[serde(default, deserialize_with = "nullable")]
    pub mode: String,
    #[serde(default, deserialize_with = "nullable")]
    pub season_id: String,
    /// Unix seconds.
    #[serde(default, deserialize_with = "nullable")]
    pub game_start: i64,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct DetailPlayers {
    #[serde(default)]
    pub all_players: Vec<DetailPlayer>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DetailPlayer {
    pub puuid: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tag: String,
    #[serde(default, deserialize_with = "nullable")]
    pub team: String,
    #[serde(default, deserialize_with = "nullable")]
    pub level: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub character: String,
    #[serde(default, deserialize_with = "nullable")]
    pub currenttier: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub currenttier_patched: String,
    #[serde(default, deserialize_with = "nullable")]
    pub player_card: String,
    #[serde(default, deserialize_with = "nullable")]
    pub player_title: String,
    #[serde(default)]
    pub stats: DetailStats,
    #[serde(default, deserialize_with = "nullable")]
    pub damage_made: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub damage_received: i32,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct DetailStats {
    #[serde(default, deserialize_with = "nullable")]
    pub score: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub kills: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub deaths: i32,
    #[serde(default, deserialize_with = "nullable")]
    pub assists: i32,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct DetailTeams {
    #[serde(default)]
    pub red: DetailTeam,
    #[serde(default)]
    pub blue: DetailTeam,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct DetailTeam {
    #[serde(default, deserialize_with = "nullable")]
    pub rounds_won: i32,
}
