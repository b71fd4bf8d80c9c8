//! Maps the three upstream response shapes onto canonical rows.
//!
//! Bulk historical and live incremental payloads only describe the target
//! player's side of each match, so they need the target's identity to build
//! participation rows. Match detail payloads carry all ten participants.

pub mod reference;

use crate::types::{
    Match, MatchPlayer, MatchSource, MmrEntry, MmrSource, Player, PlayerRecord,
};
use crate::upstream::payloads::{
    LiveMatch, LiveTeam, MatchDetailData, MmrHistoryEntry, StoredMatch, StoredMmrEntry,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

const COMPETITIVE: &str = "competitive";

/// The player whose match history is being reconciled.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub puuid: String,
    pub name: String,
    pub tag: String,
}

impl From<&Player> for Target {
    fn from(player: &Player) -> Self {
        Target {
            puuid: player.puuid.clone(),
            name: player.name.clone(),
            tag: player.tag.clone(),
        }
    }
}

pub enum UpstreamShape<'a> {
    BulkHistorical {
        matches: &'a [StoredMatch],
        rank: &'a [StoredMmrEntry],
        target: &'a Target,
    },
    LiveIncremental {
        matches: &'a [LiveMatch],
        rank: &'a [MmrHistoryEntry],
        target: &'a Target,
    },
    MatchDetail(&'a MatchDetailData),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconciledBatch {
    /// Identities seen as match participants, written without touching rank state.
    pub players: Vec<PlayerRecord>,
    pub matches: Vec<Match>,
    pub participations: Vec<MatchPlayer>,
    pub mmr_records: Vec<MmrEntry>,
}

pub fn reconcile(shape: UpstreamShape<'_>) -> ReconciledBatch {
    match shape {
        UpstreamShape::BulkHistorical {
            matches,
            rank,
            target,
        } => reconcile_bulk(matches, rank, target),
        UpstreamShape::LiveIncremental {
            matches,
            rank,
            target,
        } => reconcile_live(matches, rank, target),
        UpstreamShape::MatchDetail(detail) => reconcile_detail(detail),
    }
}

/// A team wins when its letter matches the side with strictly more rounds.
fn team_won(team: &str, red: i32, blue: i32) -> bool {
    if team.eq_ignore_ascii_case("red") {
        red > blue
    } else if team.eq_ignore_ascii_case("blue") {
        blue > red
    } else {
        false
    }
}

fn reconcile_bulk(
    matches: &[StoredMatch],
    rank: &[StoredMmrEntry],
    target: &Target,
) -> ReconciledBatch {
    let rank_by_match: HashMap<&str, &StoredMmrEntry> = rank
        .iter()
        .map(|entry| (entry.match_id.as_str(), entry))
        .collect();

    let mut batch = ReconciledBatch::default();
    for stored in matches {
        let meta = &stored.meta;
        let Some(mmr) = rank_by_match.get(meta.id.as_str()) else {
            tracing::trace!(match_id = %meta.id, "No rank history for stored match, skipping");
            continue;
        };
        let (red, blue) = (stored.teams.red, stored.teams.blue);

        batch.matches.push(Match {
            match_id: meta.id.clone(),
            map_id: meta.map.id.clone(),
            map_name: meta.map.name.clone(),
            mode: COMPETITIVE.to_string(),
            started_at: meta.started_at,
            season_id: meta.season.id.clone(),
            team_red_score: red,
            team_blue_score: blue,
            region: meta.region.clone(),
            cluster: meta.cluster.clone(),
            version: meta.version.clone(),
            source: MatchSource::Stored,
        });

        let stats = &stored.stats;
        batch.participations.push(MatchPlayer {
            match_id: meta.id.clone(),
            puuid: target.puuid.clone(),
            name: target.name.clone(),
            tag: target.tag.clone(),
            tier: mmr.tier.id,
            tier_name: mmr.tier.name.clone(),
            kills: stats.kills,
            deaths: stats.deaths,
            assists: stats.assists,
            score: stats.score,
            damage_dealt: stats.damage.made,
            damage_taken: stats.damage.received,
            team: stats.team.clone(),
            has_won: team_won(&stats.team, red, blue),
            character_id: stats.character.id.clone(),
        });

        batch.mmr_records.push(MmrEntry {
            match_id: meta.id.clone(),
            puuid: target.puuid.clone(),
            tier: mmr.tier.id,
            tier_name: mmr.tier.name.clone(),
            ranking_in_tier: mmr.ranking_in_tier,
            mmr_change: mmr.last_mmr_change,
            elo: mmr.elo,
            date: mmr.date,
            source: MmrSource::StoredMmrHistory,
        });
    }
    batch
}

struct TeamOutcome {
    won: bool,
    rounds: i32,
}

fn team_outcomes(teams: &[LiveTeam]) -> HashMap<String, TeamOutcome> {
    teams
        .iter()
        .map(|team| {
            (
                team.team_id.to_ascii_lowercase(),
                TeamOutcome {
                    won: team.won,
                    rounds: team.rounds.won,
                },
            )
        })
        .collect()
}

fn reconcile_live(
    matches: &[LiveMatch],
    rank: &[MmrHistoryEntry],
    target: &Target,
) -> ReconciledBatch {
    let rank_by_match: HashMap<&str, &MmrHistoryEntry> = rank
        .iter()
        .map(|entry| (entry.match_id.as_str(), entry))
        .collect();

    let mut batch = ReconciledBatch::default();
    for live in matches {
        let meta = &live.metadata;
        let Some(mmr) = rank_by_match.get(meta.match_id.as_str()) else {
            tracing::trace!(match_id = %meta.match_id, "No rank history for live match, skipping");
            continue;
        };
        let Some(own) = live.players.iter().find(|p| p.puuid == target.puuid) else {
            tracing::debug!(
                match_id = %meta.match_id,
                puuid = %target.puuid,
                "Target player missing from live match roster, skipping"
            );
            continue;
        };

        let outcomes = team_outcomes(&live.teams);
        let rounds = |team: &str| outcomes.get(team).map_or(0, |o| o.rounds);
        let team_key = own.team_id.to_ascii_lowercase();

        batch.matches.push(Match {
            match_id: meta.match_id.clone(),
            map_id: meta.map.id.clone(),
            map_name: meta.map.name.clone(),
            mode: COMPETITIVE.to_string(),
            started_at: meta.started_at,
            season_id: meta.season.id.clone(),
            team_red_score: rounds("red"),
            team_blue_score: rounds("blue"),
            region: meta.region.clone(),
            cluster: meta.cluster.clone(),
            version: meta.game_version.clone(),
            source: MatchSource::V4,
        });

        batch.participations.push(MatchPlayer {
            match_id: meta.match_id.clone(),
            puuid: target.puuid.clone(),
            name: target.name.clone(),
            tag: target.tag.clone(),
            tier: mmr.currenttier,
            tier_name: mmr.currenttierpatched.clone(),
            kills: own.stats.kills,
            deaths: own.stats.deaths,
            assists: own.stats.assists,
            score: own.stats.score,
            damage_dealt: own.stats.damage.dealt,
            damage_taken: own.stats.damage.received,
            team: own.team_id.clone(),
            has_won: outcomes.get(&team_key).is_some_and(|o| o.won),
            character_id: own.agent.id.clone(),
        });

        batch.mmr_records.push(MmrEntry {
            match_id: meta.match_id.clone(),
            puuid: target.puuid.clone(),
            tier: mmr.currenttier,
            tier_name: mmr.currenttierpatched.clone(),
            ranking_in_tier: mmr.ranking_in_tier,
            mmr_change: mmr.mmr_change_to_last_game,
            elo: mmr.elo,
            date: meta.started_at,
            source: MmrSource::MmrHistory,
        });
    }
    batch
}

fn reconcile_detail(detail: &MatchDetailData) -> ReconciledBatch {
    let meta = &detail.metadata;
    let red = detail.teams.red.rounds_won;
    let blue = detail.teams.blue.rounds_won;
    let started_at = DateTime::<Utc>::from_timestamp(meta.game_start, 0).unwrap_or_default();

    let mut batch = ReconciledBatch::default();
    batch.matches.push(Match {
        match_id: meta.matchid.clone(),
        map_id: reference::map_id(&meta.map).unwrap_or_default().to_string(),
        map_name: meta.map.clone(),
        mode: meta.mode.clone(),
        started_at,
        season_id: meta.season_id.clone(),
        team_red_score: red,
        team_blue_score: blue,
        region: meta.region.clone(),
        cluster: meta.cluster.clone(),
        version: meta.game_version.clone(),
        source: MatchSource::V2,
    });

    for player in &detail.players.all_players {
        batch.players.push(PlayerRecord {
            puuid: player.puuid.clone(),
            name: player.name.clone(),
            tag: player.tag.clone(),
            region: meta.region.clone(),
            account_level: player.level,
            card: player.player_card.clone(),
            title: player.player_title.clone(),
            current_tier: player.currenttier,
            current_tier_name: player.currenttier_patched.clone(),
            current_rr: 0,
        });

        batch.participations.push(MatchPlayer {
            match_id: meta.matchid.clone(),
            puuid: player.puuid.clone(),
            name: player.name.clone(),
            tag: player.tag.clone(),
            tier: player.currenttier,
            tier_name: player.currenttier_patched.clone(),
            kills: player.stats.kills,
            deaths: player.stats.deaths,
            assists: player.stats.assists,
            score: player.stats.score,
            damage_dealt: player.damage_made,
            damage_taken: player.damage_received,
            team: player.team.clone(),
            has_won: team_won(&player.team, red, blue),
            character_id: reference::agent_id(&player.character)
                .unwrap_or_default()
                .to_string(),
        });
    }
    batch
}
