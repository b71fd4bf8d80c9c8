use crate::Aggregator;
use crate::config::{CacheConfig, Config, UpstreamConfig};
use crate::persister::Persister;
use crate::reconcile::ReconciledBatch;
use crate::store::Store;
use crate::types::{Match, MatchPlayer, MatchSource, MmrEntry, MmrSource, PlayerRecord};
use crate::upstream::UpstreamClient;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const JETT_ID: &str = "add6443a-41bd-e414-f6ad-e58d267f4e95";

/// An aggregator wired to a mock upstream and an in-memory store.
pub struct TestHarness {
    pub server: MockServer,
    pub store: Store,
    pub aggregator: Aggregator,
}

impl TestHarness {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let config = Config {
            upstream: upstream_config(&server.uri()),
            cache: CacheConfig {
                settle_delay_secs: 0,
                max_search_limit: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let store = Store::in_memory().await.unwrap();
        let upstream = UpstreamClient::new(&config.upstream, "HDEV-test".to_string()).unwrap();
        let aggregator = Aggregator::from_parts(store.clone(), upstream, &config);
        TestHarness {
            server,
            store,
            aggregator,
        }
    }

    /// A fully refreshed player: tier 21, 42 RR, never stamped.
    pub async fn seed_player(&self, puuid: &str, name: &str, tag: &str) {
        Persister::new(self.store.pool().clone(), 100)
            .upsert_player(&player_record(puuid, name, tag))
            .await
            .unwrap();
    }

    /// A player only known as a match participant.
    pub async fn seed_partial_player(&self, puuid: &str, name: &str, tag: &str) {
        let batch = ReconciledBatch {
            players: vec![player_record(puuid, name, tag)],
            ..Default::default()
        };
        Persister::new(self.store.pool().clone(), 100)
            .persist(&batch, None)
            .await
            .unwrap();
    }
}

pub fn upstream_config(uri: &str) -> UpstreamConfig {
    UpstreamConfig {
        base_url: uri.parse().unwrap(),
        api_key: Some("HDEV-test".to_string()),
        timeout_secs: 5,
    }
}

pub fn envelope(data: Value) -> Value {
    json!({ "status": 200, "data": data })
}

pub async fn mount_account(server: &MockServer, puuid: &str, name: &str, tag: &str, hits: u64) {
    Mock::given(method("GET"))
        .and(path_regex(format!("(?i)^/valorant/v2/account/{name}/{tag}$")))
        .respond_with(ResponseTemplate::new(200).set_body_json(account_json(puuid, name, tag)))
        .expect(hits)
        .mount(server)
        .await;
}

pub async fn mount_current_mmr(server: &MockServer, region: &str, puuid: &str, hits: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/valorant/v3/by-puuid/mmr/{region}/pc/{puuid}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_mmr_json(21, 42)))
        .expect(hits)
        .mount(server)
        .await;
}

pub fn account_json(puuid: &str, name: &str, tag: &str) -> Value {
    envelope(json!({
        "puuid": puuid,
        "region": "eu",
        "account_level": 187,
        "name": name,
        "tag": tag,
        "card": "card-1",
        "title": "title-1",
        "platforms": ["PC"],
        "updated_at": "2024-05-01T12:00:00.000Z"
    }))
}

pub fn current_mmr_json(tier: i32, rr: i32) -> Value {
    envelope(json!({
        "account": { "puuid": "ignored" },
        "current": {
            "tier": { "id": tier, "name": "Ascendant 1" },
            "rr": rr,
            "last_change": 18,
            "elo": 1842
        }
    }))
}

pub fn player_record(puuid: &str, name: &str, tag: &str) -> PlayerRecord {
    PlayerRecord {
        puuid: puuid.to_string(),
        name: name.to_string(),
        tag: tag.to_string(),
        region: "eu".to_string(),
        account_level: 187,
        card: "card-1".to_string(),
        title: "title-1".to_string(),
        current_tier: 21,
        current_tier_name: "Ascendant 1".to_string(),
        current_rr: 42,
    }
}

// Ids end in a number, which orders their start times.
fn started_at(match_id: &str) -> DateTime<Utc> {
    let offset = match_id
        .rsplit('-')
        .next()
        .and_then(|n| n.parse::<i64>().ok())
        .unwrap_or(0);
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::hours(offset)
}

pub fn match_row(match_id: &str) -> Match {
    Match {
        match_id: match_id.to_string(),
        map_id: "2c9d57ec-4431-9c5e-2939-8f9ef6dd5cba".to_string(),
        map_name: "Bind".to_string(),
        mode: "competitive".to_string(),
        started_at: started_at(match_id),
        season_id: "season-1".to_string(),
        team_red_score: 13,
        team_blue_score: 11,
        region: "eu".to_string(),
        cluster: "Frankfurt".to_string(),
        version: "release-08.07".to_string(),
        source: MatchSource::Stored,
    }
}

pub fn participation_row(match_id: &str, puuid: &str, kills: i32) -> MatchPlayer {
    MatchPlayer {
        match_id: match_id.to_string(),
        puuid: puuid.to_string(),
        name: "Ghost".to_string(),
        tag: "EUW".to_string(),
        tier: 21,
        tier_name: "Ascendant 1".to_string(),
        kills,
        deaths: 12,
        assists: 4,
        score: 4200,
        damage_dealt: 3100,
        damage_taken: 2700,
        team: "Red".to_string(),
        has_won: true,
        character_id: JETT_ID.to_string(),
    }
}

pub fn mmr_entry(match_id: &str, puuid: &str) -> MmrEntry {
    MmrEntry {
        match_id: match_id.to_string(),
        puuid: puuid.to_string(),
        tier: 21,
        tier_name: "Ascendant 1".to_string(),
        ranking_in_tier: 42,
        mmr_change: 18,
        elo: 1842,
        date: started_at(match_id),
        source: MmrSource::StoredMmrHistory,
    }
}

pub fn stored_match_json(match_id: &str, team: &str, red: i32, blue: i32) -> Value {
    json!({
        "meta": {
            "id": match_id,
            "map": { "id": "2c9d57ec-4431-9c5e-2939-8f9ef6dd5cba", "name": "Bind" },
            "version": "release-08.07",
            "mode": "Competitive",
            "started_at": started_at(match_id),
            "season": { "id": "season-1", "short": "e8a3" },
            "region": "eu",
            "cluster": "Frankfurt"
        },
        "stats": {
            "puuid": "ignored",
            "team": team,
            "level": 187,
            "character": { "id": JETT_ID, "name": "Jett" },
            "tier": 21,
            "score": 4200,
            "kills": 18,
            "deaths": 12,
            "assists": 4,
            "shots": { "head": 20, "body": 50, "leg": 3 },
            "damage": { "made": 3100, "received": 2700 }
        },
        "teams": { "red": red, "blue": blue }
    })
}

pub fn stored_mmr_json(match_id: &str, change: i32) -> Value {
    json!({
        "match_id": match_id,
        "tier": { "id": 21, "name": "Ascendant 1" },
        "map": { "id": "2c9d57ec-4431-9c5e-2939-8f9ef6dd5cba", "name": "Bind" },
        "season": { "id": "season-1", "short": "e8a3" },
        "ranking_in_tier": 42,
        "last_mmr_change": change,
        "elo": 1842,
        "date": started_at(match_id)
    })
}

pub fn live_match_json(match_id: &str, puuid: &str, team: &str, red: i32, blue: i32) -> Value {
    let opponent = if team.eq_ignore_ascii_case("red") { "Blue" } else { "Red" };
    json!({
        "metadata": {
            "match_id": match_id,
            "map": { "id": "2c9d57ec-4431-9c5e-2939-8f9ef6dd5cba", "name": "Bind" },
            "game_version": "release-08.07",
            "game_length_in_ms": 2_100_000,
            "started_at": started_at(match_id),
            "is_completed": true,
            "queue": { "id": "competitive", "name": "Competitive" },
            "season": { "id": "season-1", "short": "e8a3" },
            "region": "eu",
            "cluster": "Frankfurt"
        },
        "players": [
            {
                "puuid": puuid,
                "name": "Ghost",
                "tag": "EUW",
                "team_id": team,
                "agent": { "id": JETT_ID, "name": "Jett" },
                "stats": {
                    "score": 5100,
                    "kills": 20,
                    "deaths": 11,
                    "assists": 6,
                    "damage": { "dealt": 3500, "received": 2400 }
                },
                "tier": { "id": 21, "name": "Ascendant 1" }
            },
            {
                "puuid": "p-opponent",
                "name": "Phantom",
                "tag": "NA1",
                "team_id": opponent,
                "agent": { "id": "569fdd95-4d10-43ab-ca70-79becc718b46", "name": "Sage" },
                "stats": {
                    "score": 3000,
                    "kills": 11,
                    "deaths": 17,
                    "assists": 9,
                    "damage": { "dealt": 2100, "received": 3300 }
                },
                "tier": { "id": 20, "name": "Diamond 3" }
            }
        ],
        "teams": [
            { "team_id": "Red", "rounds": { "won": red, "lost": blue }, "won": red > blue },
            { "team_id": "Blue", "rounds": { "won": blue, "lost": red }, "won": blue > red }
        ]
    })
}

pub fn mmr_history_json(match_id: &str, change: i32) -> Value {
    json!({
        "match_id": match_id,
        "currenttier": 21,
        "currenttierpatched": "Ascendant 1",
        "ranking_in_tier": 42,
        "mmr_change_to_last_game": change,
        "elo": 1842,
        "map": { "name": "Bind", "id": "2c9d57ec-4431-9c5e-2939-8f9ef6dd5cba" },
        "date": "Wednesday, May 1, 2024 12:00 PM"
    })
}

/// Ten participants, `p-0` to `p-4` on Red and `p-5` to `p-9` on Blue.
pub fn match_detail_json(match_id: &str, red: i32, blue: i32) -> Value {
    let players: Vec<Value> = (0..10)
        .map(|i| {
            json!({
                "puuid": format!("p-{i}"),
                "name": format!("Player{i}"),
                "tag": "EUW",
                "team": if i < 5 { "Red" } else { "Blue" },
                "level": 100 + i,
                "character": "Jett",
                "currenttier": 15,
                "currenttier_patched": "Gold 1",
                "player_card": "card-1",
                "player_title": "title-1",
                "stats": { "score": 3000 + i * 100, "kills": 10 + i, "deaths": 12, "assists": 3 },
                "damage_made": 2500,
                "damage_received": 2600
            })
        })
        .collect();

    json!({
        "metadata": {
            "matchid": match_id,
            "map": "Bind",
            "game_version": "release-08.07",
            "game_start": 1_700_000_000,
            "rounds_played": red + blue,
            "mode": "Competitive",
            "season_id": "season-1",
            "region": "eu",
            "cluster": "Frankfurt"
        },
        "players": { "all_players": players },
        "teams": {
            "red": { "has_won": red > blue, "rounds_won": red, "rounds_lost": blue },
            "blue": { "has_won": blue > red, "rounds_won": blue, "rounds_lost": red }
        }
    })
}
