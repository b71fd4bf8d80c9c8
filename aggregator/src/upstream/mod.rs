//! HTTP client for the third-party stats API.
//!
//! Every call carries a deadline. Calls made as part of one fan-out share the
//! same deadline so the group as a whole is bounded.

pub mod payloads;
pub mod quota;

use crate::config::UpstreamConfig;
use crate::metrics_defs::{UPSTREAM_DURATION, UPSTREAM_REQUESTS};
use crate::{counter, histogram};
use payloads::{
    AccountData, CurrentMmr, Envelope, LiveMatch, MatchDetailData, MmrHistoryEntry, StoredMatch,
    StoredMmrEntry,
};
use quota::{QuotaSnapshot, QuotaTracker};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use std::fmt;
use tokio::time::{Instant, timeout_at};
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Account,
    StoredMatches,
    StoredMmrHistory,
    LiveMatches,
    MmrHistory,
    CurrentMmr,
    MatchDetail,
}

impl Endpoint {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Account => "account",
            Endpoint::StoredMatches => "stored_matches",
            Endpoint::StoredMmrHistory => "stored_mmr_history",
            Endpoint::LiveMatches => "matches",
            Endpoint::MmrHistory => "mmr_history",
            Endpoint::CurrentMmr => "mmr",
            Endpoint::MatchDetail => "match",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: Endpoint,
        status: StatusCode,
        body: String,
    },
    #[error("could not decode {endpoint} response: {source}")]
    Decode {
        endpoint: Endpoint,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} did not respond before the deadline")]
    Timeout(Endpoint),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl UpstreamError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, UpstreamError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    quota: QuotaTracker,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig, api_key: String) -> Result<Self, UpstreamError> {
        if config.base_url.cannot_be_a_base() {
            return Err(UpstreamError::InvalidUrl(config.base_url.to_string()));
        }
        // The per-call deadline bounds each request, not a client-wide timeout.
        let client = reqwest::Client::builder().build()?;

        Ok(UpstreamClient {
            client,
            base_url: config.base_url.clone(),
            api_key,
            quota: QuotaTracker::new(),
        })
    }

    pub fn quota(&self) -> QuotaSnapshot {
        self.quota.snapshot()
    }

    pub async fn account(
        &self,
        name: &str,
        tag: &str,
        deadline: Instant,
    ) -> Result<AccountData, UpstreamError> {
        self.get(
            Endpoint::Account,
            &["valorant", "v2", "account", name, tag],
            &[],
            deadline,
        )
        .await
    }

    pub async fn current_mmr(
        &self,
        region: &str,
        puuid: &str,
        deadline: Instant,
    ) -> Result<CurrentMmr, UpstreamError> {
        self.get(
            Endpoint::CurrentMmr,
            &["valorant", "v3", "by-puuid", "mmr", region, "pc", puuid],
            &[],
            deadline,
        )
        .await
    }

    /// Full competitive history kept by upstream, used once per player.
    pub async fn stored_matches(
        &self,
        region: &str,
        puuid: &str,
        deadline: Instant,
    ) -> Result<Vec<StoredMatch>, UpstreamError> {
        self.get(
            Endpoint::StoredMatches,
            &["valorant", "v1", "by-puuid", "stored-matches", region, puuid],
            &[("mode", "competitive")],
            deadline,
        )
        .await
    }

    pub async fn stored_mmr_history(
        &self,
        region: &str,
        puuid: &str,
        deadline: Instant,
    ) -> Result<Vec<StoredMmrEntry>, UpstreamError> {
        self.get(
            Endpoint::StoredMmrHistory,
            &[
                "valorant",
                "v1",
                "by-puuid",
                "stored-mmr-history",
                region,
                puuid,
            ],
            &[],
            deadline,
        )
        .await
    }

    /// The most recent matches with full rosters.
    pub async fn live_matches(
        &self,
        region: &str,
        puuid: &str,
        deadline: Instant,
    ) -> Result<Vec<LiveMatch>, UpstreamError> {
        self.get(
            Endpoint::LiveMatches,
            &["valorant", "v4", "by-puuid", "matches", region, "pc", puuid],
            &[],
            deadline,
        )
        .await
    }

    pub async fn mmr_history(
        &self,
        region: &str,
        puuid: &str,
        deadline: Instant,
    ) -> Result<Vec<MmrHistoryEntry>, UpstreamError> {
        self.get(
            Endpoint::MmrHistory,
            &["valorant", "v1", "by-puuid", "mmr-history", region, puuid],
            &[],
            deadline,
        )
        .await
    }

    pub async fn match_detail(
        &self,
        match_id: &str,
        deadline: Instant,
    ) -> Result<MatchDetailData, UpstreamError> {
        self.get(
            Endpoint::MatchDetail,
            &["valorant", "v2", "match", match_id],
            &[],
            deadline,
        )
        .await
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        segments: &[&str],
        query: &[(&str, &str)],
        deadline: Instant,
    ) -> Result<T, UpstreamError> {
        let url = self.url(segments, query)?;
        let started = std::time::Instant::now();
        let request = self
            .client
            .get(url)
            .header(AUTHORIZATION, &self.api_key)
            .header(ACCEPT, "application/json");

        let (status, body) = timeout_at(deadline, async {
            let response = request.send().await?;
            self.quota.observe(response.headers());
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        })
        .await
        .map_err(|_| UpstreamError::Timeout(endpoint))?
        .map_err(|err| transport_error(endpoint, err))?;

        histogram!(UPSTREAM_DURATION, "endpoint" => endpoint.as_str())
            .record(started.elapsed().as_secs_f64());
        counter!(
            UPSTREAM_REQUESTS,
            "endpoint" => endpoint.as_str(),
            "status" => status.as_str().to_owned()
        )
        .increment(1);

        // Non-success statuses are never retried here; callers decide.
        if !status.is_success() {
            tracing::debug!(%endpoint, %status, "Upstream request failed");
            return Err(UpstreamError::Status {
                endpoint,
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .map_err(|source| UpstreamError::Decode { endpoint, source })?;
        Ok(envelope.data)
    }
}

fn transport_error(endpoint: Endpoint, err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout(endpoint)
    } else {
        UpstreamError::Transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    async fn client_for(server: &MockServer) -> UpstreamClient {
        let config = testutils::upstream_config(&server.uri());
        UpstreamClient::new(&config, "HDEV-test".to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_account_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/valorant/v2/account/Ghost/EUW"))
            .and(header("Authorization", "HDEV-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(testutils::account_json("p-1", "Ghost", "EUW"))
                    .insert_header("X-Ratelimit-Remaining", "17")
                    .insert_header("X-Ratelimit-Limit", "30"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let account = client.account("Ghost", "EUW", deadline()).await.unwrap();
        assert_eq!(account.puuid, "p-1");
        assert_eq!(account.region, "eu");

        let quota = client.quota();
        assert_eq!(quota.remaining, 17);
        assert_eq!(quota.limit, 30);
    }

    #[tokio::test]
    async fn test_path_segments_are_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/valorant/v2/account/Ghost%20Rider/EU%2FW"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(testutils::account_json(
                    "p-2",
                    "Ghost Rider",
                    "EU/W",
                )),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let account = client
            .account("Ghost Rider", "EU/W", deadline())
            .await
            .unwrap();
        assert_eq!(account.name, "Ghost Rider");
    }

    #[tokio::test]
    async fn test_stored_matches_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/valorant/v1/by-puuid/stored-matches/eu/p-1"))
            .and(query_param("mode", "competitive"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": 200, "data": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let matches = client.stored_matches("eu", "p-1", deadline()).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_server_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.current_mmr("eu", "p-1", deadline()).await.unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::Status { endpoint: Endpoint::CurrentMmr, status, ref body }
                if status == StatusCode::SERVICE_UNAVAILABLE && body == "maintenance"
        ));
    }

    #[tokio::test]
    async fn test_not_found_and_decode_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/valorant/v2/account/Nobody/0000"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/valorant/v2/match/m-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"data\": 12}"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.account("Nobody", "0000", deadline()).await.unwrap_err();
        assert!(err.is_not_found());

        let err = client.match_detail("m-1", deadline()).await.unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::Decode {
                endpoint: Endpoint::MatchDetail,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(testutils::account_json("p-1", "Ghost", "EUW"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let deadline = Instant::now() + Duration::from_millis(100);
        let err = client.account("Ghost", "EUW", deadline).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout(Endpoint::Account)));
    }

    #[tokio::test]
    async fn test_client_timeout_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let err = client.get(server.uri()).send().await.unwrap_err();
        assert!(matches!(
            transport_error(Endpoint::Account, err),
            UpstreamError::Timeout(Endpoint::Account)
        ));
    }
}
