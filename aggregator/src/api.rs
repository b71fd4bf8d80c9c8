use crate::Aggregator;
use crate::config::Listener as ListenerConfig;
use crate::errors::AggregatorError;
use crate::types::{MatchDetail, MatchSummary, Player, PlayerProfile};
use crate::upstream::quota::QuotaSnapshot;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub async fn serve(listener: &ListenerConfig, aggregator: Aggregator) -> Result<(), ApiError> {
    let addr = format!("{}:{}", listener.host, listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Listening");
    axum::serve(listener, router(aggregator)).await?;
    Ok(())
}

pub fn router(aggregator: Aggregator) -> Router {
    Router::new()
        .route("/accounts/{name}/{tag}", get(get_profile))
        .route("/players/{puuid}", get(get_player))
        .route("/players/{puuid}/matches", get(get_matches))
        .route("/matches/{match_id}", get(get_match))
        .route("/search", get(search))
        .route("/quota", get(quota))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(aggregator)
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

#[derive(Deserialize, Debug, Default)]
struct RefreshParams {
    #[serde(default)]
    refresh: bool,
}

#[derive(Deserialize, Debug)]
struct SearchParams {
    #[serde(default)]
    q: String,
    limit: Option<u32>,
}

async fn get_profile(
    State(aggregator): State<Aggregator>,
    Path((name, tag)): Path<(String, String)>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<PlayerProfile>, AggregatorError> {
    aggregator
        .player_profile(&name, &tag, params.refresh)
        .await
        .map(Json)
}

async fn get_player(
    State(aggregator): State<Aggregator>,
    Path(puuid): Path<String>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<Player>, AggregatorError> {
    aggregator
        .players()
        .get_player_by_id(&puuid, params.refresh)
        .await
        .map(Json)
}

async fn get_matches(
    State(aggregator): State<Aggregator>,
    Path(puuid): Path<String>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<Vec<MatchSummary>>, AggregatorError> {
    aggregator
        .matches()
        .get_matches_for(&puuid, params.refresh)
        .await
        .map(Json)
}

async fn get_match(
    State(aggregator): State<Aggregator>,
    Path(match_id): Path<String>,
) -> Result<Json<MatchDetail>, AggregatorError> {
    aggregator
        .match_details()
        .get_match(&match_id)
        .await
        .map(Json)
}

async fn search(
    State(aggregator): State<Aggregator>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Player>>, AggregatorError> {
    aggregator
        .players()
        .search_suggestions(&params.q, params.limit)
        .await
        .map(Json)
}

async fn quota(State(aggregator): State<Aggregator>) -> Json<QuotaSnapshot> {
    Json(aggregator.quota())
}

async fn health() -> &'static str {
    "ok"
}

async fn ready(State(aggregator): State<Aggregator>) -> Response {
    match aggregator.ready().await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "Store is not ready");
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable").into_response()
        }
    }
}

impl IntoResponse for AggregatorError {
    fn into_response(self) -> Response {
        let status = match self {
            AggregatorError::NotFound(_) => StatusCode::NOT_FOUND,
            AggregatorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = Json(ApiErrorResponse {
            error_message: self.to_string(),
        });

        (status, body).into_response()
    }
}
