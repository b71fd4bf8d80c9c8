pub mod api;
pub mod config;
pub mod errors;
pub mod fetch_group;
pub mod freshness;
pub mod metrics_defs;
pub mod negative_cache;
pub mod orchestrator;
pub mod persister;
pub mod reconcile;
pub mod settle;
pub mod store;
pub mod types;
pub mod upstream;

#[cfg(test)]
mod testutils;

use crate::config::{Config, ValidationError};
use crate::errors::AggregatorError;
use crate::negative_cache::NegativeCache;
use crate::orchestrator::{
    Context, MatchDetailOrchestrator, MatchOrchestrator, PlayerOrchestrator,
};
use crate::persister::Persister;
use crate::settle::SettleQueue;
use crate::store::{Store, StoreError};
use crate::types::PlayerProfile;
use crate::upstream::quota::QuotaSnapshot;
use crate::upstream::{UpstreamClient, UpstreamError};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("invalid config: {0}")]
    Config(#[from] ValidationError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("upstream client error: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("api error: {0}")]
    Api(#[from] api::ApiError),
}

/// The assembled core. Cheap to clone; all clones share one store, one upstream
/// client and one settle queue.
#[derive(Clone)]
pub struct Aggregator {
    ctx: Arc<Context>,
    players: PlayerOrchestrator,
    matches: MatchOrchestrator,
    match_details: MatchDetailOrchestrator,
}

impl Aggregator {
    pub async fn new(config: &Config) -> Result<Self, StartupError> {
        config.validate()?;
        let api_key = config
            .upstream
            .resolve_api_key()
            .ok_or(ValidationError::MissingApiKey)?;

        let store = Store::open(&config.store).await?;
        let upstream = UpstreamClient::new(&config.upstream, api_key)?;
        Ok(Self::from_parts(store, upstream, config))
    }

    /// Must be called from within a tokio runtime, which runs the settle worker.
    pub fn from_parts(store: Store, upstream: UpstreamClient, config: &Config) -> Self {
        let ctx = Arc::new(Context {
            persister: Persister::new(store.pool().clone(), config.store.batch_size),
            settle: SettleQueue::spawn(store.clone(), config.cache.settle_delay()),
            negative_cache: NegativeCache::new(config.cache.negative_ttl()),
            cache: config.cache.clone(),
            upstream_timeout: config.upstream.timeout(),
            upstream,
            store,
        });

        Aggregator {
            players: PlayerOrchestrator::new(ctx.clone()),
            matches: MatchOrchestrator::new(ctx.clone()),
            match_details: MatchDetailOrchestrator::new(ctx.clone()),
            ctx,
        }
    }

    pub fn players(&self) -> &PlayerOrchestrator {
        &self.players
    }

    pub fn matches(&self) -> &MatchOrchestrator {
        &self.matches
    }

    pub fn match_details(&self) -> &MatchDetailOrchestrator {
        &self.match_details
    }

    pub fn quota(&self) -> QuotaSnapshot {
        self.ctx.upstream.quota()
    }

    pub async fn ready(&self) -> Result<(), StoreError> {
        self.ctx.store.ping().await
    }

    /// Resolves a player and their match history, then derives the profile
    /// aggregates from the stored matches.
    pub async fn player_profile(
        &self,
        name: &str,
        tag: &str,
        force_refresh: bool,
    ) -> Result<PlayerProfile, AggregatorError> {
        let player = self.players.get_player(name, tag, force_refresh).await?;
        let matches = self
            .matches
            .get_matches_for(&player.puuid, force_refresh)
            .await?;
        Ok(PlayerProfile::new(player, &matches))
    }
}

pub async fn run(config: Config) -> Result<(), StartupError> {
    let aggregator = Aggregator::new(&config).await?;
    tracing::info!(
        upstream = %config.upstream.base_url,
        store = %config.store.path.display(),
        "Aggregator started"
    );
    api::serve(&config.listener, aggregator).await?;
    Ok(())
}
