use super::{Context, not_found_as, required, within};
use crate::errors::AggregatorError;
use crate::fetch_group::FetchScope;
use crate::freshness::{self, Freshness};
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS};
use crate::counter;
use crate::types::{Player, PlayerRecord};
use crate::upstream::payloads::{AccountData, CurrentMmr};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Clone)]
pub struct PlayerOrchestrator {
    ctx: Arc<Context>,
}

impl PlayerOrchestrator {
    pub fn new(ctx: Arc<Context>) -> Self {
        PlayerOrchestrator { ctx }
    }

    pub async fn get_player(
        &self,
        name: &str,
        tag: &str,
        force_refresh: bool,
    ) -> Result<Player, AggregatorError> {
        let name = required(name, "name")?;
        let tag = required(tag, "tag")?;

        within(self.ctx.cache.request_timeout(), "get_player", async {
            match self.ctx.store.player_by_name_tag(name, tag).await? {
                Some(player) => self.serve_or_refresh(player, force_refresh).await,
                None => {
                    counter!(CACHE_MISS, "kind" => "player", "reason" => Freshness::Cold.as_str())
                        .increment(1);
                    if !force_refresh && self.ctx.negative_cache.contains(name, tag) {
                        return Err(AggregatorError::NotFound(format!("player {name}#{tag}")));
                    }
                    self.refresh_cold(name, tag).await
                }
            }
        })
        .await
    }

    /// Looks a known player up by id, refreshing it through its stored name and tag.
    pub async fn get_player_by_id(
        &self,
        puuid: &str,
        force_refresh: bool,
    ) -> Result<Player, AggregatorError> {
        let puuid = required(puuid, "puuid")?;

        within(self.ctx.cache.request_timeout(), "get_player_by_id", async {
            let player = self
                .ctx
                .store
                .player_by_puuid(puuid)
                .await?
                .ok_or_else(|| AggregatorError::NotFound(format!("player {puuid}")))?;
            self.serve_or_refresh(player, force_refresh).await
        })
        .await
    }

    /// Substring search over stored names and tags; never calls upstream.
    pub async fn search_suggestions(
        &self,
        query: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Player>, AggregatorError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let max = self.ctx.cache.max_search_limit;
        let limit = limit.filter(|l| *l > 0).map_or(max, |l| l.min(max));
        Ok(self.ctx.store.search_players(query, limit).await?)
    }

    async fn serve_or_refresh(
        &self,
        player: Player,
        force_refresh: bool,
    ) -> Result<Player, AggregatorError> {
        let freshness = freshness::evaluate(
            player.last_fetch_at,
            player.is_partial,
            force_refresh,
            self.ctx.cache.player_ttl(),
            Utc::now(),
        );
        if !freshness.needs_refresh() {
            counter!(CACHE_HIT, "kind" => "player").increment(1);
            return Ok(player);
        }

        counter!(CACHE_MISS, "kind" => "player", "reason" => freshness.as_str()).increment(1);
        tracing::debug!(player = %player, reason = freshness.as_str(), "Refreshing player");
        self.refresh_known(&player).await
    }

    // Without a known id the rank lookup has to wait for the account lookup.
    async fn refresh_cold(&self, name: &str, tag: &str) -> Result<Player, AggregatorError> {
        let scope = FetchScope::new("account", self.ctx.upstream_timeout);
        let account = scope
            .one(self.lookup_account(name, tag, scope.deadline()))
            .await?;
        let rank = scope
            .one(self.ctx.upstream.current_mmr(
                &account.region,
                &account.puuid,
                scope.deadline(),
            ))
            .await?;
        self.store_refresh(account, rank).await
    }

    async fn refresh_known(&self, player: &Player) -> Result<Player, AggregatorError> {
        let scope = FetchScope::new("player", self.ctx.upstream_timeout);
        let (account, rank) = scope
            .join(
                self.lookup_account(&player.name, &player.tag, scope.deadline()),
                self.ctx
                    .upstream
                    .current_mmr(&player.region, &player.puuid, scope.deadline()),
            )
            .await?;

        // The name now belongs to another account, or the account moved region.
        let rank = if account.puuid == player.puuid && account.region == player.region {
            rank
        } else {
            tracing::info!(
                player = %player,
                puuid = %account.puuid,
                "Account identity changed, fetching rank again"
            );
            scope
                .one(self.ctx.upstream.current_mmr(
                    &account.region,
                    &account.puuid,
                    scope.deadline(),
                ))
                .await?
        };
        self.store_refresh(account, rank).await
    }

    async fn lookup_account(
        &self,
        name: &str,
        tag: &str,
        deadline: Instant,
    ) -> Result<AccountData, AggregatorError> {
        match self.ctx.upstream.account(name, tag, deadline).await {
            Ok(account) => Ok(account),
            Err(err) if err.is_not_found() => {
                self.ctx.negative_cache.insert(name, tag);
                Err(not_found_as(err.into(), || format!("player {name}#{tag}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    // Identity and rank land in one write, so a stored player is never marked
    // complete without its rank.
    async fn store_refresh(
        &self,
        account: AccountData,
        rank: CurrentMmr,
    ) -> Result<Player, AggregatorError> {
        let record = PlayerRecord {
            puuid: account.puuid,
            name: account.name,
            tag: account.tag,
            region: account.region,
            account_level: account.account_level,
            card: account.card,
            title: account.title,
            current_tier: rank.current.tier.id,
            current_tier_name: rank.current.tier.name,
            current_rr: rank.current.rr,
        };
        let player = self.ctx.persister.upsert_player(&record).await?;
        self.ctx.negative_cache.remove(&player.name, &player.tag);
        self.ctx.settle.schedule(&player.puuid);
        tracing::debug!(player = %player, puuid = %player.puuid, "Refreshed player");
        Ok(player)
    }
}
