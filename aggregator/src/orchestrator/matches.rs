use super::{Context, required, within};
use crate::counter;
use crate::errors::AggregatorError;
use crate::fetch_group::FetchScope;
use crate::freshness;
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS};
use crate::persister::MatchStamp;
use crate::reconcile::{Target, UpstreamShape, reconcile};
use crate::types::{MatchSummary, Player};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct MatchOrchestrator {
    ctx: Arc<Context>,
}

impl MatchOrchestrator {
    pub fn new(ctx: Arc<Context>) -> Self {
        MatchOrchestrator { ctx }
    }

    /// A player's competitive history, newest first.
    ///
    /// The first call for a player pulls the complete stored history once. After
    /// that only the recent-match feed is polled, whenever the history is stale.
    /// Appearing in another player's match roster does not count as history.
    pub async fn get_matches_for(
        &self,
        puuid: &str,
        force_refresh: bool,
    ) -> Result<Vec<MatchSummary>, AggregatorError> {
        let puuid = required(puuid, "puuid")?;

        within(self.ctx.cache.request_timeout(), "get_matches", async {
            let player = self
                .ctx
                .store
                .player_by_puuid(puuid)
                .await?
                .ok_or_else(|| AggregatorError::NotFound(format!("player {puuid}")))?;
            let target = Target::from(&player);

            if !self.ctx.store.has_stored_history(puuid).await? {
                self.backfill(&player, &target).await?;
            }

            let freshness = freshness::evaluate(
                player.matches_fetched_at,
                player.is_partial,
                force_refresh,
                self.ctx.cache.match_ttl(),
                Utc::now(),
            );
            if freshness.needs_refresh() {
                counter!(CACHE_MISS, "kind" => "matches", "reason" => freshness.as_str())
                    .increment(1);
                self.refresh_recent(&player, &target).await?;
            } else {
                counter!(CACHE_HIT, "kind" => "matches").increment(1);
            }

            Ok(self.ctx.store.matches_for_player(puuid).await?)
        })
        .await
    }

    async fn backfill(&self, player: &Player, target: &Target) -> Result<(), AggregatorError> {
        let scope = FetchScope::new("stored_history", self.ctx.upstream_timeout);
        let upstream = &self.ctx.upstream;
        let (matches, rank) = scope
            .join(
                upstream.stored_matches(&player.region, &player.puuid, scope.deadline()),
                upstream.stored_mmr_history(&player.region, &player.puuid, scope.deadline()),
            )
            .await?;

        let batch = reconcile(UpstreamShape::BulkHistorical {
            matches: &matches,
            rank: &rank,
            target,
        });
        let summary = self.ctx.persister.persist(&batch, None).await?;
        tracing::info!(
            puuid = %player.puuid,
            fetched = matches.len(),
            stored = summary.matches,
            "Backfilled stored match history"
        );
        Ok(())
    }

    async fn refresh_recent(&self, player: &Player, target: &Target) -> Result<(), AggregatorError> {
        let scope = FetchScope::new("recent_matches", self.ctx.upstream_timeout);
        let upstream = &self.ctx.upstream;
        let (matches, rank) = scope
            .join(
                upstream.live_matches(&player.region, &player.puuid, scope.deadline()),
                upstream.mmr_history(&player.region, &player.puuid, scope.deadline()),
            )
            .await?;

        let batch = reconcile(UpstreamShape::LiveIncremental {
            matches: &matches,
            rank: &rank,
            target,
        });
        let stamp = MatchStamp {
            puuid: &player.puuid,
            at: Utc::now(),
        };
        let summary = self.ctx.persister.persist(&batch, Some(stamp)).await?;
        tracing::debug!(puuid = %player.puuid, ?summary, "Refreshed recent matches");
        Ok(())
    }
}
