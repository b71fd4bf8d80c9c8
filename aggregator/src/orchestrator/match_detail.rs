use super::{Context, not_found_as, required, within};
use crate::counter;
use crate::errors::AggregatorError;
use crate::fetch_group::FetchScope;
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS};
use crate::reconcile::{UpstreamShape, reconcile};
use crate::types::{FULL_ROSTER_SIZE, MatchDetail};
use std::sync::Arc;

#[derive(Clone)]
pub struct MatchDetailOrchestrator {
    ctx: Arc<Context>,
}

impl MatchDetailOrchestrator {
    pub fn new(ctx: Arc<Context>) -> Self {
        MatchDetailOrchestrator { ctx }
    }

    /// Match metadata with the full roster. Matches stored from a player's own
    /// history only carry that player, so they are completed from upstream once.
    pub async fn get_match(&self, match_id: &str) -> Result<MatchDetail, AggregatorError> {
        let match_id = required(match_id, "match id")?;

        within(self.ctx.cache.request_timeout(), "get_match", async {
            let mut players = self.ctx.store.participations(match_id).await?;
            if players.len() == FULL_ROSTER_SIZE {
                counter!(CACHE_HIT, "kind" => "match").increment(1);
            } else {
                counter!(CACHE_MISS, "kind" => "match", "reason" => "roster").increment(1);
                self.complete_roster(match_id).await?;
                players = self.ctx.store.participations(match_id).await?;
                if players.len() != FULL_ROSTER_SIZE {
                    tracing::warn!(
                        match_id,
                        players = players.len(),
                        "Match roster incomplete after refetch"
                    );
                }
            }

            let match_info = self
                .ctx
                .store
                .match_by_id(match_id)
                .await?
                .ok_or_else(|| AggregatorError::NotFound(format!("match {match_id}")))?;
            Ok(MatchDetail {
                metadata: match_info.into(),
                players,
            })
        })
        .await
    }

    async fn complete_roster(&self, match_id: &str) -> Result<(), AggregatorError> {
        let scope = FetchScope::new("match_detail", self.ctx.upstream_timeout);
        let detail = scope
            .one(self.ctx.upstream.match_detail(match_id, scope.deadline()))
            .await
            .map_err(|err| not_found_as(err, || format!("match {match_id}")))?;

        let batch = reconcile(UpstreamShape::MatchDetail(&detail));
        let summary = self.ctx.persister.persist(&batch, None).await?;
        tracing::debug!(match_id, ?summary, "Stored full match roster");
        Ok(())
    }
}
