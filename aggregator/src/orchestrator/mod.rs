//! Request level flows: consult freshness, fetch and reconcile when stale,
//! persist, then answer from the store.

mod match_detail;
mod matches;
mod player;

pub use match_detail::MatchDetailOrchestrator;
pub use matches::MatchOrchestrator;
pub use player::PlayerOrchestrator;

use crate::config::CacheConfig;
use crate::errors::AggregatorError;
use crate::negative_cache::NegativeCache;
use crate::persister::Persister;
use crate::settle::SettleQueue;
use crate::store::Store;
use crate::upstream::UpstreamClient;
use std::future::Future;
use std::time::Duration;

/// Dependencies shared by all orchestrators.
pub struct Context {
    pub store: Store,
    pub persister: Persister,
    pub upstream: UpstreamClient,
    pub settle: SettleQueue,
    pub negative_cache: NegativeCache,
    pub cache: CacheConfig,
    /// Budget for one group of upstream calls, tighter than the request budget.
    pub upstream_timeout: Duration,
}

/// Bounds a whole orchestrator call by the request deadline.
async fn within<T, F>(timeout: Duration, operation: &'static str, fut: F) -> Result<T, AggregatorError>
where
    F: Future<Output = Result<T, AggregatorError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, "Request deadline exceeded");
            Err(AggregatorError::Timeout(format!("{operation} request")))
        }
    }
}

/// Turns an upstream 404 into a not-found error for the given entity.
fn not_found_as(err: AggregatorError, what: impl FnOnce() -> String) -> AggregatorError {
    match err {
        AggregatorError::Upstream { status: 404, .. } => AggregatorError::NotFound(what()),
        other => other,
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, AggregatorError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AggregatorError::InvalidInput(format!("{field} is required")));
    }
    Ok(value)
}
