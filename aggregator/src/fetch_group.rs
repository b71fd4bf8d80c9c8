use crate::errors::AggregatorError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

/// A deadline shared by a group of upstream calls.
///
/// `join` runs two fetches concurrently and only yields when both succeed. The
/// first failure drops the sibling future, cancelling its in-flight request.
#[derive(Clone, Copy, Debug)]
pub struct FetchScope {
    deadline: Instant,
    label: &'static str,
}

impl FetchScope {
    pub fn new(label: &'static str, timeout: Duration) -> Self {
        FetchScope {
            deadline: Instant::now() + timeout,
            label,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub async fn one<A, EA, FA>(&self, fetch: FA) -> Result<A, AggregatorError>
    where
        FA: Future<Output = Result<A, EA>>,
        EA: Into<AggregatorError>,
    {
        if self.is_elapsed() {
            return Err(self.elapsed());
        }
        match timeout_at(self.deadline, fetch).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(self.elapsed()),
        }
    }

    pub async fn join<A, B, EA, EB, FA, FB>(
        &self,
        first: FA,
        second: FB,
    ) -> Result<(A, B), AggregatorError>
    where
        FA: Future<Output = Result<A, EA>>,
        FB: Future<Output = Result<B, EB>>,
        EA: Into<AggregatorError>,
        EB: Into<AggregatorError>,
    {
        if self.is_elapsed() {
            return Err(self.elapsed());
        }
        let both = async {
            tokio::try_join!(
                async { first.await.map_err(Into::<AggregatorError>::into) },
                async { second.await.map_err(Into::<AggregatorError>::into) },
            )
        };

        match timeout_at(self.deadline, both).await {
            Ok(result) => {
                if let Err(err) = &result {
                    tracing::debug!(group = self.label, error = %err, "Fetch group failed");
                }
                result
            }
            Err(_) => Err(self.elapsed()),
        }
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn elapsed(&self) -> AggregatorError {
        tracing::debug!(group = self.label, "Fetch group deadline elapsed");
        AggregatorError::Timeout(format!("{} fetch group", self.label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::sleep;

    fn invalid(msg: &str) -> AggregatorError {
        AggregatorError::InvalidInput(msg.to_string())
    }

    #[tokio::test]
    async fn test_join_success() {
        let scope = FetchScope::new("test", Duration::from_secs(1));
        let (a, b) = scope
            .join(
                async { Ok::<_, AggregatorError>(1) },
                async { Ok::<_, AggregatorError>("two") },
            )
            .await
            .unwrap();
        assert_eq!((a, b), (1, "two"));
    }

    #[tokio::test]
    async fn test_first_error_cancels_sibling() {
        let finished = Arc::new(AtomicBool::new(false));
        let finished_clone = finished.clone();

        let scope = FetchScope::new("test", Duration::from_secs(5));
        let result = scope
            .join(
                async move {
                    sleep(Duration::from_millis(200)).await;
                    finished_clone.store(true, Ordering::SeqCst);
                    Ok::<_, AggregatorError>(())
                },
                async { Err::<(), _>(invalid("rank failed")) },
            )
            .await;

        assert!(matches!(result, Err(AggregatorError::InvalidInput(ref m)) if m == "rank failed"));
        sleep(Duration::from_millis(300)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_deadline_elapsed() {
        let scope = FetchScope::new("slow", Duration::from_millis(50));
        let result = scope
            .join(
                async {
                    sleep(Duration::from_secs(5)).await;
                    Ok::<_, AggregatorError>(())
                },
                async { Ok::<_, AggregatorError>(()) },
            )
            .await;
        assert!(matches!(result, Err(AggregatorError::Timeout(_))));

        let result = scope
            .one(async { Ok::<_, AggregatorError>(()) })
            .await;
        // The deadline is shared, so later calls in the same scope fail too
        assert!(matches!(result, Err(AggregatorError::Timeout(_))));
    }
}
