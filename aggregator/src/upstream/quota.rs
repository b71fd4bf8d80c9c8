use crate::gauge;
use crate::metrics_defs::UPSTREAM_QUOTA_REMAINING;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::header::HeaderMap;
use serde::Serialize;

const BUCKET_HEADER: &str = "x-ratelimit-bucket";
const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

const DEFAULT_LIMIT: u32 = 90;
const DEFAULT_RESET_SECS: u32 = 60;

/// Last rate limit state reported by upstream. Advisory only.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuotaSnapshot {
    pub bucket: Option<String>,
    pub limit: u32,
    pub remaining: u32,
    pub reset_secs: u32,
    pub observed_at: Option<DateTime<Utc>>,
}

impl Default for QuotaSnapshot {
    fn default() -> Self {
        QuotaSnapshot {
            bucket: None,
            limit: DEFAULT_LIMIT,
            remaining: DEFAULT_LIMIT,
            reset_secs: DEFAULT_RESET_SECS,
            observed_at: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct QuotaTracker {
    snapshot: RwLock<QuotaSnapshot>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        QuotaTracker::default()
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        self.snapshot.read().clone()
    }

    /// Overwrites whichever rate limit fields are present in `headers`.
    pub fn observe(&self, headers: &HeaderMap) {
        let bucket = header_str(headers, BUCKET_HEADER);
        let limit = header_u32(headers, LIMIT_HEADER);
        let remaining = header_u32(headers, REMAINING_HEADER);
        let reset = header_u32(headers, RESET_HEADER);

        if bucket.is_none() && limit.is_none() && remaining.is_none() && reset.is_none() {
            return;
        }

        let mut snapshot = self.snapshot.write();
        if let Some(bucket) = bucket {
            snapshot.bucket = Some(bucket);
        }
        if let Some(limit) = limit {
            snapshot.limit = limit;
        }
        if let Some(remaining) = remaining {
            snapshot.remaining = remaining;
        }
        if let Some(reset) = reset {
            snapshot.reset_secs = reset;
        }
        snapshot.observed_at = Some(Utc::now());

        gauge!(UPSTREAM_QUOTA_REMAINING).set(snapshot.remaining as f64);
        if snapshot.remaining == 0 {
            tracing::warn!(
                reset_secs = snapshot.reset_secs,
                "Upstream rate limit exhausted"
            );
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    header_str(headers, name).and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_defaults_before_any_response() {
        let tracker = QuotaTracker::new();
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.limit, 90);
        assert_eq!(snapshot.remaining, 90);
        assert_eq!(snapshot.reset_secs, 60);
        assert!(snapshot.observed_at.is_none());
    }

    #[test]
    fn test_observe_partial_headers() {
        let tracker = QuotaTracker::new();
        let mut headers = HeaderMap::new();
        headers.insert("X-Ratelimit-Remaining", HeaderValue::from_static("42"));
        headers.insert("X-Ratelimit-Bucket", HeaderValue::from_static("basic"));
        tracker.observe(&headers);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.remaining, 42);
        assert_eq!(snapshot.bucket.as_deref(), Some("basic"));
        assert_eq!(snapshot.limit, 90);
        assert!(snapshot.observed_at.is_some());

        // Garbage values leave the previous state alone
        let mut headers = HeaderMap::new();
        headers.insert("X-Ratelimit-Remaining", HeaderValue::from_static("lots"));
        tracker.observe(&headers);
        assert_eq!(tracker.snapshot().remaining, 42);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let tracker = QuotaTracker::new();
        let before = tracker.snapshot();
        let mut headers = HeaderMap::new();
        headers.insert("X-Ratelimit-Limit", HeaderValue::from_static("30"));
        tracker.observe(&headers);
        assert_eq!(before.limit, 90);
        assert_eq!(tracker.snapshot().limit, 30);
    }
}
