//! Decides whether a cached row can be served or has to be refreshed from upstream.

use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Never fetched successfully.
    Cold,
    /// Identity is known but rank data is missing.
    Partial,
    Forced,
    Expired,
}

impl Freshness {
    pub fn needs_refresh(self) -> bool {
        !matches!(self, Freshness::Fresh)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Cold => "cold",
            Freshness::Partial => "partial",
            Freshness::Forced => "forced",
            Freshness::Expired => "expired",
        }
    }
}

pub fn evaluate(
    last_fetch: Option<DateTime<Utc>>,
    partial: bool,
    force_refresh: bool,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Freshness {
    let Some(last_fetch) = last_fetch else {
        return Freshness::Cold;
    };
    if partial {
        return Freshness::Partial;
    }
    if force_refresh {
        return Freshness::Forced;
    }

    // A TTL too large for chrono never expires.
    let Ok(ttl) = chrono::Duration::from_std(ttl) else {
        return Freshness::Fresh;
    };

    if now.signed_duration_since(last_fetch) > ttl {
        Freshness::Expired
    } else {
        Freshness::Fresh
    }
}

pub fn should_refresh(
    last_fetch: Option<DateTime<Utc>>,
    partial: bool,
    force_refresh: bool,
    ttl: Duration,
) -> bool {
    evaluate(last_fetch, partial, force_refresh, ttl, Utc::now()).needs_refresh()
}
