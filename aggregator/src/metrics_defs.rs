//! Metrics definitions for the aggregator.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

#[macro_export]
macro_rules! counter {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        metrics::counter!($def.name $(, $key => $value)*)
    };
}

#[macro_export]
macro_rules! gauge {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        metrics::gauge!($def.name $(, $key => $value)*)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        metrics::histogram!($def.name $(, $key => $value)*)
    };
}

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "cache.hit",
    metric_type: MetricType::Counter,
    description: "Reads served from the store without an upstream call, tagged by kind",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "cache.miss",
    metric_type: MetricType::Counter,
    description: "Reads that required an upstream refresh, tagged by kind and reason",
};

pub const UPSTREAM_REQUESTS: MetricDef = MetricDef {
    name: "upstream.requests",
    metric_type: MetricType::Counter,
    description: "Upstream calls, tagged by endpoint and status",
};

pub const UPSTREAM_DURATION: MetricDef = MetricDef {
    name: "upstream.duration",
    metric_type: MetricType::Histogram,
    description: "Upstream call latency in seconds",
};

pub const UPSTREAM_QUOTA_REMAINING: MetricDef = MetricDef {
    name: "upstream.quota.remaining",
    metric_type: MetricType::Gauge,
    description: "Remaining requests in the current upstream rate limit window",
};

pub const PERSIST_ROWS: MetricDef = MetricDef {
    name: "persist.rows",
    metric_type: MetricType::Histogram,
    description: "Rows written per persisted batch, tagged by table",
};

pub const SETTLE_FAILURES: MetricDef = MetricDef {
    name: "settle.failures",
    metric_type: MetricType::Counter,
    description: "Deferred last-fetch stamps that could not be written",
};

pub const NEGATIVE_CACHE_HIT: MetricDef = MetricDef {
    name: "negative_cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of account lookups that hit the negative cache",
};

pub const NEGATIVE_CACHE_MISS: MetricDef = MetricDef {
    name: "negative_cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of account lookups that missed the negative cache",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CACHE_HIT,
    CACHE_MISS,
    UPSTREAM_REQUESTS,
    UPSTREAM_DURATION,
    UPSTREAM_QUOTA_REMAINING,
    PERSIST_ROWS,
    SETTLE_FAILURES,
    NEGATIVE_CACHE_HIT,
    NEGATIVE_CACHE_MISS,
];

/// Registers every description with the installed recorder.
pub fn describe_all() {
    for def in ALL_METRICS {
        match def.metric_type {
            MetricType::Counter => metrics::describe_counter!(def.name, def.description),
            MetricType::Gauge => metrics::describe_gauge!(def.name, def.description),
            MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
    }
}
