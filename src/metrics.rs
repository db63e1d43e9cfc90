// SPDX-License-Identifier: Apache-2.0

//! Lightweight in-memory metrics for upstream reads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct FetchMetrics {
    fetches: AtomicU64,
    failed: AtomicU64,
    cache_hits: AtomicU64,
    joined: AtomicU64,
    duration_total_ms: AtomicU64,
    duration_max_ms: AtomicU64,
}

static FETCH_METRICS: OnceLock<FetchMetrics> = OnceLock::new();

fn metrics() -> &'static FetchMetrics {
    FETCH_METRICS.get_or_init(FetchMetrics::default)
}

/// Records a completed upstream request.
pub fn record_fetch(duration_ms: f64, success: bool) {
    let duration_ms = duration_ms.max(0.0) as u64;
    let metrics = metrics();
    metrics.fetches.fetch_add(1, Ordering::Relaxed);
    if !success {
        metrics.failed.fetch_add(1, Ordering::Relaxed);
    }
    metrics
        .duration_total_ms
        .fetch_add(duration_ms, Ordering::Relaxed);
    metrics
        .duration_max_ms
        .fetch_max(duration_ms, Ordering::Relaxed);
}

/// A read served from fresh cached data.
pub fn record_cache_hit() {
    metrics().cache_hits.fetch_add(1, Ordering::Relaxed);
}

/// A read that attached to a request already in flight.
pub fn record_joined() {
    metrics().joined.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchMetricsSnapshot {
    pub fetches: u64,
    pub failed: u64,
    pub cache_hits: u64,
    pub joined: u64,
    pub avg_ms: Option<f64>,
    pub max_ms: Option<u64>,
}

pub fn snapshot() -> FetchMetricsSnapshot {
    let metrics = metrics();
    let fetches = metrics.fetches.load(Ordering::Relaxed);
    let duration_total = metrics.duration_total_ms.load(Ordering::Relaxed);
    let max_ms = metrics.duration_max_ms.load(Ordering::Relaxed);

    FetchMetricsSnapshot {
        fetches,
        failed: metrics.failed.load(Ordering::Relaxed),
        cache_hits: metrics.cache_hits.load(Ordering::Relaxed),
        joined: metrics.joined.load(Ordering::Relaxed),
        avg_ms: (fetches > 0).then(|| duration_total as f64 / fetches as f64),
        max_ms: (max_ms > 0).then_some(max_ms),
    }
}
