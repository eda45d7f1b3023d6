//! Traffic summary for the captured requests
//!
//! Counts and response-time percentiles, derived from a joined snapshot.

use crate::inspector::{RequestResponse, WebsocketSession};

/// Snapshot of the current traffic
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrafficSummary {
    pub total_requests: usize,
    pub completed: usize,
    pub in_flight: usize,
    pub errors: usize,
    pub websockets: usize,
    pub open_websockets: usize,
    pub p50_timing_ms: u64,
    pub p90_timing_ms: u64,
    pub p99_timing_ms: u64,
}

/// Summarize a joined snapshot
pub fn summarize(pairs: &[RequestResponse], websockets: &[WebsocketSession]) -> TrafficSummary {
    let mut timings: Vec<u64> = pairs
        .iter()
        .filter_map(|p| p.response.as_ref())
        .map(|r| (r.timing.max(0.0) * 1000.0).round() as u64)
        .collect();
    timings.sort_unstable();

    let errors = pairs
        .iter()
        .filter_map(|p| p.response.as_ref())
        .filter(|r| r.status >= 400)
        .count();

    // Nearest rank: the smallest sample with at least p% of samples at or below it
    let percentile = |p: f64| -> u64 {
        if timings.is_empty() {
            return 0;
        }
        let rank = ((p / 100.0) * timings.len() as f64).ceil() as usize;
        let idx = rank.saturating_sub(1).min(timings.len() - 1);
        timings[idx]
    };

    TrafficSummary {
        total_requests: pairs.len(),
        completed: timings.len(),
        in_flight: pairs.len() - timings.len(),
        errors,
        websockets: websockets.len(),
        open_websockets: websockets.iter().filter(|ws| ws.is_open()).count(),
        p50_timing_ms: percentile(50.0),
        p90_timing_ms: percentile(90.0),
        p99_timing_ms: percentile(99.0),
    }
}
