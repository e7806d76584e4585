//! Operational metrics registry
//!
//! In-memory, thread-safe counters and latency statistics for the query
//! pipeline. The registry is an explicit instance handed to the orchestrator,
//! never a process-wide global, so tests can run against isolated registries.
//!
//! Counters must be registered at construction time. Incrementing a counter
//! that was never registered is a wiring bug and surfaces as
//! [`MetricsError::UnknownCounter`] rather than being silently dropped.
//!
//! Metrics are lost on process restart. That is intended: long-term metric
//! storage belongs to an external scraper, not this registry.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use thiserror::Error;

/// Default number of latency samples kept for avg/p95 computation.
const DEFAULT_LATENCY_WINDOW: usize = 1000;

/// Counter for total queries received.
pub const REQUESTS_TOTAL: &str = "requests_total";
/// Counter for failed queries (degraded answers included).
pub const ERRORS_TOTAL: &str = "errors_total";
/// Counter for response cache hits.
pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
/// Counter for requests rejected by an upstream rate limit.
pub const RATE_LIMITED_TOTAL: &str = "rate_limited_total";

/// Errors raised by the metrics registry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricsError {
    #[error("Unknown counter: {0} (counter was never registered)")]
    UnknownCounter(String),
}

/// Point-in-time copy of registry state.
///
/// All fields are computed under a single lock acquisition, so the snapshot
/// is internally consistent: every field reflects the same instant.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub errors_total: u64,
    pub cache_hits_total: u64,
    pub rate_limited_total: u64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub latency_sample_count: usize,
}

struct RegistryState {
    counters: HashMap<String, u64>,
    latencies_ms: VecDeque<f64>,
}

/// Thread-safe metrics registry.
///
/// All mutating and reading operations are serialized through one mutex.
/// No method performs I/O or calls back into other components while holding
/// the lock.
pub struct MetricsRegistry {
    state: Mutex<RegistryState>,
    latency_window: usize,
}

impl MetricsRegistry {
    /// Create a registry with the given counters registered and the default
    /// latency window.
    pub fn with_counters(names: &[&str]) -> Self {
        Self::with_counters_and_window(names, DEFAULT_LATENCY_WINDOW)
    }

    /// Create a registry with a specific latency window capacity.
    pub fn with_counters_and_window(names: &[&str], latency_window: usize) -> Self {
        let counters = names.iter().map(|n| (n.to_string(), 0)).collect();
        Self {
            state: Mutex::new(RegistryState {
                counters,
                latencies_ms: VecDeque::with_capacity(latency_window),
            }),
            latency_window,
        }
    }

    /// Create a registry with the standard query pipeline counters.
    pub fn standard() -> Self {
        Self::with_counters(&[
            REQUESTS_TOTAL,
            ERRORS_TOTAL,
            CACHE_HITS_TOTAL,
            RATE_LIMITED_TOTAL,
        ])
    }

    /// Increment a named counter by 1.
    ///
    /// Returns [`MetricsError::UnknownCounter`] if the name was never
    /// registered. Callers must propagate this, not swallow it.
    pub fn increment_counter(&self, name: &str) -> Result<(), MetricsError> {
        let mut state = self.lock_state();
        match state.counters.get_mut(name) {
            Some(value) => {
                *value += 1;
                Ok(())
            }
            None => Err(MetricsError::UnknownCounter(name.to_string())),
        }
    }

    /// Append a latency sample to the bounded window.
    ///
    /// The oldest sample is evicted when the window is at capacity.
    pub fn record_latency(&self, sample_ms: f64) {
        let mut state = self.lock_state();
        if state.latencies_ms.len() == self.latency_window {
            state.latencies_ms.pop_front();
        }
        state.latencies_ms.push_back(sample_ms);
    }

    /// Take an internally consistent snapshot of all metrics.
    ///
    /// Average and p95 latency are computed from a sorted copy of the current
    /// window. The p95 index is `floor(count * 0.95)`, clamped to the last
    /// index. Both are 0.0 when no samples have been recorded.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.lock_state();

        let (avg, p95) = if state.latencies_ms.is_empty() {
            (0.0, 0.0)
        } else {
            let sum: f64 = state.latencies_ms.iter().sum();
            let avg = sum / state.latencies_ms.len() as f64;

            let mut sorted: Vec<f64> = state.latencies_ms.iter().copied().collect();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let idx = ((sorted.len() as f64 * 0.95) as usize).min(sorted.len() - 1);
            (avg, sorted[idx])
        };

        MetricsSnapshot {
            requests_total: state.counter(REQUESTS_TOTAL),
            errors_total: state.counter(ERRORS_TOTAL),
            cache_hits_total: state.counter(CACHE_HITS_TOTAL),
            rate_limited_total: state.counter(RATE_LIMITED_TOTAL),
            avg_latency_ms: avg,
            p95_latency_ms: p95,
            latency_sample_count: state.latencies_ms.len(),
        }
    }

    /// Read a single counter value. Returns `UnknownCounter` for
    /// unregistered names.
    pub fn counter_value(&self, name: &str) -> Result<u64, MetricsError> {
        let state = self.lock_state();
        state
            .counters
            .get(name)
            .copied()
            .ok_or_else(|| MetricsError::UnknownCounter(name.to_string()))
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        // A poisoned lock means a panic while holding it; the counters are
        // plain integers so the state is still usable.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RegistryState {
    fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
