//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations; reporting swaps the since-report
//! counters atomically for a consistent snapshot.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are
//! statistical counters only. Do NOT use them for coordination or logic
//! decisions.

use crate::domain::types::RequestOutcome;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Update an atomic max value using a compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Lock-free metrics collector for the gateway
#[derive(Default)]
pub struct Metrics {
    /// Telemetry readings applied to the store (monotonic)
    telemetry_updates: AtomicU64,
    /// Requests ever processed (monotonic)
    requests_total: AtomicU64,
    admitted_total: AtomicU64,
    denied_total: AtomicU64,
    failed_total: AtomicU64,
    /// Decision latency accumulators (reset on report)
    requests_since_report: AtomicU64,
    latency_sum_us: AtomicU64,
    latency_max_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_telemetry_update(&self) {
        self.telemetry_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request(&self, outcome: &RequestOutcome, latency_us: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        match outcome {
            RequestOutcome::Admitted { .. } => self.admitted_total.fetch_add(1, Ordering::Relaxed),
            RequestOutcome::Denied(_) => self.denied_total.fetch_add(1, Ordering::Relaxed),
            RequestOutcome::Failed(_) => self.failed_total.fetch_add(1, Ordering::Relaxed),
        };
        self.requests_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    /// Snapshot and reset the since-report accumulators
    pub fn report(&self) -> MetricsSummary {
        let since_report = self.requests_since_report.swap(0, Ordering::Relaxed);
        let latency_sum_us = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max_us = self.latency_max_us.swap(0, Ordering::Relaxed);

        MetricsSummary {
            telemetry_updates: self.telemetry_updates.load(Ordering::Relaxed),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            admitted_total: self.admitted_total.load(Ordering::Relaxed),
            denied_total: self.denied_total.load(Ordering::Relaxed),
            failed_total: self.failed_total.load(Ordering::Relaxed),
            requests_since_report: since_report,
            latency_avg_us: if since_report > 0 { latency_sum_us / since_report } else { 0 },
            latency_max_us,
        }
    }
}

/// Snapshot produced by `Metrics::report`
#[derive(Debug, Clone, Copy)]
pub struct MetricsSummary {
    pub telemetry_updates: u64,
    pub requests_total: u64,
    pub admitted_total: u64,
    pub denied_total: u64,
    pub failed_total: u64,
    pub requests_since_report: u64,
    pub latency_avg_us: u64,
    pub latency_max_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            telemetry_updates = %self.telemetry_updates,
            requests_total = %self.requests_total,
            admitted = %self.admitted_total,
            denied = %self.denied_total,
            failed = %self.failed_total,
            requests_since_report = %self.requests_since_report,
            latency_avg_us = %self.latency_avg_us,
            latency_max_us = %self.latency_max_us,
            "metrics_report"
        );
    }
}
