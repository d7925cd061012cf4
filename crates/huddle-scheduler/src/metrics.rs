// SPDX-FileCopyrightText: 2026 Huddle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_gauge};

/// Register all Huddle metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("huddle_batches_claimed_total", "Batches claimed by a scanner");
    describe_counter!(
        "huddle_batches_dropped_total",
        "Batches dropped because no ticket resolved"
    );
    describe_counter!("huddle_windows_armed_total", "Debounce windows armed or extended");
    describe_counter!("huddle_dispatches_total", "Successful assistant dispatches");
    describe_counter!("huddle_dispatch_failures_total", "Failed assistant dispatches");
    describe_counter!(
        "huddle_attempts_exhausted_total",
        "Windows left disarmed after exhausting the dispatch retry budget"
    );
    describe_counter!(
        "huddle_orphan_claims_released_total",
        "Stale claims released by recovery"
    );
    describe_gauge!("huddle_pending_batches", "Unclaimed, unprocessed batches");
    describe_gauge!("huddle_processing_batches", "Claimed but unprocessed batches");
    describe_gauge!("huddle_stuck_windows", "Armed windows past the staleness cutoff");
}

/// Record a won batch claim, labeled by what triggered the sweep.
pub fn record_claim(trigger: &str) {
    metrics::counter!("huddle_batches_claimed_total", "trigger" => trigger.to_string())
        .increment(1);
}

/// Record a batch dropped because its chat resolved to no ticket.
pub fn record_drop() {
    metrics::counter!("huddle_batches_dropped_total").increment(1);
}

/// Record a window armed or extended.
pub fn record_armed() {
    metrics::counter!("huddle_windows_armed_total").increment(1);
}

/// Record a successful dispatch.
pub fn record_dispatch() {
    metrics::counter!("huddle_dispatches_total").increment(1);
}

/// Record a failed dispatch.
pub fn record_dispatch_failure() {
    metrics::counter!("huddle_dispatch_failures_total").increment(1);
}

/// Record a window giving up after the retry cap.
pub fn record_attempts_exhausted() {
    metrics::counter!("huddle_attempts_exhausted_total").increment(1);
}

/// Record stale claims released by a recovery pass.
pub fn record_orphan_claims_released(count: u64) {
    metrics::counter!("huddle_orphan_claims_released_total").increment(count);
}

/// Publish batch backlog gauges.
pub fn set_batch_gauges(pending: f64, processing: f64) {
    metrics::gauge!("huddle_pending_batches").set(pending);
    metrics::gauge!("huddle_processing_batches").set(processing);
}

/// Publish the stuck-window gauge.
pub fn set_stuck_windows(count: f64) {
    metrics::gauge!("huddle_stuck_windows").set(count);
}
