//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Session lifecycle (renewals)
//! - Transport (requests, authorization replays)
//! - Workflow (ticket transitions)
//! - Job monitor (poll cycles)

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, Opts};

// =============================================================================
// Session Metrics
// =============================================================================

/// Session renewals total by result.
pub static SESSION_RENEWALS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("botdesk_session_renewals_total", "Total session renewals"),
        &["result"], // "success", "collapsed", "failed"
    )
    .unwrap()
});

// =============================================================================
// Transport Metrics
// =============================================================================

/// Outbound requests total by method and status.
pub static TRANSPORT_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("botdesk_transport_requests_total", "Total outbound requests"),
        &["method", "status"],
    )
    .unwrap()
});

/// Authorization replays total (one renewal-and-replay per counted event).
pub static TRANSPORT_REPLAYS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "botdesk_transport_replays_total",
        "Total requests replayed after session renewal",
    )
    .unwrap()
});

// =============================================================================
// Workflow Metrics
// =============================================================================

/// Ticket transitions requested, by from/to status.
pub static WORKFLOW_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "botdesk_workflow_transitions_total",
            "Total ticket transitions requested",
        ),
        &["from", "to"],
    )
    .unwrap()
});

// =============================================================================
// Job Monitor Metrics
// =============================================================================

/// Poll cycles executed by the job monitor.
pub static MONITOR_POLL_CYCLES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "botdesk_monitor_poll_cycles_total",
        "Total broadcast job poll cycles",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SESSION_RENEWALS.clone()),
        Box::new(TRANSPORT_REQUESTS.clone()),
        Box::new(TRANSPORT_REPLAYS.clone()),
        Box::new(WORKFLOW_TRANSITIONS.clone()),
        Box::new(MONITOR_POLL_CYCLES.clone()),
    ]
}
