//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Scan decisions (by outcome)
//! - Ticket consumption and issuance

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, Opts};

// =============================================================================
// Redemption Metrics
// =============================================================================

/// Scan decisions total by outcome.
pub static SCAN_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("turnstile_scan_decisions_total", "Total scan decisions"),
        &["status"], // "valid_unused", "already_used", "invalid", "expired", "revoked"
    )
    .unwrap()
});

/// Tickets consumed (ISSUED -> USED transitions) since startup.
pub static TICKETS_CONSUMED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "turnstile_tickets_consumed_total",
        "Total tickets consumed since startup",
    )
    .unwrap()
});

/// Tickets issued since startup.
pub static TICKETS_ISSUED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "turnstile_tickets_issued_total",
        "Total tickets issued since startup",
    )
    .unwrap()
});

/// Register all core metrics with a registry.
pub fn register_core_metrics(registry: &prometheus::Registry) {
    let _ = registry.register(Box::new(SCAN_DECISIONS.clone()));
    let _ = registry.register(Box::new(TICKETS_CONSUMED_TOTAL.clone()));
    let _ = registry.register(Box::new(TICKETS_ISSUED_TOTAL.clone()));
}
