use std::net::SocketAddr;

use crate::engine::EngineError;

// ── Booking outcomes ────────────────────────────────────────────

/// Counter: runs booked.
pub const RUNS_BOOKED_TOTAL: &str = "brewcal_runs_booked_total";

/// Counter: runs rescheduled (edited).
pub const RUNS_RESCHEDULED_TOTAL: &str = "brewcal_runs_rescheduled_total";

/// Counter: runs cancelled.
pub const RUNS_CANCELLED_TOTAL: &str = "brewcal_runs_cancelled_total";

/// Counter: rejected allocations. Labels: reason.
pub const ALLOCATION_FAILURES_TOTAL: &str = "brewcal_allocation_failures_total";

// ── Resource utilization ────────────────────────────────────────

/// Gauge: runs currently held in the booking set.
pub const RUNS_ACTIVE: &str = "brewcal_runs_active";

/// Histogram: store write latency in seconds. Labels: op.
pub const STORE_WRITE_DURATION_SECONDS: &str = "brewcal_store_write_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::warn!("metrics exporter disabled: {e}"),
    }
}

/// Map an allocation failure to a short label for metrics.
pub fn failure_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::NoTankAvailable => "no_tank",
        EngineError::InsufficientContainers { .. } => "insufficient_containers",
        EngineError::NoTankAndInsufficientContainers { .. } => "no_tank_and_containers",
        EngineError::InvalidOverride { .. } => "invalid_override",
        EngineError::AllocationInvariantViolation(_) => "invariant_violation",
    }
}
