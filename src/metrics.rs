use tracing::trace;

// Trace-based counters; the Prometheus endpoint only exposes the recorder.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "valuation.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn row_outcome(status: &str) {
    trace!(
        target = "valuation.metrics",
        status = status,
        "bulk_rows_total_inc"
    );
}

pub fn batch_elapsed(rows: usize, elapsed_ms: u128) {
    trace!(
        target = "valuation.metrics",
        rows = rows as u64,
        elapsed_ms = elapsed_ms as u64,
        "batch_elapsed"
    );
}
