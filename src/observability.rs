use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations executed. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "flexdesk_operations_total";

/// Histogram: operation latency in seconds, store I/O included. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "flexdesk_operation_duration_seconds";

/// Counter: cells that blocked a reservation. Labels: office.
pub const CONFLICTING_CELLS_TOTAL: &str = "flexdesk_conflicting_cells_total";

/// Counter: cells reserved. Labels: office.
pub const CELLS_RESERVED_TOTAL: &str = "flexdesk_cells_reserved_total";

/// Counter: cells freed by cancellation. Labels: office.
pub const CELLS_FREED_TOTAL: &str = "flexdesk_cells_freed_total";

// ── Store metrics ───────────────────────────────────────────────

/// Counter: store calls retried after a transient failure. Labels: call.
pub const STORE_RETRIES_TOTAL: &str = "flexdesk_store_retries_total";

/// Histogram: store call duration in seconds. Labels: call.
pub const STORE_CALL_DURATION_SECONDS: &str = "flexdesk_store_call_duration_seconds";

/// Counter: writes refused because the stored sheet changed underneath.
pub const STALE_WRITES_TOTAL: &str = "flexdesk_stale_writes_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short status label for an operation outcome.
pub fn status_label<T>(result: &Result<T, crate::engine::EngineError>) -> &'static str {
    use crate::engine::EngineError;
    match result {
        Ok(_) => "ok",
        Err(EngineError::Validation(_)) | Err(EngineError::LimitExceeded(_)) => "invalid",
        Err(EngineError::NotFound(_)) | Err(EngineError::UnknownOffice(_)) => "not_found",
        Err(EngineError::Conflict(_)) | Err(EngineError::ConcurrentModification(_)) => "conflict",
        Err(EngineError::Unauthorized) | Err(EngineError::Forbidden(_)) => "denied",
        Err(EngineError::Storage(_)) => "storage_error",
    }
}
