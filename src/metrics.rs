//! Prometheus metrics for download runs
//!
//! Tracks transfer attempts, retries, throttle waits, task outcomes, and the
//! artifacts produced by post-processing.
//!
//! ## Architecture
//!
//! - Uses the `metrics` facade; recording is a no-op until an exporter is installed
//! - [`init_metrics`] installs the Prometheus exporter with an HTTP scrape listener
//! - Helpers here are synchronous so they can be called from blocking post-processing

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::fetcher::FetchError;

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Correlation ID generator for transfer tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metrics initialization failure
#[derive(Debug, thiserror::Error)]
#[error("failed to install Prometheus exporter on {addr}: {message}")]
pub struct MetricsError {
    addr: SocketAddr,
    message: String,
}

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls return `Ok(())` without rebinding.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError {
            addr,
            message: e.to_string(),
        })?;

    describe_counter!(
        "report_transfers_total",
        Unit::Count,
        "Transfer attempts against the report server, by outcome"
    );
    describe_histogram!(
        "report_transfer_duration_seconds",
        Unit::Seconds,
        "Duration of one transfer attempt"
    );
    describe_counter!(
        "report_bytes_written_total",
        Unit::Bytes,
        "Bytes staged by successful transfers"
    );
    describe_counter!(
        "report_retries_total",
        Unit::Count,
        "Retry attempts scheduled"
    );
    describe_histogram!(
        "report_retry_backoff_seconds",
        Unit::Seconds,
        "Backoff slept before a retry"
    );
    describe_counter!(
        "throttle_permits_acquired_total",
        Unit::Count,
        "Throttle permits issued"
    );
    describe_gauge!(
        "throttle_permits_available",
        Unit::Count,
        "Throttle slots free after the latest issuance"
    );
    describe_histogram!(
        "throttle_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for a throttle permit"
    );
    describe_counter!(
        "report_tasks_total",
        Unit::Count,
        "Tasks settled, by module and outcome"
    );
    describe_counter!(
        "consolidated_rows_total",
        Unit::Count,
        "Rows produced by consolidation"
    );
    describe_counter!(
        "artifacts_written_total",
        Unit::Count,
        "Optimized artifacts written, by format"
    );
    describe_histogram!(
        "artifact_bytes",
        Unit::Bytes,
        "Size of each optimized artifact"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Generate a new correlation ID for one transfer attempt
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("xfer-{id:08x}")
}

/// Timing and outcome of one transfer attempt
pub struct TransferMetrics {
    module: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl TransferMetrics {
    /// Start timing an attempt
    pub fn start(module: impl Into<String>, attempt: u32) -> Self {
        let module = module.into();
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            module = %module,
            attempt,
            "Transfer attempt started"
        );

        Self {
            module,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record a completed transfer
    pub fn record_success(&self, bytes: u64) {
        let duration = self.start_time.elapsed();

        counter!(
            "report_transfers_total",
            "module" => self.module.clone(),
            "outcome" => "ok",
        )
        .increment(1);
        counter!("report_bytes_written_total", "module" => self.module.clone()).increment(bytes);
        histogram!("report_transfer_duration_seconds", "module" => self.module.clone())
            .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            module = %self.module,
            bytes,
            duration_ms = duration.as_millis() as u64,
            "Transfer attempt completed"
        );
    }

    /// Record a failed attempt
    pub fn record_error(&self, error: &FetchError) {
        let duration = self.start_time.elapsed();

        counter!(
            "report_transfers_total",
            "module" => self.module.clone(),
            "outcome" => error.kind(),
        )
        .increment(1);
        histogram!("report_transfer_duration_seconds", "module" => self.module.clone())
            .record(duration.as_secs_f64());

        if error.is_auth() {
            warn!(
                correlation_id = %self.correlation_id,
                module = %self.module,
                attempt = self.attempt,
                "Authentication failure recorded"
            );
        } else {
            debug!(
                correlation_id = %self.correlation_id,
                module = %self.module,
                attempt = self.attempt,
                error = %error,
                duration_ms = duration.as_millis() as u64,
                "Transfer attempt failed"
            );
        }
    }

    /// Correlation ID for this attempt
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "report_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!(
        "report_retry_backoff_seconds",
        "attempt" => attempt.to_string(),
    )
    .record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Throttle wait measurement
pub struct ThrottleMetrics {
    start_time: Option<Instant>,
}

impl Default for ThrottleMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ThrottleMetrics {
    /// New, not yet started
    pub fn new() -> Self {
        Self { start_time: None }
    }

    /// Start measuring queue wait time
    pub fn start_acquire(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Record a permit issuance with the slots left free afterwards
    pub fn record_acquired(&mut self, available: usize) {
        if let Some(start) = self.start_time.take() {
            let wait = start.elapsed();
            histogram!("throttle_wait_seconds").record(wait.as_secs_f64());
            counter!("throttle_permits_acquired_total").increment(1);
            if wait.as_millis() > 100 {
                debug!(wait_ms = wait.as_millis() as u64, "Throttle permit issued after wait");
            }
        }
        gauge!("throttle_permits_available").set(available as f64);
    }
}

/// Count one settled task
pub fn record_task_outcome(module: &str, outcome: &'static str) {
    counter!(
        "report_tasks_total",
        "module" => module.to_string(),
        "outcome" => outcome,
    )
    .increment(1);
}

/// Count rows produced by a module consolidation
pub fn record_consolidation(module: &str, rows: usize) {
    counter!("consolidated_rows_total", "module" => module.to_string()).increment(rows as u64);
}

/// Count one written artifact
pub fn record_artifact(module: &str, format: &'static str, bytes: u64) {
    counter!(
        "artifacts_written_total",
        "module" => module.to_string(),
        "format" => format,
    )
    .increment(1);
    histogram!("artifact_bytes", "format" => format).record(bytes as f64);
}
