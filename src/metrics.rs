//! Operational metrics for harvest runs
//!
//! Metrics are recorded through the `metrics` facade and are no-ops until [`init_metrics`]
//! installs the Prometheus exporter. Labels stay low-cardinality: endpoint, stage, outcome.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Install the Prometheus exporter on `addr`.
///
/// Idempotent: later calls are ignored.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Requests sent to the match API"
    );
    describe_counter!(
        "http_429_errors_total",
        Unit::Count,
        "Upstream rate limit responses"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "Request duration"
    );
    describe_histogram!(
        "governor_wait_seconds",
        Unit::Seconds,
        "Time a request was held back by the rate windows"
    );
    describe_counter!(
        "harvest_units_total",
        Unit::Count,
        "Units processed per stage and outcome"
    );
    describe_counter!(
        "harvest_records_appended_total",
        Unit::Count,
        "Match records appended to the shard store"
    );
    describe_counter!(
        "credential_expired_total",
        Unit::Count,
        "Credential rejections seen by the pipeline"
    );

    *initialized = true;
    info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Whether the exporter has been installed
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Timing and status of one outbound request
pub struct HttpRequestMetrics {
    endpoint: &'static str,
    start_time: Instant,
}

impl HttpRequestMetrics {
    /// Start timing a request to `endpoint`
    pub fn start(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            start_time: Instant::now(),
        }
    }

    /// Record a response with `status_code`
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "endpoint" => self.endpoint)
            .record(duration.as_secs_f64());

        if status_code == 429 {
            counter!("http_429_errors_total", "endpoint" => self.endpoint).increment(1);
        }

        debug!(
            endpoint = self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            "Request completed"
        );
    }

    /// Record a request that never produced a status
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => "network_error",
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "endpoint" => self.endpoint)
            .record(duration.as_secs_f64());

        warn!(
            endpoint = self.endpoint,
            duration_ms = duration.as_millis() as u64,
            "Network error"
        );
    }
}

/// Record time spent waiting on the rate windows
pub fn record_governor_wait(waited: Duration) {
    histogram!("governor_wait_seconds").record(waited.as_secs_f64());
}

/// Record a processed unit
pub fn record_unit(stage: &'static str, outcome: &'static str) {
    counter!("harvest_units_total", "stage" => stage, "outcome" => outcome).increment(1);
}

/// Record records appended to the shard store
pub fn record_records_appended(count: usize) {
    counter!("harvest_records_appended_total").increment(count as u64);
}

/// Record a credential rejection
pub fn record_credential_expired(stage: &'static str) {
    counter!("credential_expired_total", "stage" => stage).increment(1);
}
