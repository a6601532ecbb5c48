use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Metric name prefix for all DialyHome metrics
const PREFIX: &str = "dialyhome";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Background Job Metrics
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Total background job runs by outcome"),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job run duration in seconds"
        )
        .buckets(vec![0.1, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "Whether a background job is currently running (1) or not (0)"),
        &["job_id"]
    ).expect("Failed to create background_job_running metric");

    // Backup Metrics
    pub static ref BACKUPS_CREATED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_backups_created_total"),
        "Total database backups written"
    ).expect("Failed to create backups_created_total metric");

    pub static ref BACKUP_SIZE_BYTES: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_backup_size_bytes"),
            "Size of written backup files in bytes"
        )
        .buckets(prometheus::exponential_buckets(1024.0, 4.0, 12).unwrap_or_default())
    ).expect("Failed to create backup_size_bytes metric");

    pub static ref BACKUP_LAST_SUCCESS_TIMESTAMP: Gauge = Gauge::new(
        format!("{PREFIX}_backup_last_success_timestamp_seconds"),
        "Unix time of the last successful backup"
    ).expect("Failed to create backup_last_success_timestamp_seconds metric");

    pub static ref BACKUP_FILES_DELETED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_backup_files_deleted_total"),
        "Total backup files removed by retention"
    ).expect("Failed to create backup_files_deleted_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(BACKUPS_CREATED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKUP_SIZE_BYTES.clone()));
    let _ = REGISTRY.register(Box::new(BACKUP_LAST_SUCCESS_TIMESTAMP.clone()));
    let _ = REGISTRY.register(Box::new(BACKUP_FILES_DELETED_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record a finished background job run
pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();

    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

/// Mark a background job as running or idle
pub fn set_background_job_running(job_id: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

/// Record a successfully written backup file
pub fn record_backup_created(size_bytes: u64) {
    BACKUPS_CREATED_TOTAL.inc();
    BACKUP_SIZE_BYTES.observe(size_bytes as f64);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    BACKUP_LAST_SUCCESS_TIMESTAMP.set(now);
}

/// Record backup files removed by a retention sweep
pub fn record_backups_deleted(count: usize) {
    if count > 0 {
        BACKUP_FILES_DELETED_TOTAL.inc_by(count as f64);
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
