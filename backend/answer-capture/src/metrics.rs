use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Encoder, Histogram,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // Autosave Metrics
    pub static ref AUTOSAVE_CYCLES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "autosave_cycles_total",
        "Total number of autosave cycles",
        &["trigger", "status"]
    )
    .unwrap();

    pub static ref DRAFT_STORE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "draft_store_operations_total",
        "Total number of local draft store operations",
        &["operation", "status"]
    )
    .unwrap();

    // Submission Metrics
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submissions_total",
        "Total number of finished submission cycles",
        &["outcome"]
    )
    .unwrap();

    pub static ref SUBMISSION_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submission_attempts_total",
        "Total number of calls to the submission endpoint",
        &["result"]
    )
    .unwrap();

    pub static ref SUBMISSION_DURATION_SECONDS: Histogram = register_histogram!(
        "submission_duration_seconds",
        "Submission endpoint call duration in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    // Session Metrics
    pub static ref CONNECTIVITY_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "connectivity_transitions_total",
        "Total number of observed connectivity transitions",
        &["state"]
    )
    .unwrap();

    pub static ref CAPTURE_SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "capture_sessions_active",
        "Number of capture sessions that have not been shut down"
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: time one submission endpoint call
pub async fn track_submission_attempt<F, T, E>(future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };
    SUBMISSION_ATTEMPTS_TOTAL.with_label_values(&[status]).inc();
    SUBMISSION_DURATION_SECONDS.observe(duration);

    result
}

pub fn record_draft_operation(operation: &str, ok: bool) {
    let status = if ok { "success" } else { "error" };
    DRAFT_STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

pub fn record_autosave_cycle(trigger: &str, ok: bool) {
    let status = if ok { "saved" } else { "error" };
    AUTOSAVE_CYCLES_TOTAL
        .with_label_values(&[trigger, status])
        .inc();
}

pub fn record_connectivity(online: bool) {
    let state = if online { "online" } else { "offline" };
    CONNECTIVITY_TRANSITIONS_TOTAL
        .with_label_values(&[state])
        .inc();
}
