//! Prometheus metrics exposition
//!
//! - `label_jobs_total` (counter): label `outcome`
//! - `label_generation_duration_seconds` (histogram)
//! - `session_jobs_total` (counter): label `outcome`
//! - `top_up_attempts_total` (counter): label `outcome`
//! - `accounts_removed_total` (counter)

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const LABEL_DURATION: &str = "label_generation_duration_seconds";

/// Label protocol calls take seconds, not milliseconds.
const LABEL_DURATION_BUCKETS: &[f64] = &[0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(LABEL_DURATION.to_string()),
            LABEL_DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a finished label job (`success`, `no_session`, `failed`).
pub fn record_label_job(outcome: &'static str) {
    metrics::counter!("label_jobs_total", "outcome" => outcome).increment(1);
}

/// Record the wall time of one label protocol run.
pub fn record_label_duration(duration_secs: f64) {
    metrics::histogram!(LABEL_DURATION).record(duration_secs);
}

/// Record a finished session job (`success`, `cannot_login`, `failed`).
pub fn record_session_job(outcome: &'static str) {
    metrics::counter!("session_jobs_total", "outcome" => outcome).increment(1);
}

/// Record one postage purchase attempt (`success`, `failed`).
pub fn record_top_up(outcome: &'static str) {
    metrics::counter!("top_up_attempts_total", "outcome" => outcome).increment(1);
}

/// Record an account removed after a login rejection.
pub fn record_account_removed() {
    metrics::counter!("accounts_removed_total").increment(1);
}
