//! Prometheus metrics handler

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const LATENCY_BUCKETS: [f64; 10] = [0.05, 0.1, 0.25, 0.5, 0.75, 1.0, 1.5, 2.5, 5.0, 10.0];

/// Initialize the Prometheus metrics exporter
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("_seconds".to_string()), &LATENCY_BUCKETS)?
        .install_recorder()?;

    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(
        "callbot_calls_started_total",
        "Total number of calls started, by direction"
    );
    describe_counter!(
        "callbot_calls_ended_total",
        "Total number of calls ended, by reason"
    );
    describe_counter!(
        "callbot_teardown_failures_total",
        "Calls where every teardown strategy failed"
    );
    describe_counter!(
        "callbot_transfers_total",
        "SIP transfers attempted, by result"
    );
    describe_counter!(
        "callbot_farewells_detected_total",
        "Farewell phrases detected, by speaker"
    );
    describe_histogram!(
        "callbot_end_of_utterance_delay_seconds",
        "Delay between end of speech and turn commit"
    );
    describe_histogram!("callbot_stt_duration_seconds", "Speech-to-text duration");
    describe_histogram!("callbot_llm_ttft_seconds", "LLM time to first token");
    describe_histogram!("callbot_llm_duration_seconds", "LLM completion duration");
    describe_histogram!("callbot_tts_ttfb_seconds", "Text-to-speech time to first byte");
}

/// HTTP metrics handler
pub async fn metrics_handler(
    axum::extract::State(prometheus_handle): axum::extract::State<PrometheusHandle>,
) -> Response {
    let metrics = prometheus_handle.render();
    (StatusCode::OK, metrics).into_response()
}
