use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for latency metrics (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`, `gauge!`,
/// `histogram!`) can be used anywhere in the codebase. The `PrometheusHandle`
/// is retained solely for rendering the `/metrics` endpoint.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    ///
    /// Must be called **once** at startup before any `counter!` / `gauge!` /
    /// `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        // request path
        describe_counter!(
            "tpm_gate_http_requests_total",
            Unit::Count,
            "Total HTTP requests processed, by route and outcome"
        );
        describe_histogram!(
            "tpm_gate_http_request_duration_seconds",
            Unit::Seconds,
            "Total request duration from client perspective"
        );
        describe_gauge!(
            "tpm_gate_http_requests_in_flight",
            Unit::Count,
            "Number of requests currently being processed"
        );

        // admission
        describe_counter!(
            "tpm_gate_admissions_total",
            Unit::Count,
            "Total admission decisions, by outcome and dimension"
        );
        describe_histogram!(
            "tpm_gate_coordination_round_trip_seconds",
            Unit::Seconds,
            "Coordination store round trip latency for admit/reconcile"
        );
        describe_counter!(
            "tpm_gate_reconciles_total",
            Unit::Count,
            "Total output-token reconciliations issued"
        );

        // coordination store health
        describe_counter!(
            "tpm_gate_coordination_errors_total",
            Unit::Count,
            "Total coordination store errors, by operation"
        );

        // connections
        describe_gauge!(
            "tpm_gate_connections_active",
            Unit::Count,
            "Number of active downstream connections"
        );
        describe_counter!(
            "tpm_gate_connections_total",
            Unit::Count,
            "Total connections accepted"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
