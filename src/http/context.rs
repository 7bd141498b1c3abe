use std::time::Instant;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::Response;

use crate::error::AdmitError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    full_body(Bytes::new())
}

/// Accumulates the fields needed to emit one consistent set of
/// metrics/logs at every exit point (success, 4xx, 5xx) instead of
/// duplicating that bookkeeping at each return (§4.3).
pub struct RequestContext {
    route: &'static str,
    start: Instant,
}

impl RequestContext {
    pub fn new(route: &'static str) -> Self {
        metrics::gauge!("tpm_gate_http_requests_in_flight").increment(1.0);
        Self {
            route,
            start: Instant::now(),
        }
    }

    fn finalize_metrics(&self, status: u16) {
        let mut buf = itoa::Buffer::new();
        let status_str = buf.format(status);

        let elapsed = self.start.elapsed().as_secs_f64();
        metrics::gauge!("tpm_gate_http_requests_in_flight").decrement(1.0);
        metrics::histogram!("tpm_gate_http_request_duration_seconds", "route" => self.route)
            .record(elapsed);
        metrics::counter!(
            "tpm_gate_http_requests_total",
            "route" => self.route,
            "status" => status_str.to_owned(),
        )
        .increment(1);
    }

    pub fn json_response(&self, status: StatusCode, body: serde_json::Value) -> Response<BoxBody> {
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        self.finalize_metrics(status.as_u16());
        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(full_body(bytes))
            .unwrap()
    }

    /// Render an `AdmitError` into its wire shape (§7), logging at debug
    /// for expected rate limiting and warn for everything else.
    pub fn error_response(&self, err: &AdmitError) -> Response<BoxBody> {
        if err.is_expected() {
            tracing::debug!("request: route={}, {}", self.route, err);
        } else {
            tracing::warn!("request: route={}, {}", self.route, err);
        }

        let status = err.status();
        let bytes = serde_json::to_vec(&err.to_json()).unwrap_or_default();
        self.finalize_metrics(status.as_u16());

        let mut builder = Response::builder()
            .status(status)
            .header("content-type", "application/json");
        if let Some(retry_after) = err.retry_after() {
            builder = builder.header("retry-after", retry_after.to_string());
        }
        builder.body(full_body(bytes)).unwrap()
    }
}
