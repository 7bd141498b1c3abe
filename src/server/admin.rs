use super::AppState;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Serves `/health`, `/ready`, and `/metrics` on the separate admin
/// listener (§4.3), isolated from the hot admission path.
pub async fn handle_admin(
    req: Request<Incoming>,
    state: AppState,
) -> Result<Response<BoxBody>, hyper::Error> {
    match req.uri().path() {
        // §6: 200 `{"status":"healthy"}` when the coordination store
        // answers, 503 the instant it doesn't — this is the one check an
        // operator's liveness probe needs, independent of any key's state.
        "/health" | "/healthz" => {
            if state.engine.is_coordination_healthy().await {
                Ok(Response::builder()
                    .status(200)
                    .body(full_body(r#"{"status":"healthy"}"#))
                    .unwrap())
            } else {
                Ok(Response::builder()
                    .status(503)
                    .body(full_body(r#"{"status":"unhealthy"}"#))
                    .unwrap())
            }
        }

        "/ready" | "/readyz" => {
            let window_seconds = state.engine.window_seconds();
            Ok(Response::builder()
                .status(200)
                .body(full_body(format!(
                    r#"{{"status":"ready","window_seconds":{}}}"#,
                    window_seconds
                )))
                .unwrap())
        }

        "/metrics" => {
            let body = state.metrics.render();
            Ok(Response::builder()
                .status(200)
                .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
                .body(full_body(body))
                .unwrap())
        }

        _ => Ok(Response::builder()
            .status(404)
            .body(full_body(r#"{"error":"not found"}"#))
            .unwrap()),
    }
}
