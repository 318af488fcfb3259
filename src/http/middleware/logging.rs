//! Request logging middleware.

use std::time::Instant;

use crate::http::middleware::{Middleware, Next, Outcome};
use crate::http::request::HttpRequest;
use crate::observability::metrics;

/// Logs one structured event per request and records request metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestLogger;

impl Middleware for RequestLogger {
    fn handle(&self, request: &mut HttpRequest, next: Next<'_>) -> Outcome {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.path().to_string();
        let request_id = request.request_id().clone();
        let peer = request.peer();

        tracing::debug!(request_id = %request_id, method = %method, path = %path, "Request received");

        let outcome = next.run(request);
        let latency_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::info!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    peer = ?peer,
                    status,
                    latency_ms,
                    "Request completed"
                );
                metrics::record_request(method.as_str(), status, start);
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    status = e.status().as_u16(),
                    error = %e,
                    latency_ms,
                    "Request failed"
                );
                metrics::record_request(method.as_str(), e.status().as_u16(), start);
            }
        }
        outcome
    }
}
