//! HTTP request metrics middleware.

#[cfg(feature = "metrics")]
use std::time::Instant;

#[cfg(feature = "metrics")]
use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};

#[cfg(feature = "metrics")]
use inbox_metrics::{counter, histogram, http as http_metrics, labels};

/// Records `inbox_http_requests_total` and
/// `inbox_http_request_duration_seconds` for every request.
///
/// The endpoint label is the matched route template (`/api/messages/{id}`)
/// so conversation and message ids never become label values.
#[cfg(feature = "metrics")]
pub async fn http_metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = endpoint_label(request.extensions().get::<MatchedPath>());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    counter!(
        http_metrics::REQUESTS_TOTAL,
        labels::ENDPOINT => endpoint.clone(),
        labels::METHOD => method.clone(),
        labels::STATUS => status.clone()
    )
    .increment(1);
    histogram!(
        http_metrics::REQUEST_DURATION_SECONDS,
        labels::ENDPOINT => endpoint,
        labels::METHOD => method,
        labels::STATUS => status
    )
    .record(start.elapsed().as_secs_f64());

    response
}

#[cfg(feature = "metrics")]
fn endpoint_label(matched: Option<&MatchedPath>) -> String {
    matched.map_or_else(|| "unmatched".to_string(), |m| m.as_str().to_string())
}
