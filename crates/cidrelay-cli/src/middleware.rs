//! HTTP middleware

use axum::{body::Body, http::Request, middleware::Next, response::Response};

/// Logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();
    let gateway = response
        .headers()
        .get(crate::handlers::GATEWAY_USED_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        gateway = %gateway,
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    response
}
