//! Service-level handlers

use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use cidrelay_resolver::HeadResolver;
use serde_json::json;
use std::sync::Arc;

/// Well-known CID fetched by the gateway health check
pub const HEALTH_CHECK_CID: &str = "QmXoypizjW3WknFiJnKLwHCnL72vedxjQkDDP1mXWo6uco";

/// HEAD / - Health check
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /health - Check the gateways with a well-known CID
pub async fn gateway_health(State(state): State<Arc<AppState>>) -> Response {
    let primary = state.registry.current().base_url;

    match state.resolver.resolve_head(HEALTH_CHECK_CID).await {
        Ok(head) => Json(json!({
            "status": "healthy",
            "primary_gateway": primary,
            "gateway_used": head.gateway.name,
            "response_code": head.status,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "error": e.to_string(),
                "primary_gateway": primary,
            })),
        )
            .into_response(),
    }
}
