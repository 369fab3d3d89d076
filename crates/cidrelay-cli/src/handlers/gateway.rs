//! Gateway selection handlers

use crate::{ApiError, AppState};
use axum::{extract::State, response::Json};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Body of `POST /gateway`
#[derive(Debug, Deserialize)]
pub struct SetGatewayRequest {
    #[serde(default = "default_gateway")]
    pub gateway: String,
}

fn default_gateway() -> String {
    "ipfs_io".to_string()
}

/// GET /gateway - Current primary and every known gateway
pub async fn get_gateway(State(state): State<Arc<AppState>>) -> Json<Value> {
    let current = state.registry.current();
    let available: Map<String, Value> = state
        .registry
        .known()
        .iter()
        .map(|g| (g.name.clone(), Value::String(g.base_url.clone())))
        .collect();

    Json(json!({
        "current_gateway": current.name,
        "url": current.base_url,
        "available_gateways": available,
    }))
}

/// POST /gateway - Switch the primary gateway
pub async fn set_gateway(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetGatewayRequest>,
) -> Result<Json<Value>, ApiError> {
    let gateway = state.registry.set_primary(&request.gateway)?;

    Ok(Json(json!({
        "message": format!("Gateway switched to {}", gateway.name),
        "url": gateway.base_url,
    })))
}
