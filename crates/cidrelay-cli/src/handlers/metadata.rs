//! Metadata and text fetch handlers

use super::required;
use crate::{ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use cidrelay_resolver::{HeadResolver, MetadataRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Query carrying a single CID
#[derive(Debug, Deserialize)]
pub struct CidParams {
    pub cid: Option<String>,
}

/// GET /metadata?cid= - Cached size/type record
pub async fn get_metadata(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CidParams>,
) -> Result<Json<MetadataRecord>, ApiError> {
    let cid = required(&params.cid, "Missing CID")?;
    Ok(Json(state.metadata.lookup(cid).await?))
}

/// Response of `GET /fetch/{cid}`
#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub cid: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: Option<String>,
    pub gateway_used: String,
}

/// GET /fetch/{cid} - Content type, plus the body when it is text
pub async fn fetch_cid(
    State(state): State<Arc<AppState>>,
    Path(cid): Path<String>,
) -> Result<Json<FetchResponse>, ApiError> {
    let cid = cid.trim_matches('/').to_string();
    let head = state.resolver.resolve_head(&cid).await?;
    let content_type = head.content_type.unwrap_or_default();

    let text = if content_type.starts_with("text/") {
        match fetch_text(&state, &cid).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(cid = %cid, error = %e, "Failed to get text content");
                None
            }
        }
    } else {
        None
    };

    Ok(Json(FetchResponse {
        cid,
        content_type,
        text,
        gateway_used: head.gateway.name,
    }))
}

async fn fetch_text(state: &AppState, cid: &str) -> Result<String, ApiError> {
    let result = state.resolver.resolve_get(cid).await?;
    let body = result
        .response
        .bytes()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}
