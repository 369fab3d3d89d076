//! Directory listing and navigation handlers

use super::{required, CidParams};
use crate::{ApiError, AppState};
use axum::{
    extract::{Query, State},
    response::Json,
};
use cidrelay_resolver::listing::split_ls_line;
use cidrelay_resolver::{DirectoryEntry, ResolverError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const UNLISTABLE: &str = "Could not list directory contents";

/// Response of `GET /ls`
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub cid: String,
    pub entries: Vec<DirectoryEntry>,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_used: Option<String>,
    pub total_items: usize,
    pub is_directory: bool,
}

/// GET /ls?cid= - List a directory
pub async fn list_directory(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CidParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let cid = required(&params.cid, "Missing CID")?;

    let listing = match state.lister.list_directory(cid).await {
        Ok(listing) => listing,
        Err(ResolverError::NotADirectory(_)) => return Err(ApiError::not_found(UNLISTABLE)),
        Err(e) => return Err(e.into()),
    };

    if listing.listing.is_unparseable() {
        return Err(ApiError::not_found(UNLISTABLE));
    }

    let entries = listing.listing.into_entries();
    Ok(Json(ListResponse {
        total_items: entries.len(),
        method: listing.method.as_str(),
        gateway_used: listing.method.gateway().map(|g| g.name.clone()),
        cid: listing.cid,
        entries,
        is_directory: true,
    }))
}

/// Query of `GET /navigate`
#[derive(Debug, Deserialize)]
pub struct NavigateParams {
    pub parent: Option<String>,
    pub name: Option<String>,
}

/// Response of `GET /navigate`
#[derive(Debug, Serialize)]
pub struct NavigateResponse {
    pub success: bool,
    pub parent_cid: String,
    pub file_name: String,
    pub file_cid: String,
    pub full_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<&'static str>,
}

/// GET /navigate?parent=&name= - CID of a named entry inside a directory
pub async fn navigate(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NavigateParams>,
) -> Result<Json<NavigateResponse>, ApiError> {
    let missing = "Missing parent CID or file name";
    let parent = required(&params.parent, missing)?;
    let name = params
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::bad_request(missing))?;

    let full_path = format!("{}/{}", parent, urlencoding::encode(name));

    match state.node.resolve_path(&format!("/ipfs/{}", full_path)).await {
        Ok(resolved) => {
            let file_cid = resolved.trim_start_matches("/ipfs/").to_string();
            return Ok(Json(NavigateResponse {
                success: true,
                parent_cid: parent.to_string(),
                file_name: name.to_string(),
                file_cid,
                full_path,
                resolved_path: Some(resolved),
                method: None,
            }));
        }
        Err(e) => debug!(error = %e, "Path resolution failed, scanning parent listing"),
    }

    let listing = state.node.ls(parent).await.unwrap_or_else(|e| {
        debug!(error = %e, "Parent listing failed");
        String::new()
    });
    let file_cid = listing
        .lines()
        .filter_map(split_ls_line)
        .find(|(_, _, entry)| *entry == name)
        .map(|(_, hash, _)| hash.to_string())
        .ok_or_else(|| ApiError::not_found("File not found in directory"))?;

    Ok(Json(NavigateResponse {
        success: true,
        parent_cid: parent.to_string(),
        file_name: name.to_string(),
        file_cid,
        full_path,
        resolved_path: None,
        method: Some("ls_lookup"),
    }))
}
