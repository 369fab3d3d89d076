//! Content relay handlers
//!
//! Public content is resolved through the gateway fallback chain and the
//! upstream body is relayed in 8 KiB chunks. Inline responses may be cached
//! by the browser; attachments carry a `Content-Disposition` filename.
//! Private content is read from the offline repo of the local node.

use super::{node_failure, required, GATEWAY_USED_HEADER};
use crate::{ApiError, AppState};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use cidrelay_resolver::preview::{extension_for_mime, guess_mime, sniff_mime};
use cidrelay_resolver::{ResolvedStream, Visibility};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const INLINE_CACHE_CONTROL: &str = "public, max-age=3600";

/// Query of `/preview`, `/download` and `/content`
#[derive(Debug, Deserialize)]
pub struct ContentParams {
    pub cid: Option<String>,
    pub filename: Option<String>,
}

/// Query of `/preview-file`
#[derive(Debug, Deserialize)]
pub struct PreviewFileParams {
    pub file_cid: Option<String>,
    pub parent_cid: Option<String>,
    pub filename: Option<String>,
}

/// How the browser should treat a relayed body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment(String),
}

/// GET /preview?cid= - Inline view
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ContentParams>,
) -> Result<Response, ApiError> {
    let cid = required(&params.cid, "Missing CID")?;
    let resolved = state.resolver.resolve_stream(cid).await?;
    let content_type = upstream_content_type(&resolved);

    relay(resolved, content_type, Disposition::Inline, Vec::new())
}

/// GET /preview-file?file_cid=&parent_cid=&filename= - Inline view of a
/// file inside a directory, typed from its name when the gateway cannot tell
pub async fn preview_file(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PreviewFileParams>,
) -> Result<Response, ApiError> {
    let cid = required(&params.file_cid, "Missing file CID")?;
    let filename = params.filename.as_deref().unwrap_or("file");

    let resolved = state.resolver.resolve_stream(cid).await?;
    let mut content_type = upstream_content_type(&resolved);
    if content_type == DEFAULT_CONTENT_TYPE {
        if let Some(guessed) = guess_mime(filename) {
            content_type = guessed;
        }
    }

    let extra = vec![
        (
            "x-parent-cid",
            params.parent_cid.clone().unwrap_or_else(|| "unknown".to_string()),
        ),
        ("x-filename", filename.to_string()),
    ];
    relay(resolved, content_type, Disposition::Inline, extra)
}

/// GET /download?cid=&filename= - Forced download
pub async fn download(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ContentParams>,
) -> Result<Response, ApiError> {
    let cid = required(&params.cid, "Missing CID")?;
    let resolved = state.resolver.resolve_stream(cid).await?;
    let content_type = upstream_content_type(&resolved);
    let filename = download_filename(cid, params.filename.as_deref(), &content_type);

    relay(resolved, content_type, Disposition::Attachment(filename), Vec::new())
}

/// GET /content?cid=&filename= - Inline for PDFs, images and video,
/// a download for everything else
pub async fn content(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ContentParams>,
) -> Result<Response, ApiError> {
    let cid = required(&params.cid, "Missing CID")?;
    let resolved = state.resolver.resolve_stream(cid).await?;
    let content_type = upstream_content_type(&resolved);

    let disposition = if is_inline_type(&content_type) {
        Disposition::Inline
    } else {
        Disposition::Attachment(download_filename(
            cid,
            params.filename.as_deref(),
            &content_type,
        ))
    };

    relay(resolved, content_type, disposition, Vec::new())
}

/// GET /preview-private/{cid} - Inline view of content held only by the
/// private repo, typed from its leading bytes
pub async fn preview_private(
    State(state): State<Arc<AppState>>,
    Path(cid): Path<String>,
) -> Result<Response, ApiError> {
    let cid = cid.trim().trim_matches('/');
    if cid.is_empty() {
        return Err(ApiError::bad_request("Missing CID"));
    }

    let data = state
        .node
        .cat(cid, Visibility::Private)
        .await
        .map_err(|e| {
            node_failure(
                e,
                "Request timeout - content too large or not available",
                "Failed to read private CID",
            )
        })?;

    let content_type = sniff_mime(&data);
    let filename = format!("{}{}", cid, extension_for_mime(content_type));
    let disposition = format!("inline; filename=\"{}\"", filename.replace(['"', '\\'], "_"));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, header_value(&disposition)?)
        .body(Body::from(data))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Whether `/content` shows this type inline
pub fn is_inline_type(content_type: &str) -> bool {
    content_type == "application/pdf"
        || content_type.starts_with("image/")
        || content_type.starts_with("video/")
}

/// Requested filename, or `<cid><ext>` with the extension taken from the
/// content type
pub fn download_filename(cid: &str, requested: Option<&str>, content_type: &str) -> String {
    match requested.filter(|f| !f.is_empty()) {
        Some(name) => name.to_string(),
        None => format!("{}{}", cid, extension_for_mime(content_type)),
    }
}

fn upstream_content_type(resolved: &ResolvedStream) -> String {
    resolved
        .content_type()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

fn relay(
    resolved: ResolvedStream,
    content_type: String,
    disposition: Disposition,
    extra: Vec<(&'static str, String)>,
) -> Result<Response, ApiError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, header_value(&content_type)?)
        .header(GATEWAY_USED_HEADER, header_value(&resolved.gateway.name)?);

    builder = match disposition {
        Disposition::Inline => builder.header(header::CACHE_CONTROL, INLINE_CACHE_CONTROL),
        Disposition::Attachment(filename) => {
            let quoted = filename.replace(['"', '\\'], "_");
            builder.header(
                header::CONTENT_DISPOSITION,
                header_value(&format!("attachment; filename=\"{}\"", quoted))?,
            )
        }
    };

    for (name, value) in extra {
        builder = builder.header(name, header_value(&value)?);
    }

    let body = Body::from_stream(resolved.chunks.map(Ok::<_, Infallible>));
    builder
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Header value with control characters removed; non-ASCII bytes are kept
fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    let cleaned: String = value.chars().filter(|c| !c.is_control()).collect();
    HeaderValue::from_bytes(cleaned.as_bytes()).map_err(|e| ApiError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("application/pdf", true)]
    #[case("image/png", true)]
    #[case("video/mp4", true)]
    #[case("text/plain", false)]
    #[case("application/zip", false)]
    fn test_is_inline_type(#[case] content_type: &str, #[case] inline: bool) {
        assert_eq!(is_inline_type(content_type), inline);
    }

    #[test]
    fn test_download_filename() {
        assert_eq!(download_filename("QmAbc", Some("report.pdf"), "application/pdf"), "report.pdf");
        assert_eq!(download_filename("QmAbc", None, "application/pdf"), "QmAbc.pdf");
        assert_eq!(download_filename("QmAbc", Some(""), "image/png"), "QmAbc.png");
        assert_eq!(download_filename("QmAbc", None, "application/x-unknown-thing"), "QmAbc");
    }

    #[test]
    fn test_header_value_strips_control_characters() {
        let value = header_value("file\r\nname.txt").unwrap();
        assert_eq!(value.as_bytes(), b"filename.txt");
        assert!(header_value("résumé.pdf").is_ok());
    }
}
