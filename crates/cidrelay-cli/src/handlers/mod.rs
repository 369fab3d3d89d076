//! HTTP request handlers

pub mod content;
pub mod directory;
pub mod gateway;
pub mod metadata;
pub mod service;
pub mod upload;

pub use content::*;
pub use directory::*;
pub use gateway::*;
pub use metadata::*;
pub use service::*;
pub use upload::*;

use crate::{ApiError, ErrorCode};
use cidrelay_resolver::ResolverError;

/// Response header naming the gateway that served the content
pub const GATEWAY_USED_HEADER: &str = "x-gateway-used";

/// Map a local node failure: timeouts answer 408, anything else 500 with
/// the node's message under `details`
pub(crate) fn node_failure(
    err: ResolverError,
    timeout_message: &str,
    failure_message: &str,
) -> ApiError {
    match err {
        ResolverError::Timeout(_) => ApiError::new(ErrorCode::RequestTimeout, timeout_message),
        e => ApiError::new(ErrorCode::InternalError, failure_message)
            .with_detail("details", e.to_string()),
    }
}

/// Require a non-empty query parameter
pub(crate) fn required<'a>(value: &'a Option<String>, message: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .map(|v| v.trim_matches('/'))
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(message))
}
