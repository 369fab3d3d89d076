//! API error type and JSON error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use cidrelay_resolver::ResolverError;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Error categories exposed over HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    RequestTimeout,
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    Api {
        code: ErrorCode,
        message: String,
        details: Map<String, Value>,
    },

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Create an error with a code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
            details: Map::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Attach an extra field to the JSON body
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Self::Api { details, .. } = &mut self {
            details.insert(key.to_string(), value.into());
        }
        self
    }

    /// Get the error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Api { code, .. } => *code,
            Self::Internal(_) => ErrorCode::InternalError,
            Self::Resolver(e) => match e {
                ResolverError::UnknownGateway { .. } | ResolverError::InvalidCid(_) => {
                    ErrorCode::BadRequest
                }
                ResolverError::AllGatewaysFailed { .. } => ErrorCode::ServiceUnavailable,
                ResolverError::NotADirectory(_) => ErrorCode::NotFound,
                ResolverError::Timeout(_) => ErrorCode::RequestTimeout,
                _ => ErrorCode::InternalError,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error_code().status_code();

        let mut body = Map::new();
        match &self {
            ApiError::Api { details, .. } => body.extend(details.clone()),
            ApiError::Resolver(ResolverError::UnknownGateway { available, .. }) => {
                body.insert("available".to_string(), json!(available));
            }
            _ => {}
        }
        body.insert("error".to_string(), Value::String(self.to_string()));

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        }

        (status, Json(Value::Object(body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ResolverError::UnknownGateway { name: "x".into(), available: vec![] }, StatusCode::BAD_REQUEST)]
    #[case(ResolverError::InvalidCid("empty".into()), StatusCode::BAD_REQUEST)]
    #[case(ResolverError::AllGatewaysFailed { cid: "Qm".into(), attempts: 4 }, StatusCode::SERVICE_UNAVAILABLE)]
    #[case(ResolverError::NotADirectory("Qm".into()), StatusCode::NOT_FOUND)]
    #[case(ResolverError::Timeout("ipfs add".into()), StatusCode::REQUEST_TIMEOUT)]
    #[case(ResolverError::LocalNode("boom".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_resolver_error_status(#[case] error: ResolverError, #[case] expected: StatusCode) {
        assert_eq!(ApiError::from(error).error_code().status_code(), expected);
    }

    #[test]
    fn test_details_are_kept() {
        let err = ApiError::new(ErrorCode::InternalError, "Failed to add to IPFS")
            .with_detail("details", "repo locked");
        match &err {
            ApiError::Api { details, .. } => assert_eq!(details["details"], "repo locked"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "Failed to add to IPFS");
    }
}
