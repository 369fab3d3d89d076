//! Error types for the cidrelay-resolver crate

use thiserror::Error;

/// Result type alias using `ResolverError`
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Errors that can occur while resolving content
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Primary switch requested for a gateway name that is not configured
    #[error("unknown gateway: {name}")]
    UnknownGateway { name: String, available: Vec<String> },

    /// Every candidate gateway was tried without a 200 response
    #[error("all gateways failed for {cid} ({attempts} attempted)")]
    AllGatewaysFailed { cid: String, attempts: usize },

    /// A single gateway timed out
    #[error("gateway {gateway} timed out after {seconds}s")]
    UpstreamTimeout { gateway: String, seconds: u64 },

    /// A single gateway answered with something other than 200
    #[error("gateway {gateway} answered with status {status}")]
    UpstreamStatus { gateway: String, status: u16 },

    /// Empty or otherwise unusable CID
    #[error("invalid CID: {0}")]
    InvalidCid(String),

    /// The CID resolved to file content, not a directory index
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Local IPFS node command or API call failed
    #[error("local node error: {0}")]
    LocalNode(String),

    /// Timeout error
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ResolverError {
    /// Whether this error ended a resolution after exhausting every gateway
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ResolverError::AllGatewaysFailed { .. })
    }
}

impl From<reqwest::Error> for ResolverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ResolverError::Timeout(err.to_string())
        } else if err.is_connect() {
            ResolverError::Connection(err.to_string())
        } else {
            ResolverError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ResolverError {
    fn from(err: serde_json::Error) -> Self {
        ResolverError::LocalNode(format!("unexpected response: {}", err))
    }
}
