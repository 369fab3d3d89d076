//! Multi-gateway resolution with primary-then-fallback ordering

use crate::client::{ResolutionClient, ResolveKind};
use crate::registry::{Gateway, GatewayRegistry};
use crate::stream::ChunkedStream;
use crate::{ResolverError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Chunked body of a streamed resolution
pub type BodyChunks = ChunkedStream<BoxStream<'static, reqwest::Result<Bytes>>>;

/// A successful response and the gateway that produced it
#[derive(Debug)]
pub struct ResolutionResult {
    pub response: Response,
    pub gateway: Gateway,
}

impl ResolutionResult {
    /// Declared content type, if any
    pub fn content_type(&self) -> Option<&str> {
        header_str(self.response.headers(), CONTENT_TYPE.as_str())
    }
}

/// Headers of a resolved CID
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadInfo {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub gateway: Gateway,
}

/// A resolved CID whose body is relayed in fixed-size chunks
pub struct ResolvedStream {
    pub status: u16,
    pub headers: HeaderMap,
    pub gateway: Gateway,
    pub chunks: BodyChunks,
}

impl ResolvedStream {
    /// Declared content type, if any
    pub fn content_type(&self) -> Option<&str> {
        header_str(&self.headers, CONTENT_TYPE.as_str())
    }

    /// Declared content length, if any
    pub fn content_length(&self) -> Option<u64> {
        header_str(&self.headers, CONTENT_LENGTH.as_str()).and_then(|v| v.parse().ok())
    }
}

/// HEAD-only resolution, the part of the resolver the metadata cache uses
#[async_trait]
pub trait HeadResolver: Send + Sync {
    async fn resolve_head(&self, cid: &str) -> Result<HeadInfo>;
}

#[async_trait]
impl<T: HeadResolver + ?Sized> HeadResolver for Arc<T> {
    async fn resolve_head(&self, cid: &str) -> Result<HeadInfo> {
        self.as_ref().resolve_head(cid).await
    }
}

/// Trim surrounding slashes and reject empty CIDs
pub fn normalize_cid(cid: &str) -> Result<&str> {
    let trimmed = cid.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(ResolverError::InvalidCid("CID must not be empty".to_string()));
    }
    Ok(trimmed)
}

/// Tries the registry's candidates in order and returns the first 200.
///
/// One attempt per candidate; failures are logged and skipped. Ordering is
/// always registry-defined, never health-based.
#[derive(Clone)]
pub struct MultiGatewayResolver {
    registry: Arc<GatewayRegistry>,
    client: ResolutionClient,
}

impl MultiGatewayResolver {
    pub fn new(registry: Arc<GatewayRegistry>, client: ResolutionClient) -> Self {
        Self { registry, client }
    }

    pub fn registry(&self) -> &Arc<GatewayRegistry> {
        &self.registry
    }

    pub fn client(&self) -> &ResolutionClient {
        &self.client
    }

    /// Resolve `cid` with a request of the given kind
    #[instrument(skip(self))]
    pub async fn resolve(&self, cid: &str, kind: ResolveKind) -> Result<ResolutionResult> {
        let cid = normalize_cid(cid)?;
        let candidates = self.registry.ordered_candidates();
        let attempts = candidates.len();

        for gateway in candidates {
            match self.client.request(&gateway, cid, kind).await {
                Ok(response) if response.status() == StatusCode::OK => {
                    debug!(gateway = %gateway.name, "Gateway resolved CID");
                    return Ok(ResolutionResult { response, gateway });
                }
                Ok(response) => {
                    let failure = ResolverError::UpstreamStatus {
                        gateway: gateway.name.clone(),
                        status: response.status().as_u16(),
                    };
                    warn!(error = %failure, "Gateway failed, trying next");
                }
                Err(err) => {
                    warn!(gateway = %gateway.name, error = %err, "Gateway failed, trying next");
                }
            }
        }

        Err(ResolverError::AllGatewaysFailed {
            cid: cid.to_string(),
            attempts,
        })
    }

    /// Buffered GET resolution
    pub async fn resolve_get(&self, cid: &str) -> Result<ResolutionResult> {
        self.resolve(cid, ResolveKind::Get).await
    }

    /// Streaming GET resolution; the body is relayed in 8 KiB chunks
    pub async fn resolve_stream(&self, cid: &str) -> Result<ResolvedStream> {
        let ResolutionResult { response, gateway } = self.resolve(cid, ResolveKind::Stream).await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let chunks = ChunkedStream::new(response.bytes_stream().boxed());

        Ok(ResolvedStream {
            status,
            headers,
            gateway,
            chunks,
        })
    }
}

#[async_trait]
impl HeadResolver for MultiGatewayResolver {
    async fn resolve_head(&self, cid: &str) -> Result<HeadInfo> {
        let result = self.resolve(cid, ResolveKind::Head).await?;
        let headers = result.response.headers();

        Ok(HeadInfo {
            status: result.response.status().as_u16(),
            content_type: header_str(headers, CONTENT_TYPE.as_str()).map(str::to_string),
            content_length: header_str(headers, CONTENT_LENGTH.as_str())
                .and_then(|v| v.trim().parse().ok()),
            gateway: result.gateway,
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
