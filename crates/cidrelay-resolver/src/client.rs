//! HTTP client for gateway requests

use crate::registry::Gateway;
use crate::{ResolverError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{redirect, Client, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

/// Kind of request issued against a gateway
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveKind {
    /// HEAD request for headers only
    Head,
    /// Buffered GET
    Get,
    /// GET whose body is consumed incrementally
    Stream,
}

impl ResolveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveKind::Head => "head",
            ResolveKind::Get => "get",
            ResolveKind::Stream => "stream",
        }
    }
}

/// Configuration for the shared gateway client
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Timeout for HEAD requests (seconds)
    pub head_timeout_secs: u64,
    /// Timeout for buffered GET requests (seconds)
    pub get_timeout_secs: u64,
    /// Timeout for streaming GET requests (seconds)
    pub stream_timeout_secs: u64,
    /// Persistent idle connections kept per host
    pub pool_idle_per_host: usize,
    /// Upper bound on concurrently outstanding upstream requests
    pub max_connections: usize,
    /// Retries on connection-level failures against the same host
    pub transport_retries: u32,
    /// User agent sent to gateways
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            head_timeout_secs: 60,
            get_timeout_secs: 90,
            stream_timeout_secs: 120,
            pool_idle_per_host: 20,
            max_connections: 50,
            transport_retries: 5,
            user_agent: "IPFS-Gateway-Client/1.0".to_string(),
        }
    }
}

impl ClientConfig {
    /// Timeout applied to a request of the given kind
    pub fn timeout_for(&self, kind: ResolveKind) -> Duration {
        Duration::from_secs(match kind {
            ResolveKind::Head => self.head_timeout_secs,
            ResolveKind::Get => self.get_timeout_secs,
            ResolveKind::Stream => self.stream_timeout_secs,
        })
    }

    /// Use the same timeout for every request kind
    pub fn with_uniform_timeout(mut self, secs: u64) -> Self {
        self.head_timeout_secs = secs;
        self.get_timeout_secs = secs;
        self.stream_timeout_secs = secs;
        self
    }

    /// Set the number of transport retries
    pub fn with_transport_retries(mut self, retries: u32) -> Self {
        self.transport_retries = retries;
        self
    }
}

/// Shared gateway client. Cloning shares the connection pool.
#[derive(Clone)]
pub struct ResolutionClient {
    client: Client,
    config: ClientConfig,
    permits: Arc<Semaphore>,
}

impl ResolutionClient {
    /// Create a new client
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| ResolverError::Configuration(e.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .redirect(redirect::Policy::limited(10))
            .build()
            .map_err(|e| ResolverError::Connection(e.to_string()))?;

        let permits = Arc::new(Semaphore::new(config.max_connections.max(1)));

        Ok(Self {
            client,
            config,
            permits,
        })
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Issue one request for `cid` against `gateway`.
    ///
    /// Any HTTP status is returned as `Ok`; only transport failures are errors.
    /// Connection failures are retried against the same host up to
    /// `transport_retries` times.
    #[instrument(skip(self, gateway, kind), fields(gateway = %gateway.name, kind = kind.as_str()))]
    pub async fn request(&self, gateway: &Gateway, cid: &str, kind: ResolveKind) -> Result<Response> {
        let url = gateway.url_for(cid);
        let timeout = self.config.timeout_for(kind);
        let mut attempt = 0;

        loop {
            let builder = match kind {
                ResolveKind::Head => self.client.head(&url),
                ResolveKind::Get | ResolveKind::Stream => self.client.get(&url),
            };

            let result = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| ResolverError::Connection(e.to_string()))?;
                builder.timeout(timeout).send().await
            };

            match result {
                Ok(response) => return Ok(response),
                Err(err) if err.is_connect() && attempt < self.config.transport_retries => {
                    attempt += 1;
                    debug!(attempt, error = %err, "Connection failed, retrying same gateway");
                }
                Err(err) => return Err(classify(err, gateway, timeout)),
            }
        }
    }
}

fn classify(err: reqwest::Error, gateway: &Gateway, timeout: Duration) -> ResolverError {
    if err.is_timeout() {
        ResolverError::UpstreamTimeout {
            gateway: gateway.name.clone(),
            seconds: timeout.as_secs(),
        }
    } else {
        ResolverError::from(err)
    }
}
