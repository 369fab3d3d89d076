//! Relay configuration

use cidrelay_resolver::{
    ClientConfig, ListingConfig, NodeConfig, RegistryConfig, DEFAULT_CACHE_CAPACITY,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Relay server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Known gateways, primary and fallback order
    pub registry: RegistryConfig,
    /// Upstream request timeouts and pool sizing
    pub client: ClientConfig,
    /// Local IPFS node backend
    pub node: NodeConfig,
    /// Directory checks made while listing from the local node
    pub listing: ListingConfig,
    /// Maximum number of cached metadata records
    pub metadata_cache_capacity: usize,
    /// Maximum request body size (bytes), bounds uploads
    pub max_body_size: usize,
    /// Timeout for background DHT announcements (seconds)
    pub provide_timeout_secs: u64,
    /// Enable CORS
    pub cors_enabled: bool,
    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            registry: RegistryConfig::default(),
            client: ClientConfig::default(),
            node: NodeConfig::default(),
            listing: ListingConfig::default(),
            metadata_cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_body_size: 1024 * 1024 * 1024, // 1 GB
            provide_timeout_secs: 300,
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl RelayConfig {
    /// Layer defaults, an optional TOML/JSON/YAML file and `CIDRELAY__*`
    /// environment variables (`__` separates nested keys, e.g.
    /// `CIDRELAY__REGISTRY__PRIMARY=pinata`).
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("CIDRELAY")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn provide_timeout(&self) -> Duration {
        Duration::from_secs(self.provide_timeout_secs)
    }
}
