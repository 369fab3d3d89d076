//! Application state

use crate::config::RelayConfig;
use cidrelay_resolver::{
    DirectoryLister, GatewayRegistry, LocalNode, MetadataCache, MultiGatewayResolver,
    ResolutionClient,
};
use std::sync::Arc;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    /// Relay configuration
    pub config: RelayConfig,
    /// Gateway registry, shared with the resolver
    pub registry: Arc<GatewayRegistry>,
    /// Multi-gateway resolver
    pub resolver: MultiGatewayResolver,
    /// Per-CID metadata cache
    pub metadata: MetadataCache<MultiGatewayResolver>,
    /// Directory lister (local node first, then gateways)
    pub lister: DirectoryLister,
    /// Local IPFS node
    pub node: Arc<dyn LocalNode>,
}

impl AppState {
    /// Create state with the node backend named in the configuration
    pub fn new(config: RelayConfig) -> anyhow::Result<Self> {
        let node = config.node.connect()?;
        info!(backend = config.node.backend_name(), "Local node backend ready");
        Self::with_node(config, node)
    }

    /// Create state around an already constructed node
    pub fn with_node(config: RelayConfig, node: Arc<dyn LocalNode>) -> anyhow::Result<Self> {
        let registry = Arc::new(GatewayRegistry::new(config.registry.clone())?);
        let client = ResolutionClient::new(config.client.clone())?;
        let resolver = MultiGatewayResolver::new(Arc::clone(&registry), client);

        let metadata = MetadataCache::new(
            resolver.clone(),
            Arc::clone(&node),
            config.metadata_cache_capacity,
        );
        let lister = DirectoryLister::new(
            resolver.clone(),
            Arc::clone(&node),
            config.listing.clone(),
        );

        info!(
            primary = %registry.current_name(),
            gateways = registry.known().len(),
            "Gateway registry ready"
        );

        Ok(Self {
            config,
            registry,
            resolver,
            metadata,
            lister,
            node,
        })
    }
}
