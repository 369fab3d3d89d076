//! # cidrelay resolver
//!
//! Content resolution for IPFS CIDs across several public HTTP gateways.
//!
//! This crate provides:
//! - **Gateway registry**: A switchable primary plus a static fallback list
//! - **Resolution**: Primary-then-fallback requests, first 200 wins
//! - **Metadata**: Per-CID size/type records, memoized in an LRU
//! - **Listings**: Directory entries from `ipfs ls` output or gateway HTML
//! - **Local node**: Single-file and folder uploads, private reads, DHT announcements
//! - **Streaming**: Upstream bodies re-chunked into fixed 8 KiB pieces
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                 HTTP surface                  │
//! ├───────────────┬─────────────────┬─────────────┤
//! │ MetadataCache │ DirectoryLister │ChunkedStream│
//! ├───────────────┴─────────────────┴─────────────┤
//! │             MultiGatewayResolver              │
//! ├───────────────────────┬───────────────────────┤
//! │    GatewayRegistry    │   ResolutionClient    │
//! ├───────────────────────┴───────────────────────┤
//! │     Remote gateways     │   LocalNode (Kubo)  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use cidrelay_resolver::{ClientConfig, GatewayRegistry, MultiGatewayResolver, ResolutionClient};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(GatewayRegistry::default());
//! let client = ResolutionClient::new(ClientConfig::default())?;
//! let resolver = MultiGatewayResolver::new(registry, client);
//! let stream = resolver.resolve_stream("QmHash").await?;
//! ```

pub mod announce;
pub mod client;
pub mod error;
pub mod kubo_api;
pub mod kubo_cli;
pub mod listing;
pub mod metadata;
pub mod node;
pub mod preview;
pub mod registry;
pub mod resolver;
pub mod stream;

pub use announce::{ProvideTask, PROVIDE_TIMEOUT};
pub use client::{ClientConfig, ResolutionClient, ResolveKind};
pub use error::{ResolverError, Result};
pub use kubo_api::{KuboApi, KuboApiConfig};
pub use kubo_cli::{KuboCli, KuboCliConfig};
pub use listing::{
    DirectoryEntry, DirectoryListing, DirectoryLister, Listing, ListingConfig, ListingMethod,
};
pub use metadata::{MetadataCache, MetadataRecord, MetadataSource, DEFAULT_CACHE_CAPACITY};
pub use node::{normalize_relative_path, FolderEntry, LocalNode, NodeConfig, Visibility};
pub use preview::{PreviewInfo, PreviewType};
pub use registry::{Gateway, GatewayRegistry, RegistryConfig};
pub use resolver::{
    BodyChunks, HeadInfo, HeadResolver, MultiGatewayResolver, ResolutionResult, ResolvedStream,
};
pub use stream::{ChunkedStream, CHUNK_SIZE, STREAM_ERROR_PREFIX};
