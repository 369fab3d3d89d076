//! Resolve a CID through the public gateways
//!
//! This example demonstrates:
//! - Building a registry and resolver with default gateways
//! - Looking up cached metadata
//! - Listing a directory
//! - Streaming content in fixed-size chunks
//!
//! Run with: cargo run --example resolve_cid -- <cid>

use cidrelay_resolver::{
    ClientConfig, DirectoryLister, GatewayRegistry, Listing, ListingConfig, MetadataCache,
    MultiGatewayResolver, NodeConfig, ResolutionClient, DEFAULT_CACHE_CAPACITY,
};
use futures::StreamExt;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cid = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "QmXoypizjW3WknFiJnKLwHCnL72vedxjQkDDP1mXWo6uco".to_string());

    let registry = Arc::new(GatewayRegistry::default());
    let client = ResolutionClient::new(ClientConfig::default())?;
    let resolver = MultiGatewayResolver::new(Arc::clone(&registry), client);
    let node = NodeConfig::default().connect()?;

    println!("Primary gateway: {}", registry.current_name());

    // ==================== Metadata ====================

    let cache = MetadataCache::new(resolver.clone(), Arc::clone(&node), DEFAULT_CACHE_CAPACITY);
    let record = cache.lookup(&cid).await?;
    println!(
        "{}: {} bytes, type {}, directory: {}",
        record.cid, record.size, record.content_type, record.is_dir
    );

    // ==================== Listing ====================

    if record.is_dir {
        let lister = DirectoryLister::new(resolver.clone(), node, ListingConfig::default());
        let listing = lister.list_directory(&cid).await?;
        match &listing.listing {
            Listing::Entries(entries) => {
                for entry in entries {
                    println!("   - {} ({}) {}", entry.name, entry.size_human, entry.cid);
                }
            }
            Listing::Empty => println!("   (empty directory)"),
            Listing::Unparseable => println!("   (listing could not be parsed)"),
        }
        return Ok(());
    }

    // ==================== Streaming ====================

    let mut resolved = resolver.resolve_stream(&cid).await?;
    let mut total = 0;
    while let Some(chunk) = resolved.chunks.next().await {
        total += chunk.len();
    }
    println!("Streamed {} bytes from {}", total, resolved.gateway.name);

    Ok(())
}
