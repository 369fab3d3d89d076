//! Per-CID metadata cache
//!
//! CIDs address immutable content, so a metadata record computed once is
//! valid for the life of the process. Hits are never re-validated. Two
//! concurrent misses for the same CID both go to the network; the later
//! insert wins.

use crate::node::LocalNode;
use crate::resolver::{normalize_cid, HeadInfo, HeadResolver};
use crate::{ResolverError, Result};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Default number of cached records
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Where a metadata record came from
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetadataSource {
    /// A gateway HEAD response
    Gateway { name: String, url: String },
    /// Local node stat/listing commands
    LocalNode,
}

/// Resolved metadata for a CID
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetadataRecord {
    pub cid: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
    pub is_dir: bool,
    pub source: MetadataSource,
}

/// Memoizes metadata lookups per CID in a bounded LRU
pub struct MetadataCache<R> {
    resolver: R,
    node: Arc<dyn LocalNode>,
    entries: Mutex<LruCache<String, MetadataRecord>>,
}

impl<R: HeadResolver> MetadataCache<R> {
    /// Create a cache holding at most `capacity` records (minimum 1)
    pub fn new(resolver: R, node: Arc<dyn LocalNode>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            resolver,
            node,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Metadata for `cid`, from cache when present
    #[instrument(skip(self))]
    pub async fn lookup(&self, cid: &str) -> Result<MetadataRecord> {
        let cid = normalize_cid(cid)?;

        let cached = self.entries.lock().get(cid).cloned();
        if let Some(record) = cached {
            debug!("Metadata cache hit");
            return Ok(record);
        }

        let record = self.fetch(cid).await?;
        self.entries.lock().put(cid.to_string(), record.clone());
        Ok(record)
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every cached record
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    async fn fetch(&self, cid: &str) -> Result<MetadataRecord> {
        match self.resolver.resolve_head(cid).await {
            Ok(head) => Ok(self.from_head(cid, head).await),
            Err(err) => {
                warn!(error = %err, "Gateway metadata lookup failed, asking local node");
                self.from_local_node(cid, err).await
            }
        }
    }

    async fn from_head(&self, cid: &str, head: HeadInfo) -> MetadataRecord {
        let content_type = head.content_type.unwrap_or_else(|| "unknown".to_string());
        let is_dir = is_directory_type(&content_type);

        let mut size = head.content_length.unwrap_or(0);
        if size == 0 {
            match self.node.cumulative_size(cid).await {
                Ok(cumulative) => size = cumulative,
                Err(e) => debug!(error = %e, "Local cumulative size unavailable"),
            }
        }

        MetadataRecord {
            cid: cid.to_string(),
            size,
            content_type,
            is_dir,
            source: MetadataSource::Gateway {
                name: head.gateway.name,
                url: head.gateway.base_url,
            },
        }
    }

    async fn from_local_node(&self, cid: &str, gateway_err: ResolverError) -> Result<MetadataRecord> {
        let size = self.node.cumulative_size(cid).await;
        let listing = self.node.ls(cid).await;

        if let (Err(stat_err), Err(ls_err)) = (&size, &listing) {
            warn!(stat = %stat_err, ls = %ls_err, "Local node could not describe CID");
            return Err(gateway_err);
        }

        info!("Metadata resolved from local node");
        Ok(MetadataRecord {
            cid: cid.to_string(),
            size: size.unwrap_or(0),
            content_type: "unknown".to_string(),
            is_dir: listing.is_ok_and(|out| !out.trim().is_empty()),
            source: MetadataSource::LocalNode,
        })
    }
}

/// Whether a declared content type denotes a directory
pub fn is_directory_type(content_type: &str) -> bool {
    is_html(content_type) || content_type.to_lowercase().contains("directory")
}

/// Whether a content type is `text/html`, ignoring parameters
pub fn is_html(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("text/html"))
}
