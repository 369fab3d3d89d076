//! Local IPFS node collaborator
//!
//! The resolver only needs a handful of capabilities from the local node:
//! line-oriented directory listings, cumulative sizes and path resolution,
//! plus adding, reading and announcing content. Two backends are provided: the `ipfs`
//! command-line binary ([`KuboCli`]) and the Kubo HTTP RPC API ([`KuboApi`]).

use crate::kubo_api::{KuboApi, KuboApiConfig};
use crate::kubo_cli::{KuboCli, KuboCliConfig};
use crate::{ResolverError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Which repository an upload goes to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Networked repo; content is announced to the DHT after upload
    #[default]
    Public,
    /// Offline repo; content never leaves this node
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(ResolverError::Configuration(format!(
                "unknown visibility: {}",
                other
            ))),
        }
    }
}

/// One file of a folder upload, addressed by its path inside the folder
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderEntry {
    /// Relative path with `/` separators, see [`normalize_relative_path`]
    pub path: String,
    pub data: Bytes,
}

/// Capabilities the resolver consumes from the local node
#[async_trait]
pub trait LocalNode: Send + Sync {
    /// List a directory as `<size> <hash> <name>` lines
    async fn ls(&self, cid: &str) -> Result<String>;

    /// Cumulative size of a CID's DAG in bytes
    async fn cumulative_size(&self, cid: &str) -> Result<u64>;

    /// Resolve an `/ipfs/...` path to its final `/ipfs/<cid>` path
    async fn resolve_path(&self, path: &str) -> Result<String>;

    /// Add content and return its CID
    async fn add(&self, data: Bytes, filename: &str, visibility: Visibility) -> Result<String>;

    /// Add a tree of files recursively and return the CID of its root
    async fn add_folder(&self, files: Vec<FolderEntry>, visibility: Visibility) -> Result<String>;

    /// Read the bytes of a file from the repo of the given visibility
    async fn cat(&self, cid: &str, visibility: Visibility) -> Result<Bytes>;

    /// Announce a CID to the DHT
    async fn provide(&self, cid: &str) -> Result<()>;
}

/// Local node backend selection
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum NodeConfig {
    /// Spawn the `ipfs` binary
    Cli(KuboCliConfig),
    /// Call the Kubo HTTP RPC API
    Api(KuboApiConfig),
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig::Cli(KuboCliConfig::default())
    }
}

impl NodeConfig {
    /// Construct the configured backend
    pub fn connect(&self) -> Result<Arc<dyn LocalNode>> {
        Ok(match self {
            NodeConfig::Cli(config) => Arc::new(KuboCli::new(config.clone())),
            NodeConfig::Api(config) => Arc::new(KuboApi::new(config.clone())?),
        })
    }

    /// Short backend name for logging
    pub fn backend_name(&self) -> &'static str {
        match self {
            NodeConfig::Cli(_) => "cli",
            NodeConfig::Api(_) => "api",
        }
    }
}

/// Extract `CumulativeSize` from `ipfs object stat` output
pub fn parse_cumulative_size(stat_output: &str) -> Option<u64> {
    stat_output.lines().find_map(|line| {
        line.strip_prefix("CumulativeSize:")
            .and_then(|value| value.trim().parse().ok())
    })
}

/// Turn a client-supplied relative path into `a/b/c` form.
///
/// Backslashes count as separators. Empty, `.` and `..` segments are
/// dropped, so the result never escapes the folder root. `None` when nothing
/// is left.
pub fn normalize_relative_path(path: &str) -> Option<String> {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .filter(|segment| !segment.contains('\0'))
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Last non-empty line of `add` output, the CID of the outermost object
pub(crate) fn last_cid_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).filter(|line| !line.is_empty()).last()
}
