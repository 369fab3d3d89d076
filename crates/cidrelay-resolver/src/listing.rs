//! Directory listings from the local node or a gateway's HTML index
//!
//! Both sources are normalized into [`DirectoryEntry`] values. The result
//! distinguishes a directory that is genuinely empty from output that could
//! not be parsed at all, see [`Listing`].

use crate::metadata::is_html;
use crate::node::LocalNode;
use crate::preview::{self, PreviewInfo};
use crate::registry::Gateway;
use crate::resolver::{normalize_cid, MultiGatewayResolver};
use crate::{ResolverError, Result};
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DIRECTORY_TYPE: &str = "directory";
const DEFAULT_TYPE: &str = "application/octet-stream";
const IPFS_PATH_PREFIX: &str = "/ipfs/";

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>(.*?)</a\s*>"#)
        .expect("anchor pattern is valid")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));

/// Limits for the per-entry directory checks of a local listing
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Secondary `ls` calls allowed in flight at once
    pub check_concurrency: usize,
    /// Timeout of one directory check (seconds)
    pub check_timeout_secs: u64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            check_concurrency: 8,
            check_timeout_secs: 30,
        }
    }
}

impl ListingConfig {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

/// One normalized entry of a directory listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub cid: String,
    pub size: u64,
    pub size_human: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub is_directory: bool,
    pub parent_cid: String,
    #[serde(flatten)]
    pub preview: PreviewInfo,
}

impl DirectoryEntry {
    fn new(name: String, cid: String, size: u64, is_directory: bool, parent_cid: &str) -> Self {
        let content_type = if is_directory {
            DIRECTORY_TYPE.to_string()
        } else {
            preview::guess_mime(&name).unwrap_or_else(|| DEFAULT_TYPE.to_string())
        };
        let preview = preview::classify(&name, Some(&content_type));

        Self {
            size_human: preview::format_size(size),
            parent_cid: parent_cid.to_string(),
            name,
            cid,
            size,
            content_type,
            is_directory,
            preview,
        }
    }
}

/// Outcome of parsing a listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Listing {
    /// At least one entry was found
    Entries(Vec<DirectoryEntry>),
    /// The source was well-formed but listed nothing
    Empty,
    /// The source produced output nothing could be read from
    Unparseable,
}

impl Listing {
    fn from_entries(entries: Vec<DirectoryEntry>) -> Self {
        if entries.is_empty() {
            Listing::Empty
        } else {
            Listing::Entries(entries)
        }
    }

    /// Entries, empty for both `Empty` and `Unparseable`
    pub fn entries(&self) -> &[DirectoryEntry] {
        match self {
            Listing::Entries(entries) => entries,
            Listing::Empty | Listing::Unparseable => &[],
        }
    }

    pub fn into_entries(self) -> Vec<DirectoryEntry> {
        match self {
            Listing::Entries(entries) => entries,
            Listing::Empty | Listing::Unparseable => Vec::new(),
        }
    }

    pub fn is_unparseable(&self) -> bool {
        matches!(self, Listing::Unparseable)
    }
}

/// Which source produced a listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListingMethod {
    LocalNode,
    GatewayHtml { gateway: Gateway },
}

impl ListingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingMethod::LocalNode => "local_node",
            ListingMethod::GatewayHtml { .. } => "gateway_html",
        }
    }

    /// Gateway that served the listing, if any
    pub fn gateway(&self) -> Option<&Gateway> {
        match self {
            ListingMethod::LocalNode => None,
            ListingMethod::GatewayHtml { gateway } => Some(gateway),
        }
    }
}

/// A directory listing and where it came from
#[derive(Clone, Debug)]
pub struct DirectoryListing {
    pub cid: String,
    pub listing: Listing,
    pub method: ListingMethod,
}

/// Split an `ipfs ls` line into size, hash and name.
///
/// Only the first two whitespace runs separate fields; the name keeps any
/// inner spaces.
pub fn split_ls_line(line: &str) -> Option<(&str, &str, &str)> {
    let line = line.trim();
    let (size, rest) = line.split_once(char::is_whitespace)?;
    let (hash, name) = rest.trim_start().split_once(char::is_whitespace)?;
    let name = name.trim_start();
    if name.is_empty() {
        return None;
    }
    Some((size, hash, name))
}

/// Parse `ipfs ls` output into entries.
///
/// Blank output is an empty directory. Output in which no line starts with a
/// numeric size is unparseable (error text, banners); otherwise every
/// three-field line is an entry and a non-numeric size reads as 0.
///
/// Each entry is checked for directory-ness with a secondary listing of its
/// hash. At most `config.check_concurrency` checks run at once, each bounded
/// by `config.check_timeout()`; entry order is preserved.
pub async fn parse_ls_output(
    output: &str,
    parent_cid: &str,
    node: &dyn LocalNode,
    config: &ListingConfig,
) -> Listing {
    if output.trim().is_empty() {
        return Listing::Empty;
    }

    let lines: Vec<(&str, &str, &str)> = output.lines().filter_map(split_ls_line).collect();
    if !lines.iter().any(|(size, _, _)| size.parse::<u64>().is_ok()) {
        return Listing::Unparseable;
    }

    let timeout = config.check_timeout();
    let checks: Vec<_> = lines
        .iter()
        .map(|&(_, hash, _)| async move {
            match tokio::time::timeout(timeout, node.ls(hash)).await {
                Ok(Ok(out)) => !out.trim().is_empty(),
                Ok(Err(_)) => false,
                Err(_) => {
                    debug!(cid = hash, "Directory check timed out");
                    false
                }
            }
        })
        .collect();
    let directory_flags: Vec<bool> = stream::iter(checks)
    .buffered(config.check_concurrency.max(1))
    .collect()
    .await;

    let entries = lines
        .into_iter()
        .zip(directory_flags)
        .map(|((size, hash, name), is_directory)| {
            let size = size.parse().unwrap_or(0);
            DirectoryEntry::new(name.to_string(), hash.to_string(), size, is_directory, parent_cid)
        })
        .collect();

    Listing::from_entries(entries)
}

/// Parse a gateway's HTML directory index.
///
/// Anchors whose `href` starts with `/ipfs/` are entries. A page with no
/// such anchor is unparseable; one whose anchors are all `.`/`..` is empty.
pub fn parse_html_index(html: &str, parent_cid: &str) -> Listing {
    let mut saw_ipfs_anchor = false;
    let mut entries = Vec::new();

    for caps in ANCHOR_RE.captures_iter(html) {
        let Some(href) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let href = decode_entities(href.as_str());
        let Some(target) = href.strip_prefix(IPFS_PATH_PREFIX) else {
            continue;
        };
        let target = target.split(['?', '#']).next().unwrap_or_default();
        if target.is_empty() {
            continue;
        }
        saw_ipfs_anchor = true;

        let text = decode_entities(&TAG_RE.replace_all(&caps[3], ""));
        let text = text.trim();
        if text.is_empty() || text == "." || text == ".." {
            continue;
        }

        let is_directory = text.ends_with('/');
        let name = text.trim_end_matches('/').to_string();
        let cid = target.rsplit('/').next().unwrap_or(target).to_string();

        entries.push(DirectoryEntry::new(name, cid, 0, is_directory, parent_cid));
    }

    if !saw_ipfs_anchor {
        return Listing::Unparseable;
    }
    Listing::from_entries(entries)
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail.find(';').and_then(|end| {
            let entity = &tail[1..end];
            decode_entity(entity).map(|ch| (ch, end + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

/// Lists directories, local node first, then gateway HTML indexes
#[derive(Clone)]
pub struct DirectoryLister {
    resolver: MultiGatewayResolver,
    node: Arc<dyn LocalNode>,
    config: ListingConfig,
}

impl DirectoryLister {
    pub fn new(resolver: MultiGatewayResolver, node: Arc<dyn LocalNode>, config: ListingConfig) -> Self {
        Self {
            resolver,
            node,
            config,
        }
    }

    /// List the entries of `cid`
    #[instrument(skip(self))]
    pub async fn list_directory(&self, cid: &str) -> Result<DirectoryListing> {
        let cid = normalize_cid(cid)?;

        match self.node.ls(cid).await {
            Ok(output) => {
                debug!("Listing from local node");
                return Ok(DirectoryListing {
                    cid: cid.to_string(),
                    listing: parse_ls_output(&output, cid, self.node.as_ref(), &self.config).await,
                    method: ListingMethod::LocalNode,
                });
            }
            Err(e) => warn!(error = %e, "Local listing failed, trying gateways"),
        }

        let result = self.resolver.resolve_get(cid).await?;
        if !result.content_type().is_some_and(is_html) {
            return Err(ResolverError::NotADirectory(cid.to_string()));
        }

        let gateway = result.gateway;
        let html = result.response.text().await?;
        Ok(DirectoryListing {
            cid: cid.to_string(),
            listing: parse_html_index(&html, cid),
            method: ListingMethod::GatewayHtml { gateway },
        })
    }
}
