//! Gateway registry: known gateways, the switchable primary, and the static
//! fallback order.

use crate::{ResolverError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A named gateway base URL (e.g., "https://ipfs.io/ipfs/")
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gateway {
    pub name: String,
    pub base_url: String,
}

impl Gateway {
    /// Create a gateway entry
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
        }
    }

    /// Full URL for a CID on this gateway
    pub fn url_for(&self, cid: &str) -> String {
        format!("{}{}", self.base_url, cid)
    }
}

/// Registry configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Every known gateway, in display order
    pub gateways: Vec<Gateway>,
    /// Name of the initial primary gateway
    pub primary: String,
    /// Names of the fallback gateways, in priority order
    pub fallbacks: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            gateways: vec![
                Gateway::new("ipfs_io", "https://ipfs.io/ipfs/"),
                Gateway::new("cloudflare", "https://cloudflare-ipfs.com/ipfs/"),
                Gateway::new("pinata", "https://gateway.pinata.cloud/ipfs/"),
                Gateway::new("local", "http://127.0.0.1:8080/ipfs/"),
            ],
            primary: "ipfs_io".to_string(),
            fallbacks: vec![
                "cloudflare".to_string(),
                "pinata".to_string(),
                "local".to_string(),
            ],
        }
    }
}

impl RegistryConfig {
    /// Set the initial primary gateway
    pub fn with_primary(mut self, name: impl Into<String>) -> Self {
        self.primary = name.into();
        self
    }
}

/// Holds the known gateways and the process-wide primary.
///
/// Fallbacks are resolved once at construction and never re-derived, so after
/// a primary switch the candidate list can name the same gateway twice.
#[derive(Debug)]
pub struct GatewayRegistry {
    gateways: Vec<Gateway>,
    primary: RwLock<Gateway>,
    fallbacks: Vec<Gateway>,
}

impl GatewayRegistry {
    /// Build a registry, validating that the primary and fallbacks are known
    pub fn new(config: RegistryConfig) -> Result<Self> {
        if config.gateways.is_empty() {
            return Err(ResolverError::Configuration(
                "at least one gateway must be configured".to_string(),
            ));
        }

        let lookup = |name: &str| {
            config
                .gateways
                .iter()
                .find(|g| g.name == name)
                .cloned()
                .ok_or_else(|| {
                    ResolverError::Configuration(format!("gateway '{}' is not defined", name))
                })
        };

        let primary = lookup(&config.primary)?;
        let fallbacks = config
            .fallbacks
            .iter()
            .map(|name| lookup(name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            gateways: config.gateways,
            primary: RwLock::new(primary),
            fallbacks,
        })
    }

    /// Current primary gateway
    pub fn current(&self) -> Gateway {
        self.primary.read().clone()
    }

    /// Name of the current primary gateway
    pub fn current_name(&self) -> String {
        self.primary.read().name.clone()
    }

    /// Look up a known gateway by name
    pub fn get(&self, name: &str) -> Option<&Gateway> {
        self.gateways.iter().find(|g| g.name == name)
    }

    /// All known gateways
    pub fn known(&self) -> &[Gateway] {
        &self.gateways
    }

    /// Names of all known gateways
    pub fn names(&self) -> Vec<String> {
        self.gateways.iter().map(|g| g.name.clone()).collect()
    }

    /// Static fallback list
    pub fn fallbacks(&self) -> &[Gateway] {
        &self.fallbacks
    }

    /// Switch the primary gateway. Unknown names leave the primary untouched.
    pub fn set_primary(&self, name: &str) -> Result<Gateway> {
        let gateway = self
            .get(name)
            .cloned()
            .ok_or_else(|| ResolverError::UnknownGateway {
                name: name.to_string(),
                available: self.names(),
            })?;

        *self.primary.write() = gateway.clone();
        info!(gateway = %gateway.name, url = %gateway.base_url, "Primary gateway switched");
        Ok(gateway)
    }

    /// Primary first, then the fallbacks in their configured order
    pub fn ordered_candidates(&self) -> Vec<Gateway> {
        let mut candidates = Vec::with_capacity(self.fallbacks.len() + 1);
        candidates.push(self.current());
        candidates.extend(self.fallbacks.iter().cloned());
        candidates
    }
}

impl Default for GatewayRegistry {
    fn default() -> Self {
        let config = RegistryConfig::default();
        let primary = config.gateways[0].clone();
        let fallbacks = config.gateways[1..].to_vec();
        Self {
            gateways: config.gateways,
            primary: RwLock::new(primary),
            fallbacks,
        }
    }
}
