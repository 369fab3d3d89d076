//! Local node backend over the Kubo HTTP RPC API

use crate::node::{last_cid_line, normalize_relative_path, FolderEntry, LocalNode, Visibility};
use crate::{ResolverError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::instrument;

/// Configuration for the Kubo RPC backend
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KuboApiConfig {
    /// RPC API URL (e.g., "http://localhost:5001")
    pub api_url: String,
    /// RPC API URL of an offline node used for private uploads
    pub private_api_url: Option<String>,
    /// Request timeout (seconds)
    pub timeout_secs: u64,
    /// Timeout for DHT announcements (seconds)
    pub provide_timeout_secs: u64,
    /// Timeout for recursive folder adds (seconds)
    pub folder_timeout_secs: u64,
    /// Timeout for reading content with `cat` (seconds)
    pub cat_timeout_secs: u64,
}

impl Default for KuboApiConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5001".to_string(),
            private_api_url: None,
            timeout_secs: 90,
            provide_timeout_secs: 300,
            folder_timeout_secs: 300,
            cat_timeout_secs: 120,
        }
    }
}

impl KuboApiConfig {
    /// Create with a custom API URL
    pub fn with_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Default::default()
        }
    }
}

/// Kubo RPC client
#[derive(Clone)]
pub struct KuboApi {
    client: Client,
    config: KuboApiConfig,
}

impl KuboApi {
    /// Create a new RPC client. No request is made until first use.
    pub fn new(config: KuboApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ResolverError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Node that serves operations of the given visibility
    fn api_url_for(&self, visibility: Visibility) -> Result<&str> {
        match visibility {
            Visibility::Public => Ok(self.config.api_url.as_str()),
            Visibility::Private => self.config.private_api_url.as_deref().ok_or_else(|| {
                ResolverError::Configuration(
                    "private content needs a private node API URL".to_string(),
                )
            }),
        }
    }

    /// POST a multipart form to `/api/v0/add` and return the last reported CID
    async fn post_add(&self, url: &str, form: multipart::Form, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .post(url)
            .multipart(form)
            .timeout(timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(ResolverError::LocalNode(format!("add failed: {}", error.trim())));
        }

        // One JSON object per line; the outermost object comes last
        let body = response.text().await?;
        let line = last_cid_line(&body)
            .ok_or_else(|| ResolverError::LocalNode("add returned no CID".to_string()))?;
        let added: AddResponse = serde_json::from_str(line)?;
        Ok(added.hash)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        api_url: &str,
        endpoint: &str,
        arg: &str,
    ) -> Result<T> {
        let url = format!("{}/api/v0/{}", api_url, endpoint);
        let response = self.client.post(&url).query(&[("arg", arg)]).send().await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(ResolverError::LocalNode(format!(
                "{} failed: {}",
                endpoint,
                error.trim()
            )));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl LocalNode for KuboApi {
    #[instrument(skip(self))]
    async fn ls(&self, cid: &str) -> Result<String> {
        let result: LsResponse = self.call(&self.config.api_url, "ls", cid).await?;
        Ok(render_ls_lines(&result))
    }

    #[instrument(skip(self))]
    async fn cumulative_size(&self, cid: &str) -> Result<u64> {
        let stat: ObjectStat = self.call(&self.config.api_url, "object/stat", cid).await?;
        Ok(stat.cumulative_size)
    }

    #[instrument(skip(self))]
    async fn resolve_path(&self, path: &str) -> Result<String> {
        let resolved: ResolveResponse = self.call(&self.config.api_url, "resolve", path).await?;
        Ok(resolved.path)
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn add(&self, data: Bytes, filename: &str, visibility: Visibility) -> Result<String> {
        let url = format!("{}/api/v0/add?quieter=true", self.api_url_for(visibility)?);
        let form = multipart::Form::new().part("file", file_part(data, filename)?);
        self.post_add(&url, form, Duration::from_secs(self.config.timeout_secs))
            .await
    }

    #[instrument(skip(self, files), fields(files = files.len()))]
    async fn add_folder(&self, files: Vec<FolderEntry>, visibility: Visibility) -> Result<String> {
        let url = format!(
            "{}/api/v0/add?recursive=true&wrap-with-directory=true&quieter=true",
            self.api_url_for(visibility)?
        );

        let mut paths = Vec::with_capacity(files.len());
        for entry in files {
            let path = normalize_relative_path(&entry.path).ok_or_else(|| {
                ResolverError::LocalNode(format!("invalid path in folder: {:?}", entry.path))
            })?;
            paths.push((path, entry.data));
        }

        // Parent directories are sent as their own parts, before their files
        let directories: BTreeSet<String> = paths
            .iter()
            .flat_map(|(path, _)| {
                path.match_indices('/')
                    .map(|(idx, _)| path[..idx].to_string())
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut form = multipart::Form::new();
        for directory in directories {
            let part = multipart::Part::bytes(Vec::new())
                .file_name(urlencoding::encode(&directory).into_owned())
                .mime_str(DIRECTORY_PART_TYPE)
                .map_err(|e| ResolverError::LocalNode(e.to_string()))?;
            form = form.part("file", part);
        }
        for (path, data) in paths {
            form = form.part("file", file_part(data, &path)?);
        }

        self.post_add(&url, form, Duration::from_secs(self.config.folder_timeout_secs))
            .await
    }

    #[instrument(skip(self))]
    async fn cat(&self, cid: &str, visibility: Visibility) -> Result<Bytes> {
        let url = format!("{}/api/v0/cat", self.api_url_for(visibility)?);
        let response = self
            .client
            .post(&url)
            .query(&[("arg", cid)])
            .timeout(Duration::from_secs(self.config.cat_timeout_secs))
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(ResolverError::LocalNode(format!("cat failed: {}", error.trim())));
        }
        Ok(response.bytes().await?)
    }

    #[instrument(skip(self))]
    async fn provide(&self, cid: &str) -> Result<()> {
        let url = format!("{}/api/v0/routing/provide", self.config.api_url);
        let response = self
            .client
            .post(&url)
            .query(&[("arg", cid)])
            .timeout(Duration::from_secs(self.config.provide_timeout_secs))
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(ResolverError::LocalNode(format!("provide failed: {}", error.trim())));
        }
        Ok(())
    }
}

/// Render an `ls` response the way `ipfs ls` prints it: one
/// `<size> <hash> <name>` line per link, directories suffixed with `/`.
pub fn render_ls_lines(response: &LsResponse) -> String {
    let mut out = String::new();
    for object in &response.objects {
        for link in &object.links {
            let suffix = if link.link_type == LINK_TYPE_DIRECTORY { "/" } else { "" };
            let _ = writeln!(out, "{} {} {}{}", link.size, link.hash, link.name, suffix);
        }
    }
    out
}

const LINK_TYPE_DIRECTORY: i32 = 1;
const DIRECTORY_PART_TYPE: &str = "application/x-directory";

/// Multipart file part; Kubo unescapes part file names, so they go encoded
fn file_part(data: Bytes, path: &str) -> Result<multipart::Part> {
    multipart::Part::bytes(data.to_vec())
        .file_name(urlencoding::encode(path).into_owned())
        .mime_str("application/octet-stream")
        .map_err(|e| ResolverError::LocalNode(e.to_string()))
}

/// Response from /api/v0/ls
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LsResponse {
    pub objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LsObject {
    pub hash: String,
    #[serde(default)]
    pub links: Vec<LsLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LsLink {
    pub name: String,
    pub hash: String,
    pub size: u64,
    #[serde(rename = "Type")]
    pub link_type: i32,
}

/// Response from /api/v0/object/stat
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectStat {
    pub hash: String,
    pub cumulative_size: u64,
}

/// Response from /api/v0/resolve
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolveResponse {
    pub path: String,
}

/// Response from /api/v0/add
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddResponse {
    pub name: String,
    pub hash: String,
    pub size: String,
}
