//! Local node backend that shells out to the `ipfs` binary

use crate::node::{
    last_cid_line, normalize_relative_path, parse_cumulative_size, FolderEntry, LocalNode,
    Visibility,
};
use crate::{ResolverError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Configuration for the CLI backend
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KuboCliConfig {
    /// Path to the `ipfs` binary
    pub binary: PathBuf,
    /// `IPFS_PATH` for the public repo (inherited from the environment when unset)
    pub public_repo: Option<PathBuf>,
    /// `IPFS_PATH` for the offline private repo
    pub private_repo: Option<PathBuf>,
    /// Directory used to stage uploads before `ipfs add`
    pub staging_dir: Option<PathBuf>,
    /// Timeout for `ipfs ls` (seconds)
    pub ls_timeout_secs: u64,
    /// Timeout for `ipfs object stat` and `ipfs resolve` (seconds)
    pub stat_timeout_secs: u64,
    /// Timeout for `ipfs add` (seconds)
    pub add_timeout_secs: u64,
    /// Timeout for recursive `ipfs add -r` of folder uploads (seconds)
    pub folder_timeout_secs: u64,
    /// Timeout for `ipfs cat` (seconds)
    pub cat_timeout_secs: u64,
    /// Timeout for `ipfs dht provide` (seconds)
    pub provide_timeout_secs: u64,
}

impl Default for KuboCliConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ipfs"),
            public_repo: None,
            private_repo: std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".ipfs-private")),
            staging_dir: None,
            ls_timeout_secs: 90,
            stat_timeout_secs: 60,
            add_timeout_secs: 180,
            folder_timeout_secs: 300,
            cat_timeout_secs: 120,
            provide_timeout_secs: 300,
        }
    }
}

/// Runs `ipfs` subcommands against the configured repos
#[derive(Clone, Debug)]
pub struct KuboCli {
    config: KuboCliConfig,
}

impl KuboCli {
    pub fn new(config: KuboCliConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KuboCliConfig {
        &self.config
    }

    fn repo_for(&self, visibility: Visibility) -> Option<&Path> {
        match visibility {
            Visibility::Public => self.config.public_repo.as_deref(),
            Visibility::Private => self.config.private_repo.as_deref(),
        }
    }

    /// Private operations never touch the network
    fn offline_args<'a>(visibility: Visibility, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = Vec::with_capacity(args.len() + 1);
        if visibility == Visibility::Private {
            full.push("--offline");
        }
        full.extend_from_slice(args);
        full
    }

    fn staging(&self) -> Result<TempDir> {
        Ok(match &self.config.staging_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                tempfile::tempdir_in(dir)?
            }
            None => tempfile::tempdir()?,
        })
    }

    /// Run `ipfs <args>` and return stdout as text
    async fn run(&self, args: &[&str], repo: Option<&Path>, timeout_secs: u64) -> Result<String> {
        let stdout = self.run_raw(args, repo, timeout_secs).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Run `ipfs <args>` and return raw stdout; non-zero exit is an error
    async fn run_raw(&self, args: &[&str], repo: Option<&Path>, timeout_secs: u64) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.config.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(repo) = repo {
            command.env("IPFS_PATH", repo);
        }

        debug!(?args, "Running ipfs command");

        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), command.output())
            .await
            .map_err(|_| {
                ResolverError::Timeout(format!("ipfs {} after {}s", args.join(" "), timeout_secs))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolverError::LocalNode(format!(
                "ipfs {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl LocalNode for KuboCli {
    #[instrument(skip(self))]
    async fn ls(&self, cid: &str) -> Result<String> {
        self.run(&["ls", cid], self.repo_for(Visibility::Public), self.config.ls_timeout_secs)
            .await
    }

    #[instrument(skip(self))]
    async fn cumulative_size(&self, cid: &str) -> Result<u64> {
        let output = self
            .run(
                &["object", "stat", cid],
                self.repo_for(Visibility::Public),
                self.config.stat_timeout_secs,
            )
            .await?;
        parse_cumulative_size(&output).ok_or_else(|| {
            ResolverError::LocalNode(format!("no CumulativeSize in stat output for {}", cid))
        })
    }

    #[instrument(skip(self))]
    async fn resolve_path(&self, path: &str) -> Result<String> {
        let output = self
            .run(
                &["resolve", path],
                self.repo_for(Visibility::Public),
                self.config.stat_timeout_secs,
            )
            .await?;
        Ok(output.trim().to_string())
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn add(&self, data: Bytes, filename: &str, visibility: Visibility) -> Result<String> {
        let staging = self.staging()?;
        let path = staging.path().join(sanitize_filename(filename));
        tokio::fs::write(&path, &data).await?;

        let path_str = path.to_string_lossy();
        let args = Self::offline_args(visibility, &["add", "-Q", &*path_str]);
        let output = self
            .run(&args, self.repo_for(visibility), self.config.add_timeout_secs)
            .await?;

        last_cid_line(&output)
            .map(str::to_string)
            .ok_or_else(|| ResolverError::LocalNode("ipfs add returned no CID".to_string()))
    }

    #[instrument(skip(self, files), fields(files = files.len()))]
    async fn add_folder(&self, files: Vec<FolderEntry>, visibility: Visibility) -> Result<String> {
        let staging = self.staging()?;
        for entry in &files {
            let relative = normalize_relative_path(&entry.path).ok_or_else(|| {
                ResolverError::LocalNode(format!("invalid path in folder: {:?}", entry.path))
            })?;
            let path = staging.path().join(relative);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &entry.data).await?;
        }

        let root = staging.path().to_string_lossy();
        let args = Self::offline_args(visibility, &["add", "-r", "-Q", &*root]);
        let output = self
            .run(&args, self.repo_for(visibility), self.config.folder_timeout_secs)
            .await?;

        last_cid_line(&output)
            .map(str::to_string)
            .ok_or_else(|| ResolverError::LocalNode("ipfs add -r returned no CID".to_string()))
    }

    #[instrument(skip(self))]
    async fn cat(&self, cid: &str, visibility: Visibility) -> Result<Bytes> {
        let args = Self::offline_args(visibility, &["cat", cid]);
        let stdout = self
            .run_raw(&args, self.repo_for(visibility), self.config.cat_timeout_secs)
            .await?;
        Ok(Bytes::from(stdout))
    }

    #[instrument(skip(self))]
    async fn provide(&self, cid: &str) -> Result<()> {
        self.run(
            &["dht", "provide", cid],
            self.repo_for(Visibility::Public),
            self.config.provide_timeout_secs,
        )
        .await
        .map(|_| ())
    }
}

/// Reduce an uploaded file name to a safe single path segment
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
