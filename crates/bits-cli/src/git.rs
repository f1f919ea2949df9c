//! Host git bindings
//!
//! The core treats the version control system as an external collaborator;
//! this module binds its contracts (blob access, tree walks, configuration)
//! to the `git` command line.

use async_trait::async_trait;
use bits_core::{BitsError, BlobSource, Conf, Result, Secret, TreeSource};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Git config keys holding the chunk-store configuration
const CONF_KEYS: [&str; 5] = [
    "bits.dedup-scope",
    "bits.s3-bucket",
    "bits.aws-access-key-id",
    "bits.aws-secret-access-key",
    "bits.remote",
];

/// A git repository driven through the `git` binary
pub struct GitHost {
    workdir: PathBuf,
}

impl GitHost {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn git(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .await?;
        if !output.status.success() {
            return Err(BitsError::Io(std::io::Error::other(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }
        Ok(output.stdout)
    }

    /// Read a single config value; `None` when unset
    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let output = Command::new("git")
            .args(["config", "--get", key])
            .current_dir(&self.workdir)
            .output()
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    /// Set a config value in the repository scope
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.git(&["config", key, value]).await?;
        Ok(())
    }

    /// Load the chunk-store configuration from git config
    pub async fn load_conf(&self) -> Result<Conf> {
        let mut conf = Conf::default();
        if let Some(value) = self.config_get(CONF_KEYS[0]).await? {
            conf.dedup_scope = value.parse()?;
        }
        if let Some(value) = self.config_get(CONF_KEYS[1]).await? {
            conf.bucket = value;
        }
        if let Some(value) = self.config_get(CONF_KEYS[2]).await? {
            conf.access_key_id = value;
        }
        if let Some(value) = self.config_get(CONF_KEYS[3]).await? {
            conf.secret_access_key = Secret::new(value);
        }
        Ok(conf)
    }

    /// Persist the chunk-store configuration to git config
    pub async fn store_conf(&self, conf: &Conf) -> Result<()> {
        self.config_set(CONF_KEYS[0], conf.dedup_scope.as_str())
            .await?;
        self.config_set(CONF_KEYS[1], &conf.bucket).await?;
        self.config_set(CONF_KEYS[2], &conf.access_key_id).await?;
        self.config_set(CONF_KEYS[3], conf.secret_access_key.reveal())
            .await?;
        Ok(())
    }

    /// Git remote configured for chunk storage; defaults to `origin`
    pub async fn remote_name(&self) -> Result<String> {
        Ok(self
            .config_get(CONF_KEYS[4])
            .await?
            .unwrap_or_else(|| "origin".to_string()))
    }
}

#[async_trait]
impl BlobSource for GitHost {
    async fn blob(&self, id: &str) -> Result<Option<Bytes>> {
        let output = Command::new("git")
            .args(["cat-file", "blob", id])
            .current_dir(&self.workdir)
            .output()
            .await?;
        if !output.status.success() {
            // ids naming trees, commits or nothing at all are skipped
            return Ok(None);
        }
        Ok(Some(Bytes::from(output.stdout)))
    }
}

#[async_trait]
impl TreeSource for GitHost {
    async fn blobs_at(&self, reference: &str) -> Result<Vec<(String, String)>> {
        let output = self.git(&["ls-tree", "-r", reference]).await?;
        let mut blobs = Vec::new();
        for line in String::from_utf8_lossy(&output).lines() {
            // <mode> <type> <id>\t<path>
            let (meta, path) = match line.split_once('\t') {
                Some(pair) => pair,
                None => continue,
            };
            let mut fields = meta.split_whitespace();
            let _mode = fields.next();
            if fields.next() != Some("blob") {
                continue;
            }
            let id = match fields.next() {
                Some(id) => id,
                None => continue,
            };
            blobs.push((path.to_string(), id.to_string()));
        }
        Ok(blobs)
    }
}
