//! Local content-addressed chunk store
//!
//! Ciphertext chunks live under a sharded directory derived from their key:
//! `<root>/<k0>/<k1>/<k2..31>`, two single-byte directory levels and a
//! 60-hex leaf name. Writers materialize through a temp file and an atomic
//! rename, so a partial chunk file is never visible; a racing writer for
//! the same key loses the rename and both end up with identical content.

use crate::index::{Index, INDEX_FILE};
use crate::key::{Key, Op};
use crate::{BitsError, Result};
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Content path for `key` below `root`
pub fn shard_path(root: &Path, key: &Key) -> PathBuf {
    let hex = key.to_hex();
    root.join(&hex[0..2]).join(&hex[2..4]).join(&hex[4..])
}

/// Chunk files plus the secondary key-state index
///
/// Opening the store opens the index; dropping (or calling [`close`]) the
/// store releases it. Flows open the store once per invocation.
///
/// [`close`]: LocalStore::close
pub struct LocalStore {
    root: PathBuf,
    index: Index,
}

impl LocalStore {
    /// Open the store rooted at `root`, creating it if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let index = Index::open(&root.join(INDEX_FILE))?;
        Ok(Self { root, index })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sharded content path for `key`; `mkdir` creates parents idempotently
    pub fn path(&self, key: &Key, mkdir: bool) -> Result<PathBuf> {
        let path = shard_path(&self.root, key);
        if mkdir {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(path)
    }

    /// Whether the content file for `key` is present
    pub async fn has(&self, key: &Key) -> bool {
        tokio::fs::try_exists(shard_path(&self.root, key))
            .await
            .unwrap_or(false)
    }

    /// Read the ciphertext stored for `key`
    pub async fn read(&self, key: &Key) -> Result<Bytes> {
        match tokio::fs::read(shard_path(&self.root, key)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BitsError::NotFound(*key))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically write the ciphertext for `key`, returning the byte count
    ///
    /// The temp file is unlinked on any failure before the rename.
    pub async fn write(&self, key: &Key, data: &[u8]) -> Result<u64> {
        let path = self.path(key, true)?;
        let dir = path
            .parent()
            .ok_or_else(|| BitsError::Io(std::io::Error::other("chunk path has no parent")))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| BitsError::Io(e.error))?;
        Ok(data.len() as u64)
    }

    /// Record `op` against `key` in the secondary index
    pub fn mark(&self, key: &Key, op: Op) -> Result<()> {
        self.index.mark(key, op)
    }

    /// Last operation the index recorded for `key`
    pub fn last_op(&self, key: &Key) -> Result<Option<(Op, u64)>> {
        self.index.last_op(key)
    }

    /// Keys whose last recorded operation is `op`
    pub fn iterate_since(&self, op: Op) -> Result<Vec<(Key, u64)>> {
        self.index.iterate_since(op)
    }

    /// Release the store and its index
    pub fn close(self) {}
}
