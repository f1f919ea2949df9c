//! Remote chunk store abstraction
//!
//! The transfer flows treat the remote as a capability with four
//! operations; the object-store adapter satisfies it in production and
//! [`MemoryRemote`] substitutes for it in tests.

use crate::key::Key;
use crate::{BitsError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A store holding ciphertext chunks under their hex-rendered keys
#[async_trait]
pub trait Remote: Send + Sync {
    /// Logical name of the remote (the git remote it is bound to)
    fn name(&self) -> &str;

    /// Stream every present chunk key to `out`, one 64-hex line per key
    async fn list(&self, out: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()>;

    /// Read the ciphertext stored under `key`; `NotFound` when absent
    async fn chunk(&self, key: &Key) -> Result<Bytes>;

    /// Persist `data` as the ciphertext for `key`, visible only once complete
    async fn put_chunk(&self, key: &Key, data: Bytes) -> Result<()>;
}

/// An in-memory remote for tests and local experimentation
#[derive(Clone)]
pub struct MemoryRemote {
    name: String,
    chunks: Arc<DashMap<Key, Bytes>>,
}

impl MemoryRemote {
    /// Create an empty remote with the given logical name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chunks: Arc::new(DashMap::new()),
        }
    }

    /// Number of chunks stored
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Check if the remote holds no chunks
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &Key) -> bool {
        self.chunks.contains_key(key)
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new("origin")
    }
}

#[async_trait]
impl Remote for MemoryRemote {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, out: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        let mut keys: Vec<Key> = self.chunks.iter().map(|entry| *entry.key()).collect();
        keys.sort();
        for key in keys {
            out.write_all(key.to_hex().as_bytes()).await?;
            out.write_all(b"\n").await?;
        }
        out.flush().await?;
        Ok(())
    }

    async fn chunk(&self, key: &Key) -> Result<Bytes> {
        self.chunks
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or(BitsError::NotFound(*key))
    }

    async fn put_chunk(&self, key: &Key, data: Bytes) -> Result<()> {
        self.chunks.insert(*key, data);
        Ok(())
    }
}

/// Parse the hex key lines produced by [`Remote::list`]
pub fn parse_listing(listing: &[u8]) -> Result<Vec<Key>> {
    let mut keys = Vec::new();
    for line in listing.split(|b| *b == b'\n') {
        let line = std::str::from_utf8(line)
            .map_err(|e| BitsError::BadKey(e.to_string()))?
            .trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        keys.push(Key::from_hex(line)?);
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KEY_HEX_LEN;
    use std::io::Cursor;

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let remote = MemoryRemote::new("origin");
        let key = Key::zero();

        remote
            .put_chunk(&key, Bytes::from_static(b"encrypted"))
            .await
            .unwrap();
        assert!(remote.contains(&key));
        assert_eq!(remote.chunk(&key).await.unwrap().as_ref(), b"encrypted");
    }

    #[tokio::test]
    async fn missing_chunk_is_not_found() {
        let remote = MemoryRemote::new("origin");
        let err = remote.chunk(&Key::zero()).await.unwrap_err();
        assert!(matches!(err, BitsError::NotFound(_)));
    }

    #[tokio::test]
    async fn name_is_preserved() {
        assert_eq!(MemoryRemote::new("upstream").name(), "upstream");
        assert_eq!(MemoryRemote::default().name(), "origin");
    }

    #[tokio::test]
    async fn list_emits_hex_lines() {
        let remote = MemoryRemote::new("origin");
        let mut bytes = [0u8; crate::KEY_SIZE];
        bytes[0] = 0x01;
        remote
            .put_chunk(&Key::new(bytes), Bytes::from_static(b"a"))
            .await
            .unwrap();
        remote
            .put_chunk(&Key::zero(), Bytes::from_static(b"b"))
            .await
            .unwrap();

        let mut out = Cursor::new(Vec::new());
        remote.list(&mut out).await.unwrap();
        let listing = out.into_inner();
        let keys = parse_listing(&listing).unwrap();
        assert_eq!(keys.len(), 2);
        // sorted bytewise, so the zero key comes first
        assert_eq!(keys[0], Key::zero());
        for line in String::from_utf8(listing).unwrap().lines() {
            assert_eq!(line.len(), KEY_HEX_LEN);
        }
    }
}
