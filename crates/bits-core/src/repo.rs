//! Repository orchestrator
//!
//! Owns the coordination between the chunking pipeline, the local
//! content-addressed store and a remote chunk store: the Split, Combine,
//! Scan, Fetch, Push and Pull flows. Flows are single-threaded per call;
//! cancellation is dropping the returned future, which unlinks any
//! in-flight temp file and leaves the index at its last committed state.

use crate::chunker::{cdc_error, Chunker};
use crate::codec;
use crate::config::{Conf, DedupScope};
use crate::key::{Key, KeyOp, Op};
use crate::local::{shard_path, LocalStore};
use crate::manifest::{ManifestReader, ManifestWriter, MANIFEST_HEADER};
use crate::remote::{parse_listing, Remote};
use crate::{BitsError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::debug;

/// Directory under `.git` holding chunk files and the secondary index
const CHUNK_DIR: &str = "chunks";

/// Source of raw blob contents, bound to the host version control system
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Content of the blob named by the opaque `id`, or `None` when the
    /// host does not know it
    async fn blob(&self, id: &str) -> Result<Option<Bytes>>;
}

/// Tree walker over a host revision
#[async_trait]
pub trait TreeSource: BlobSource {
    /// `(path, blob id)` pairs reachable at `reference`
    async fn blobs_at(&self, reference: &str) -> Result<Vec<(String, String)>>;
}

/// Policy for manifest keys absent from both the local store and the remote
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingChunk {
    /// Fail the flow with `NotFound`
    Fail,
    /// Record a skipped KeyOp and continue
    Skip,
}

/// A working tree with an attached chunk store
#[derive(Debug)]
pub struct Repository {
    workdir: PathBuf,
    chunk_root: PathBuf,
    conf: Conf,
}

impl Repository {
    /// Open the repository at `workdir` with the default configuration
    pub fn open(workdir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_conf(workdir, Conf::default())
    }

    /// Open the repository at `workdir` with an explicit configuration
    pub fn with_conf(workdir: impl Into<PathBuf>, conf: Conf) -> Result<Self> {
        let workdir = workdir.into();
        let git_dir = workdir.join(".git");
        if !git_dir.exists() {
            return Err(BitsError::NotARepository(workdir));
        }
        let chunk_root = git_dir.join(CHUNK_DIR);
        Ok(Self {
            workdir,
            chunk_root,
            conf,
        })
    }

    /// Working tree root
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Root directory of the chunk store
    pub fn chunk_root(&self) -> &Path {
        &self.chunk_root
    }

    /// Active configuration
    pub fn conf(&self) -> &Conf {
        &self.conf
    }

    /// Content path for `key`; `mkdir` creates parent directories idempotently
    pub fn path(&self, key: &Key, mkdir: bool) -> Result<PathBuf> {
        let path = shard_path(&self.chunk_root, key);
        if mkdir {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(path)
    }

    /// Open the local store, including its secondary index
    ///
    /// The caller releases it by dropping (one open per flow invocation).
    pub fn local_store(&self) -> Result<LocalStore> {
        LocalStore::open(&self.chunk_root)
    }

    /// Split `input` into content-defined chunks, sealing and storing each
    /// locally, and write the key manifest to `output`
    ///
    /// An input that already is a manifest is copied through verbatim, so
    /// splitting is a fixed point.
    pub async fn split<R, W>(&self, mut input: R, mut output: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut head = vec![0u8; MANIFEST_HEADER.len()];
        let mut filled = 0;
        while filled < head.len() {
            let n = input.read(&mut head[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        head.truncate(filled);
        if head == MANIFEST_HEADER.as_bytes() {
            output.write_all(&head).await?;
            tokio::io::copy(&mut input, &mut output).await?;
            output.flush().await?;
            return Ok(());
        }

        let store = self.local_store()?;
        let mut writer = ManifestWriter::new(output).await?;
        let chunker = Chunker::new();
        let mut cdc = chunker.stream_cdc(std::io::Cursor::new(head).chain(input));
        let stream = cdc.as_stream();
        futures::pin_mut!(stream);
        while let Some(entry) = stream.next().await {
            let data = entry.map_err(cdc_error)?;
            let (key, ciphertext) = codec::seal(&data.data)?;
            if !store.has(&key).await {
                store.write(&key, &ciphertext).await?;
            }
            store.mark(&key, Op::Stage)?;
            debug!(key = %key, bytes = data.length, "staged chunk");
            writer.write_key(&key).await?;
        }
        let mut output = writer.finish().await?;
        output.flush().await?;
        store.close();
        Ok(())
    }

    /// Reassemble the manifest on `input` into the original bytes
    ///
    /// Chunks are read from the local store, falling back to `remote` when
    /// one is given; a key absent from both fails with `NotFound`.
    pub async fn combine<R, W>(
        &self,
        input: R,
        mut output: W,
        remote: Option<&dyn Remote>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = ManifestReader::new(input);
        while let Some(key) = reader.next_key().await? {
            let ciphertext = self.load_chunk(&key, remote).await?;
            let plaintext = codec::open(&key, &ciphertext)?;
            output.write_all(&plaintext).await?;
        }
        output.flush().await?;
        Ok(())
    }

    async fn load_chunk(&self, key: &Key, remote: Option<&dyn Remote>) -> Result<Bytes> {
        match tokio::fs::read(shard_path(&self.chunk_root, key)).await {
            Ok(data) => return Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match remote {
            Some(remote) => remote.chunk(key).await,
            None => Err(BitsError::NotFound(*key)),
        }
    }

    /// Read host object identifiers from `input`, and for every referenced
    /// blob that is a key manifest emit its keys to `output` as one framed
    /// key stream
    ///
    /// Unknown identifiers and non-manifest blobs are silently skipped;
    /// the output composes with [`Repository::push`] and
    /// [`Repository::fetch`].
    pub async fn scan<R, W>(&self, input: R, output: W, blobs: &dyn BlobSource) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut writer = ManifestWriter::new(output).await?;
        let mut lines = BufReader::new(input).lines();
        while let Some(line) = lines.next_line().await? {
            let id = match line.split_whitespace().next() {
                Some(id) => id,
                None => continue,
            };
            let content = match blobs.blob(id).await? {
                Some(content) => content,
                None => continue,
            };
            for key in manifest_keys(&content).await {
                writer.write_key(&key).await?;
            }
        }
        let mut output = writer.finish().await?;
        output.flush().await?;
        Ok(())
    }

    /// Fetch the chunks named by the manifest on `input` into the local
    /// store, re-emitting the manifest to `output`
    ///
    /// Present chunks are hits; missing ones stream from `remote`. The
    /// returned KeyOps are in manifest order.
    pub async fn fetch<R, W>(
        &self,
        input: R,
        output: W,
        remote: &dyn Remote,
        on_missing: MissingChunk,
    ) -> Result<Vec<KeyOp>>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let store = self.local_store()?;
        let ops = self.fetch_into(&store, input, output, remote, on_missing).await;
        store.close();
        ops
    }

    async fn fetch_into<R, W>(
        &self,
        store: &LocalStore,
        input: R,
        output: W,
        remote: &dyn Remote,
        on_missing: MissingChunk,
    ) -> Result<Vec<KeyOp>>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = ManifestReader::new(input);
        let mut writer = ManifestWriter::new(output).await?;
        let mut ops = Vec::new();
        while let Some(key) = reader.next_key().await? {
            let op = if store.has(&key).await {
                KeyOp::hit(Op::Fetch, key)
            } else {
                match remote.chunk(&key).await {
                    Ok(data) => {
                        let copied = store.write(&key, &data).await?;
                        store.mark(&key, Op::Fetch)?;
                        KeyOp::copied(Op::Fetch, key, copied)
                    }
                    Err(BitsError::NotFound(_)) if on_missing == MissingChunk::Skip => {
                        KeyOp::hit(Op::Fetch, key)
                    }
                    Err(e) => return Err(e),
                }
            };
            debug!(key = %key, skipped = op.skipped, copied = op.copy_n, "fetch");
            writer.write_key(&key).await?;
            ops.push(op);
        }
        let mut output = writer.finish().await?;
        output.flush().await?;
        Ok(ops)
    }

    /// Push the chunks named by the manifest on `input` from `store` to
    /// `remote`, skipping keys known present within the deduplication scope
    pub async fn push<R>(
        &self,
        store: &LocalStore,
        input: R,
        remote: &dyn Remote,
    ) -> Result<Vec<KeyOp>>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = ManifestReader::new(input);
        let mut ops = Vec::new();
        while let Some(key) = reader.next_key().await? {
            if known_pushed(store.last_op(&key)?, self.conf.dedup_scope) {
                let op = KeyOp::hit(Op::Push, key);
                debug!(key = %key, skipped = true, "push");
                ops.push(op);
                continue;
            }
            let data = store.read(&key).await?;
            let copied = data.len() as u64;
            remote.put_chunk(&key, data).await?;
            store.mark(&key, Op::Push)?;
            debug!(key = %key, skipped = false, copied, "push");
            ops.push(KeyOp::copied(Op::Push, key, copied));
        }
        Ok(ops)
    }

    /// Record every key the remote lists as known present (`Op::Index`)
    ///
    /// Together with [`DedupScope::Remote`] this lets push skip chunks
    /// another repository already shipped to the same bucket.
    pub async fn index_remote(
        &self,
        store: &LocalStore,
        remote: &dyn Remote,
    ) -> Result<Vec<KeyOp>> {
        let mut listing = std::io::Cursor::new(Vec::new());
        remote.list(&mut listing).await?;
        let mut ops = Vec::new();
        for key in parse_listing(listing.get_ref())? {
            store.mark(&key, Op::Index)?;
            ops.push(KeyOp::hit(Op::Index, key));
        }
        debug!(keys = ops.len(), remote = remote.name(), "indexed remote");
        Ok(ops)
    }

    /// Walk the host tree at `reference`, fetch chunks for every manifest
    /// blob found, and reassemble manifested working-tree files in place
    ///
    /// The fetched manifests are re-emitted to `output`; files are
    /// replaced atomically and only when their on-disk content still is a
    /// manifest.
    pub async fn pull<W>(
        &self,
        reference: &str,
        mut output: W,
        remote: &dyn Remote,
        host: &dyn TreeSource,
    ) -> Result<Vec<KeyOp>>
    where
        W: AsyncWrite + Unpin,
    {
        let mut ops = Vec::new();
        for (path, id) in host.blobs_at(reference).await? {
            let content = match host.blob(&id).await? {
                Some(content) => content,
                None => continue,
            };
            if !content.starts_with(MANIFEST_HEADER.as_bytes()) {
                continue;
            }
            let key_ops = self
                .fetch(&content[..], &mut output, remote, MissingChunk::Fail)
                .await?;
            ops.extend(key_ops);
            self.reassemble(&path, &content, remote).await?;
        }
        output.flush().await?;
        Ok(ops)
    }

    /// Replace the working copy at `path` with the combined bytes when it
    /// currently holds a manifest
    async fn reassemble(&self, path: &str, content: &Bytes, remote: &dyn Remote) -> Result<()> {
        let file = self.workdir.join(path);
        match tokio::fs::read(&file).await {
            Ok(existing) if existing.starts_with(MANIFEST_HEADER.as_bytes()) => {}
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let dir = file
            .parent()
            .ok_or_else(|| BitsError::Io(std::io::Error::other("file path has no parent")))?;
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        let mut sink = tokio::fs::File::create(tmp.path()).await?;
        self.combine(&content[..], &mut sink, Some(remote)).await?;
        sink.sync_all().await?;
        drop(sink);
        tmp.persist(&file).map_err(|e| BitsError::Io(e.error))?;
        debug!(path, "reassembled working copy");
        Ok(())
    }
}

/// Whether the recorded state says the chunk is already present remotely
fn known_pushed(last: Option<(Op, u64)>, scope: DedupScope) -> bool {
    match scope {
        DedupScope::Off => false,
        DedupScope::Repository => matches!(last, Some((Op::Push, _))),
        DedupScope::Remote => matches!(last, Some((Op::Push | Op::Index, _))),
    }
}

/// Keys of `content` when it parses as a complete manifest, empty otherwise
async fn manifest_keys(content: &[u8]) -> Vec<Key> {
    if !content.starts_with(MANIFEST_HEADER.as_bytes()) {
        return Vec::new();
    }
    let mut reader = ManifestReader::new(content);
    let mut keys = Vec::new();
    loop {
        match reader.next_key().await {
            Ok(Some(key)) => keys.push(key),
            Ok(None) => return keys,
            // malformed blobs are skipped, not fatal
            Err(_) => return Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_missing_directory() {
        assert!(Repository::open("/nonexistent/directory").is_err());
    }

    #[test]
    fn open_rejects_non_git_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = Repository::open(dir.path()).unwrap_err();
        assert!(matches!(err, BitsError::NotARepository(_)));
    }

    #[test]
    fn dedup_scope_gates_skipping() {
        let pushed = Some((Op::Push, 1u64));
        let indexed = Some((Op::Index, 1u64));
        let staged = Some((Op::Stage, 1u64));

        assert!(!known_pushed(pushed, DedupScope::Off));
        assert!(known_pushed(pushed, DedupScope::Repository));
        assert!(!known_pushed(indexed, DedupScope::Repository));
        assert!(known_pushed(indexed, DedupScope::Remote));
        assert!(!known_pushed(staged, DedupScope::Remote));
        assert!(!known_pushed(None, DedupScope::Remote));
    }
}
