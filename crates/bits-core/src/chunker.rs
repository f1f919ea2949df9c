//! Content-defined chunking
//!
//! Splits an arbitrary byte stream into chunks whose boundaries are chosen
//! by a rolling-hash predicate (FastCDC), bounded by configured minimum and
//! maximum sizes. The same input always yields the same chunk sequence, and
//! an insertion perturbs only the chunks around it, so repeated content
//! deduplicates across file versions.

use crate::{BitsError, Result, CHUNK_BUFFER_SIZE};
use bytes::Bytes;
use fastcdc::v2020::{self, AsyncStreamCDC};
use futures::StreamExt;
use tokio::io::AsyncRead;

/// Minimum chunk size: 64 KiB
pub const MIN_CHUNK_SIZE: u32 = 64 * 1024;

/// Expected average chunk size
pub const AVG_CHUNK_SIZE: u32 = CHUNK_BUFFER_SIZE as u32;

/// Maximum chunk size: 1 MiB
pub const MAX_CHUNK_SIZE: u32 = 1024 * 1024;

/// Boundary configuration for the splitter
#[derive(Clone, Debug)]
pub struct ChunkerConfig {
    /// No boundary is cut before this many bytes
    pub min_size: u32,
    /// Expected average chunk size
    pub avg_size: u32,
    /// A boundary is forced at this many bytes
    pub max_size: u32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_size: MIN_CHUNK_SIZE,
            avg_size: AVG_CHUNK_SIZE,
            max_size: MAX_CHUNK_SIZE,
        }
    }
}

impl ChunkerConfig {
    /// Validate sizes up front; FastCDC asserts on out-of-range arguments
    pub fn validate(&self) -> Result<()> {
        if !(self.min_size <= self.avg_size && self.avg_size <= self.max_size) {
            return Err(BitsError::Config(
                "chunk sizes must satisfy min <= avg <= max".to_string(),
            ));
        }
        if self.min_size < v2020::MINIMUM_MIN
            || self.min_size > v2020::MINIMUM_MAX
            || self.avg_size < v2020::AVERAGE_MIN
            || self.avg_size > v2020::AVERAGE_MAX
            || self.max_size < v2020::MAXIMUM_MIN
            || self.max_size > v2020::MAXIMUM_MAX
        {
            return Err(BitsError::Config(format!(
                "chunk sizes out of bounds (min={}..={}, avg={}..={}, max={}..={})",
                v2020::MINIMUM_MIN,
                v2020::MINIMUM_MAX,
                v2020::AVERAGE_MIN,
                v2020::AVERAGE_MAX,
                v2020::MAXIMUM_MIN,
                v2020::MAXIMUM_MAX,
            )));
        }
        Ok(())
    }
}

/// A plaintext chunk cut from the input stream
#[derive(Clone, Debug)]
pub struct Chunk {
    /// Offset of the chunk in the original stream
    pub offset: u64,
    /// Chunk content
    pub data: Bytes,
}

/// Streaming content-defined splitter
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a chunker with the default boundaries
    pub fn new() -> Self {
        Self {
            config: ChunkerConfig::default(),
        }
    }

    /// Create a chunker with custom boundaries
    pub fn with_config(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Wrap `source` in a streaming splitter; drive it via `as_stream`
    pub fn stream_cdc<R: AsyncRead + Unpin>(&self, source: R) -> AsyncStreamCDC<R> {
        AsyncStreamCDC::new(
            source,
            self.config.min_size,
            self.config.avg_size,
            self.config.max_size,
        )
    }

    /// Split the whole of `source`, collecting every chunk
    ///
    /// Convenience for bounded inputs; the flows drive `stream_cdc`
    /// directly to keep memory at one chunk.
    pub async fn split_all<R: AsyncRead + Unpin>(&self, source: R) -> Result<Vec<Chunk>> {
        let mut cdc = self.stream_cdc(source);
        let stream = cdc.as_stream();
        futures::pin_mut!(stream);
        let mut chunks = Vec::new();
        while let Some(entry) = stream.next().await {
            let data = entry.map_err(cdc_error)?;
            chunks.push(Chunk {
                offset: data.offset,
                data: Bytes::from(data.data),
            });
        }
        Ok(chunks)
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn cdc_error(err: v2020::Error) -> BitsError {
    match err {
        v2020::Error::IoError(e) => BitsError::Io(e),
        other => BitsError::Io(std::io::Error::other(other.to_string())),
    }
}
