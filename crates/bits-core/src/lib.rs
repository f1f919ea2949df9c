//! # bits-core
//!
//! Content-addressed chunk store backing the `git-bits` extension for
//! large binary files.
//!
//! This crate provides:
//! - **Chunking**: content-defined splitting with rolling-hash boundaries
//! - **Convergent encryption**: key-as-hash AEAD, equal plaintexts yield
//!   equal keys and ciphertexts
//! - **Local store**: sharded content-addressed directory plus an advisory
//!   key-state index
//! - **Transfer flows**: split, combine, scan, fetch, push and pull
//!   between the working tree, the local store and a remote object store
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                  Repository                   │
//! │   split / combine / scan / fetch / push / pull│
//! ├───────────┬───────────────┬───────────────────┤
//! │  Chunker  │  LocalStore   │    Remote trait   │
//! │  + Codec  │  + Index      ├─────────┬─────────┤
//! │           │               │ S3Remote│ Memory  │
//! └───────────┴───────────────┴─────────┴─────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use bits_core::Repository;
//!
//! let repo = Repository::open(std::env::current_dir()?)?;
//! repo.split(tokio::io::stdin(), tokio::io::stdout()).await?;
//! ```

pub mod chunker;
pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod key;
pub mod local;
pub mod manifest;
pub mod remote;
pub mod repo;
pub mod s3;

pub use chunker::{Chunk, Chunker, ChunkerConfig, AVG_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use config::{Conf, DedupScope, Secret};
pub use error::{BitsError, Result};
pub use index::INDEX_FILE;
pub use key::{Key, KeyOp, Op, KEY_HEX_LEN, KEY_SIZE};
pub use local::LocalStore;
pub use manifest::{for_each, ManifestReader, ManifestWriter, MANIFEST_FOOTER, MANIFEST_HEADER};
pub use remote::{MemoryRemote, Remote};
pub use repo::{BlobSource, MissingChunk, Repository, TreeSource};
pub use s3::S3Remote;

/// Expected average chunk size, and the order of magnitude of per-chunk
/// buffering throughout the flows
pub const CHUNK_BUFFER_SIZE: usize = 256 * 1024;
