//! Error types for the bits-core crate

use crate::key::Key;
use thiserror::Error;

/// Result type alias using `BitsError`
pub type Result<T> = std::result::Result<T, BitsError>;

/// Errors that can occur while splitting, combining or transferring chunks
#[derive(Error, Debug)]
pub enum BitsError {
    /// Manifest framing is missing or mismatched
    #[error("bad manifest: {0}")]
    BadManifest(String),

    /// A key line is not exactly 64 hex characters
    #[error("bad key: {0}")]
    BadKey(String),

    /// The stream ended before the footer line
    #[error("truncated manifest: stream ended before the footer line")]
    TruncatedManifest,

    /// AEAD authentication failed or the plaintext hash does not match the key
    #[error("corrupt chunk {key}: {reason}")]
    CorruptChunk { key: Key, reason: String },

    /// Key absent from the local store and from the remote
    #[error("chunk not found: {0}")]
    NotFound(Key),

    /// Transport, auth or server failure from the object store
    #[error("remote error: {0}")]
    Remote(String),

    /// A `for_each` callback returned an error; the original message is preserved
    #[error("key callback failed: {0}")]
    Callback(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Secondary index failure
    #[error("index error: {0}")]
    Index(String),

    /// The given directory is not inside a git repository
    #[error("not a git repository: {}", .0.display())]
    NotARepository(std::path::PathBuf),

    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
