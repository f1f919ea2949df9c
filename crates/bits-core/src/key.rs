//! Chunk keys and per-key transfer records
//!
//! A key is the BLAKE3 hash of a chunk's plaintext and doubles as the name
//! under which its ciphertext is stored, locally and remotely.

use crate::{BitsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of a chunk key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Number of characters in a hex-rendered key
pub const KEY_HEX_LEN: usize = KEY_SIZE * 2;

/// A 32-byte chunk address, compared bytewise
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// Create a key from raw bytes
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a key from its 64-character hex rendering
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != KEY_HEX_LEN {
            return Err(BitsError::BadKey(format!(
                "expected {} hex characters, got {}",
                KEY_HEX_LEN,
                s.len()
            )));
        }
        let bytes = hex::decode(s).map_err(|e| BitsError::BadKey(e.to_string()))?;
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// The all-zero key; legal, used as a sentinel in tests
    pub fn zero() -> Self {
        Self([0u8; KEY_SIZE])
    }

    /// Check if this key is all zeros
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Render as 64 lowercase hex characters
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.to_hex())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; KEY_SIZE]> for Key {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<blake3::Hash> for Key {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

/// State transition observed on a key by a transfer flow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Ciphertext shipped to the remote store
    Push,
    /// Ciphertext retrieved from the remote store
    Fetch,
    /// Chunk written into the local store by a split
    Stage,
    /// Key learned from a remote listing
    Index,
}

impl Op {
    /// Stable name of the operation
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Push => "push",
            Op::Fetch => "fetch",
            Op::Stage => "stage",
            Op::Index => "index",
        }
    }

    pub(crate) fn code(self) -> u8 {
        match self {
            Op::Push => 1,
            Op::Fetch => 2,
            Op::Stage => 3,
            Op::Index => 4,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Op::Push),
            2 => Some(Op::Fetch),
            3 => Some(Op::Stage),
            4 => Some(Op::Index),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one key's transition through a flow
///
/// `skipped` means no bytes moved (hit); `copy_n` is the number of bytes
/// transferred when not skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyOp {
    pub op: Op,
    pub key: Key,
    pub skipped: bool,
    pub copy_n: u64,
}

impl KeyOp {
    /// A hit: the key required no transfer
    pub fn hit(op: Op, key: Key) -> Self {
        Self {
            op,
            key,
            skipped: true,
            copy_n: 0,
        }
    }

    /// A transfer of `copy_n` bytes
    pub fn copied(op: Op, key: Key, copy_n: u64) -> Self {
        Self {
            op,
            key,
            skipped: false,
            copy_n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_keys_are_equal() {
        assert_eq!(Key::zero(), Key::zero());
        assert!(Key::zero().is_zero());
    }

    #[test]
    fn modified_key_differs_from_zero() {
        let mut bytes = [0u8; KEY_SIZE];
        bytes[0] = 0x42;
        assert_ne!(Key::new(bytes), Key::zero());
    }

    #[test]
    fn hex_roundtrip() {
        let mut bytes = [0u8; KEY_SIZE];
        bytes[0] = 0x01;
        bytes[31] = 0xff;
        let key = Key::new(bytes);
        let hex = key.to_hex();
        assert_eq!(hex.len(), KEY_HEX_LEN);
        assert_eq!(Key::from_hex(&hex).unwrap(), key);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = Key::from_hex("0123456789abcdef").unwrap_err();
        assert!(matches!(err, BitsError::BadKey(_)));
    }

    #[test]
    fn from_hex_rejects_non_hex() {
        let err = Key::from_hex(&"zz".repeat(32)).unwrap_err();
        assert!(matches!(err, BitsError::BadKey(_)));
    }

    #[test]
    fn ops_have_names() {
        for op in [Op::Push, Op::Fetch, Op::Stage, Op::Index] {
            assert!(!op.as_str().is_empty());
            assert_eq!(Op::from_code(op.code()), Some(op));
        }
        assert_eq!(Op::from_code(0), None);
    }

    #[test]
    fn key_op_fields() {
        let kop = KeyOp::copied(Op::Push, Key::zero(), 100);
        assert_eq!(kop.op, Op::Push);
        assert_eq!(kop.copy_n, 100);
        assert!(!kop.skipped);

        let hit = KeyOp::hit(Op::Fetch, Key::zero());
        assert!(hit.skipped);
        assert_eq!(hit.copy_n, 0);
    }
}
