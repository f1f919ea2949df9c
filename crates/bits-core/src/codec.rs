//! Convergent chunk sealing and opening
//!
//! Sealing hashes a chunk's plaintext into its [`Key`] and encrypts the
//! plaintext with ChaCha20-Poly1305 under a key derived deterministically
//! from that hash. Equal plaintexts therefore produce equal keys and equal
//! ciphertexts, which is what makes cross-user deduplication possible while
//! keeping the store operator unable to read chunk content without a
//! plaintext sample.

use crate::key::Key;
use crate::{BitsError, Result};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305,
};

/// Domain separation context for deriving the encryption key from a chunk key
const KEY_CONTEXT: &str = "git-bits 2017-03-01 chunk encryption v1";

// The encryption key is unique per plaintext, so a fixed nonce never
// repeats under the same key.
const NONCE: [u8; 12] = [0u8; 12];

/// Size of the authentication tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

/// Seal a plaintext chunk into its key and ciphertext
pub fn seal(plaintext: &[u8]) -> Result<(Key, Vec<u8>)> {
    let key = Key::from(blake3::hash(plaintext));
    let ciphertext = cipher_for(&key)
        .encrypt(chacha20poly1305::Nonce::from_slice(&NONCE), plaintext)
        .map_err(|_| BitsError::CorruptChunk {
            key,
            reason: "encryption failed".to_string(),
        })?;
    Ok((key, ciphertext))
}

/// Open a ciphertext chunk, verifying both the AEAD tag and the content hash
pub fn open(key: &Key, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let plaintext = cipher_for(key)
        .decrypt(chacha20poly1305::Nonce::from_slice(&NONCE), ciphertext)
        .map_err(|_| BitsError::CorruptChunk {
            key: *key,
            reason: "authentication failed".to_string(),
        })?;
    let digest = Key::from(blake3::hash(&plaintext));
    if digest != *key {
        return Err(BitsError::CorruptChunk {
            key: *key,
            reason: format!("content hash mismatch: got {digest}"),
        });
    }
    Ok(plaintext)
}

fn cipher_for(key: &Key) -> ChaCha20Poly1305 {
    let enc_key = blake3::derive_key(KEY_CONTEXT, key.as_bytes());
    ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&enc_key))
}
