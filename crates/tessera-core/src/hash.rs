//! Content hashing and encoding helpers.
//!
//! Every host adapter delegates here so that hashes are identical across
//! runtimes; cache keys computed in a worker must match the ones computed by
//! the main process.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Length of an untruncated content hash in hex characters.
pub const FULL_HASH_LENGTH: usize = 64;

/// Hash `content` with SHA-256 and return the lowercase hex digest.
///
/// When `length` is given the digest is truncated to that many hex
/// characters (a length beyond the full digest returns the full digest).
pub fn generate_content_hash(content: &[u8], length: Option<usize>) -> String {
    let mut hex = format!("{:x}", Sha256::digest(content));
    if let Some(len) = length {
        hex.truncate(len);
    }
    hex
}

/// Standard base64 encoding of a UTF-8 string.
pub fn encode_to_base64(input: &str) -> String {
    STANDARD.encode(input.as_bytes())
}
