//! # Hashing Utilities
//!
//! - **BLAKE3** in `derive_key` mode gives us domain separation for free:
//!   the same bytes hashed under two contexts never collide. Attestation
//!   proposal keys use [`crate::config::ATTESTATION_DOMAIN`].
//! - **SHA-256** is what the outside world hands us as evidence. A proof
//!   reference is usually `sha256(attestation_report.pdf)`.
//!
//! 32-byte digests travel as lowercase hex on the wire; [`parse_hash32`]
//! is the single place that decodes them.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// A 32-byte digest.
pub type Hash32 = [u8; 32];

/// Errors decoding a hex-encoded 32-byte digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashParseError {
    /// Not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Valid hex, wrong length.
    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// SHA-256 of `data` as a `Vec<u8>`.
pub fn sha256(data: &[u8]) -> Vec<u8> {
    sha256_array(data).to_vec()
}

/// SHA-256 of `data` as a fixed-size array. Prefer this one; most callers
/// want a [`Hash32`] anyway.
///
/// # Example
///
/// ```
/// use ballast_protocol::crypto::sha256_array;
///
/// let proof = sha256_array(b"custodian statement 2026-06-30");
/// assert_eq!(proof.len(), 32);
/// ```
pub fn sha256_array(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Plain BLAKE3 of `data`.
pub fn blake3_hash(data: &[u8]) -> Hash32 {
    *blake3::hash(data).as_bytes()
}

/// Domain-separated BLAKE3 over several parts fed in order.
///
/// Uses BLAKE3's `derive_key` mode, so the context string selects a
/// different IV rather than being glued onto the input.
pub fn domain_separated_hash(context: &str, parts: &[&[u8]]) -> Hash32 {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Decodes a 64-character hex string (optional `0x` prefix) into a digest.
pub fn parse_hash32(input: &str) -> Result<Hash32, HashParseError> {
    let trimmed = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(trimmed).map_err(|e| HashParseError::InvalidHex(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(HashParseError::InvalidLength(bytes.len()));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}
