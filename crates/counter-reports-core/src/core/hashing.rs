// crates/counter-reports-core/src/core/hashing.rs
// ============================================================================
// Module: COUNTER Reports Canonical Hashing
// Description: RFC 8785 JSON canonicalization and title identity hashing.
// Purpose: Derive stable 64-bit identity candidates from title payloads.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Title payloads are canonicalized with RFC 8785 (JCS) so that field order
//! and whitespace never change a title's identity. The identity candidate is
//! the leading eight bytes of the SHA-256 digest, read big-endian.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Returns the SHA-256 digest of raw bytes.
#[must_use]
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0_u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Returns the leading eight digest bytes of `bytes` as a big-endian `u64`.
#[must_use]
pub fn digest_prefix_u64(bytes: &[u8]) -> u64 {
    let digest = sha256(bytes);
    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest[.. 8]);
    u64::from_be_bytes(prefix)
}

/// Hashes the canonical JSON form of a value into a 64-bit identity candidate.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_u64<T: Serialize + ?Sized>(value: &T) -> Result<u64, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(digest_prefix_u64(&bytes))
}
