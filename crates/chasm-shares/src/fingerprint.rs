//! Content fingerprints for tracked files
//!
//! A fingerprint is the SHA-256 digest of a file's full content, encoded as
//! URL-safe base64 (with padding). It is stored next to the share id and
//! checked against reconstructed bytes before anything is written back.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Fingerprint a byte slice in memory.
pub fn fingerprint(data: &[u8]) -> String {
    URL_SAFE.encode(Sha256::digest(data))
}

/// Fingerprint a file from disk.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path)
        .with_context(|| format!("reading file for fingerprint: {}", path.display()))?;
    Ok(fingerprint(&data))
}

/// True if `data` hashes to `expected`.
pub fn fingerprint_matches(expected: &str, data: &[u8]) -> bool {
    fingerprint(data) == expected
}
