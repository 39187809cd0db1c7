//! Fingerprint hashing.
//!
//! ```text
//! SHA-256(version.to_be_bytes() || 0x00 || canonical_text_bytes)
//! ```
//!
//! The version prefix keeps fingerprints from different normalizer versions
//! apart. The ticket id never enters the hash, so two tickets with identical
//! content share a fingerprint.
//!
//! ```rust
//! use canonical::{hash_canonical_bytes, hash_text};
//!
//! assert_eq!(hash_text("hello world").len(), 64);
//! assert_ne!(
//!     hash_canonical_bytes(1, b"hello world"),
//!     hash_canonical_bytes(2, b"hello world"),
//! );
//! ```

use sha2::{Digest, Sha256};

/// Hash arbitrary text with SHA-256 and return a hex digest.
pub fn hash_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Version-aware document fingerprint.
pub fn hash_canonical_bytes(canonical_version: u32, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_version.to_be_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            hash_text("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn canonical_hash_is_stable_and_versioned() {
        let a = hash_canonical_bytes(1, b"login fails on timeout");
        let b = hash_canonical_bytes(1, b"login fails on timeout");
        assert_eq!(a, b);
        assert_ne!(a, hash_canonical_bytes(2, b"login fails on timeout"));
        assert_ne!(a, hash_text("login fails on timeout"));
    }
}
