//! Configuration for the ticket normalizer.
//!
//! # Versioning
//!
//! The `version` field is mixed into every fingerprint. Any change to the
//! consolidation layout or cleanup rules must bump it so documents produced
//! by different behavior never share a fingerprint (and so never share a
//! cached embedding).
//!
//! ```rust
//! use canonical::NormalizerConfig;
//!
//! let config = NormalizerConfig::default();
//! assert_eq!(config.version, 2);
//! assert_eq!(config.max_bytes, 30_000);
//! assert!(config.normalize_unicode);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CanonicalError;

/// Marker appended to truncated documents.
pub const DEFAULT_TRUNCATION_MARKER: &str = "\n[... truncated]";

/// Default size limit in UTF-8 bytes.
pub const DEFAULT_MAX_BYTES: usize = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Layout version, must be >= 1.
    pub version: u32,
    /// Apply Unicode NFKC normalization to every section.
    pub normalize_unicode: bool,
    /// Maximum size of the canonical text in bytes, marker included.
    pub max_bytes: usize,
    /// Appended when the text is cut.
    pub truncation_marker: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            version: 2,
            normalize_unicode: true,
            max_bytes: DEFAULT_MAX_BYTES,
            truncation_marker: DEFAULT_TRUNCATION_MARKER.to_string(),
        }
    }
}

impl NormalizerConfig {
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn validate(&self) -> Result<(), CanonicalError> {
        if self.version == 0 {
            return Err(CanonicalError::InvalidConfig(
                "config version must be >= 1".into(),
            ));
        }
        if self.max_bytes <= self.truncation_marker.len() {
            return Err(CanonicalError::InvalidConfig(format!(
                "max_bytes ({}) must exceed the truncation marker length ({})",
                self.max_bytes,
                self.truncation_marker.len()
            )));
        }
        Ok(())
    }
}
