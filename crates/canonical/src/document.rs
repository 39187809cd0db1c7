//! The normalizer's output type.

use serde::{Deserialize, Serialize};

/// One ticket's content merged into a single canonical text.
///
/// Created by [`consolidate`](crate::consolidate) and never mutated afterwards.
/// `fingerprint` is computed over `text` exactly as stored here, so for a
/// truncated document it reflects what was kept, not the original.
///
/// ```text
/// ConsolidatedDocument
/// ├── ticket_id: String
/// ├── text: String              # canonical text, marker included if cut
/// ├── fingerprint: String       # hex SHA-256, version-aware
/// ├── canonical_version: u32
/// ├── truncated: bool
/// ├── original_bytes: usize     # length before truncation
/// └── attachment_sections: usize
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedDocument {
    pub ticket_id: String,
    pub text: String,
    pub fingerprint: String,
    pub canonical_version: u32,
    pub truncated: bool,
    pub original_bytes: usize,
    pub attachment_sections: usize,
}

impl ConsolidatedDocument {
    /// Size of the canonical text in bytes.
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }
}
