//! # Ticket normalizer (`canonical`)
//!
//! Turns heterogeneous ticket material into one canonical text document and
//! fingerprints it. This is a pure transformation: no I/O, no network calls.
//!
//! ## What happens
//!
//! 1. Sections are assembled in a fixed order: title, body, structured
//!    fields, issue links, comments (chronological), then attachment-derived
//!    text (attachment order).
//! 2. Each section is NFKC-normalized and whitespace-cleaned. Case is kept.
//! 3. The result is cut to `max_bytes` on a grapheme boundary with a trailing
//!    marker. Truncation is logged with `tracing` and flagged on the document.
//! 4. The fingerprint is a version-aware SHA-256 of the text actually kept.
//!
//! ## Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use canonical::{consolidate, NormalizerConfig};
//! use ingest::Ticket;
//!
//! let a = Ticket::new("GM-1", "Login fails on timeout", "");
//! let b = Ticket::new("GM-2", "Login fails on timeout", "");
//! let cfg = NormalizerConfig::default();
//!
//! let doc_a = consolidate(&a, &HashMap::new(), &cfg).unwrap();
//! let doc_b = consolidate(&b, &HashMap::new(), &cfg).unwrap();
//! assert_eq!(doc_a.fingerprint, doc_b.fingerprint);
//! ```

mod config;
mod document;
mod error;
mod hash;
mod pipeline;
mod whitespace;

pub use crate::config::{NormalizerConfig, DEFAULT_MAX_BYTES, DEFAULT_TRUNCATION_MARKER};
pub use crate::document::ConsolidatedDocument;
pub use crate::error::CanonicalError;
pub use crate::hash::{hash_canonical_bytes, hash_text};
pub use crate::pipeline::{consolidate, truncate_with_marker};
pub use crate::whitespace::{clean_lines, collapse_whitespace};
