//! # Ticket vector index
//!
//! Persists one [`IndexEntry`] per ticket (vector plus metadata) and answers
//! nearest-neighbor queries by exact cosine similarity over every entry.
//!
//! ## Core Features
//!
//! - **Pluggable Backends**: [`IndexBackend`] with an in-memory map for tests
//!   and a redb file for production. Each upsert is a single atomic write.
//! - **Fixed dimension**: the vector dimension is written to the backend on
//!   first open. Reopening with another dimension, or upserting a vector of
//!   the wrong length, fails with [`IndexError::DimensionMismatch`].
//! - **Deterministic ordering**: score descending, then newest ticket
//!   creation date, then ticket id.
//! - **Compact storage**: entries are bincode-encoded and zstd-compressed.
//!
//! Decoded vectors are cached in memory at open, so queries never touch the
//! backend. The corpus is bounded; a brute-force scan is fine.
//!
//! ## Example
//!
//! ```
//! use index::{BackendConfig, EntryMetadata, IndexConfig, IndexEntry, QueryRequest, VectorIndex};
//!
//! let index = VectorIndex::open(IndexConfig::new(3).with_backend(BackendConfig::in_memory())).unwrap();
//! index.upsert(&IndexEntry::new("GM-1", "fp-1", vec![1.0, 0.0, 0.0], EntryMetadata::default())).unwrap();
//! index.upsert(&IndexEntry::new("GM-2", "fp-2", vec![0.9, 0.1, 0.0], EntryMetadata::default())).unwrap();
//!
//! let hits = index.query(&QueryRequest::new(&[1.0, 0.0, 0.0], 5).excluding("GM-1")).unwrap();
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].ticket_id, "GM-2");
//! ```

mod backend;
mod query;

#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use backend::{BackendConfig, InMemoryBackend, IndexBackend};
pub use query::{cosine_similarity, MetadataFilter, QueryRequest, SimilarityCandidate};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use bincode::config::standard;
use bincode::error::{DecodeError, EncodeError};
use bincode::serde::{decode_from_slice, encode_to_vec};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use zstd::{decode_all, encode_all};

/// Bump this value whenever the on-disk `IndexEntry` layout changes.
pub const INDEX_SCHEMA_VERSION: u16 = 1;

const DIMENSION_KEY: &str = "dimension";

/// Ticket metadata stored next to the vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub title: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub resolution: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// One ticket's persisted vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub schema_version: u16,
    pub ticket_id: String,
    /// Fingerprint of the document the vector was computed from.
    pub fingerprint: String,
    pub vector: Vec<f32>,
    pub metadata: EntryMetadata,
    /// Canonical text the vector was computed from. Used to adjudicate this
    /// ticket when it shows up as someone else's candidate.
    pub document: String,
}

impl IndexEntry {
    pub fn new(
        ticket_id: impl Into<String>,
        fingerprint: impl Into<String>,
        vector: Vec<f32>,
        metadata: EntryMetadata,
    ) -> Self {
        Self {
            schema_version: INDEX_SCHEMA_VERSION,
            ticket_id: ticket_id.into(),
            fingerprint: fingerprint.into(),
            vector,
            metadata,
            document: String::new(),
        }
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = document.into();
        self
    }
}

/// Compression codec options for index storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CompressionCodec {
    None,
    #[default]
    Zstd,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Zstd level (1-22).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(decode_all(data)?),
        }
    }
}

/// Config for opening the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexConfig {
    pub backend: BackendConfig,
    pub compression: CompressionConfig,
    /// Declared embedding dimension. Every vector must have this length.
    pub dimension: usize,
}

impl IndexConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            backend: BackendConfig::default(),
            compression: CompressionConfig::default(),
            dimension,
        }
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("serialization encode error: {0}")]
    Encode(String),
    #[error("serialization decode error: {0}")]
    Decode(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid vector: {0}")]
    InvalidVector(String),
}

impl From<EncodeError> for IndexError {
    fn from(e: EncodeError) -> Self {
        IndexError::Encode(e.to_string())
    }
}

impl From<DecodeError> for IndexError {
    fn from(e: DecodeError) -> Self {
        IndexError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Compression(e.to_string())
    }
}

impl IndexError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }

    /// Errors that no retry can fix: the deployment is misconfigured.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            IndexError::DimensionMismatch { .. } | IndexError::InvalidVector(_)
        )
    }
}

struct CachedVector {
    vector: Vec<f32>,
    metadata: EntryMetadata,
}

/// Persistent vector index over tickets.
pub struct VectorIndex {
    backend: Box<dyn IndexBackend>,
    cfg: IndexConfig,
    vectors: RwLock<HashMap<String, CachedVector>>,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl VectorIndex {
    /// Open or create the index described by `cfg`.
    pub fn open(cfg: IndexConfig) -> Result<Self, IndexError> {
        let backend = cfg.backend.build()?;
        Self::with_backend(cfg, backend)
    }

    /// Open the index on top of an already-built backend.
    pub fn with_backend(cfg: IndexConfig, backend: Box<dyn IndexBackend>) -> Result<Self, IndexError> {
        if cfg.dimension == 0 {
            return Err(IndexError::InvalidVector("index dimension must be > 0".into()));
        }

        match backend.get_meta(DIMENSION_KEY)? {
            Some(raw) => {
                let stored = decode_dimension(&raw)?;
                if stored != cfg.dimension {
                    return Err(IndexError::DimensionMismatch {
                        expected: stored,
                        actual: cfg.dimension,
                    });
                }
            }
            None => backend.put_meta(DIMENSION_KEY, &(cfg.dimension as u64).to_be_bytes())?,
        }

        let index = Self {
            backend,
            cfg,
            vectors: RwLock::new(HashMap::new()),
            key_locks: DashMap::new(),
        };
        index.warm()?;
        Ok(index)
    }

    fn warm(&self) -> Result<(), IndexError> {
        let mut loaded = HashMap::new();
        self.backend.scan(&mut |key, data| {
            let entry = self.decode_entry(data)?;
            self.check_vector(&entry.vector)?;
            loaded.insert(
                key.to_string(),
                CachedVector {
                    vector: entry.vector,
                    metadata: entry.metadata,
                },
            );
            Ok(())
        })?;
        info!(entries = loaded.len(), dimension = self.cfg.dimension, "vector index opened");
        *self.vectors.write().map_err(poisoned)? = loaded;
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.cfg.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace the entry for `entry.ticket_id`.
    ///
    /// Writes to the same ticket are serialized; writes to different tickets
    /// do not wait on each other beyond the backend's own locking.
    pub fn upsert(&self, entry: &IndexEntry) -> Result<(), IndexError> {
        if entry.ticket_id.is_empty() {
            return Err(IndexError::InvalidVector("entry has an empty ticket id".into()));
        }
        self.check_vector(&entry.vector)?;
        let payload = self.encode_entry(entry)?;

        let lock = self.key_lock(&entry.ticket_id);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        self.backend.put(&entry.ticket_id, &payload)?;
        self.vectors.write().map_err(poisoned)?.insert(
            entry.ticket_id.clone(),
            CachedVector {
                vector: entry.vector.clone(),
                metadata: entry.metadata.clone(),
            },
        );
        debug!(ticket_id = %entry.ticket_id, fingerprint = %entry.fingerprint, "index entry upserted");
        Ok(())
    }

    /// Fetch a full entry from the backend.
    pub fn get(&self, ticket_id: &str) -> Result<Option<IndexEntry>, IndexError> {
        match self.backend.get(ticket_id)? {
            Some(data) => Ok(Some(self.decode_entry(&data)?)),
            None => Ok(None),
        }
    }

    /// Explicitly remove a ticket. Entries are never dropped implicitly.
    pub fn remove(&self, ticket_id: &str) -> Result<(), IndexError> {
        let lock = self.key_lock(ticket_id);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        self.backend.delete(ticket_id)?;
        self.vectors.write().map_err(poisoned)?.remove(ticket_id);
        Ok(())
    }

    pub fn flush(&self) -> Result<(), IndexError> {
        self.backend.flush()
    }

    /// Ticket ids currently indexed, sorted.
    pub fn ticket_ids(&self) -> Result<Vec<String>, IndexError> {
        let mut ids: Vec<String> = self.vectors.read().map_err(poisoned)?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Top-k entries by cosine similarity.
    pub fn query(&self, request: &QueryRequest<'_>) -> Result<Vec<SimilarityCandidate>, IndexError> {
        self.check_vector(request.vector)?;
        if request.k == 0 {
            return Ok(Vec::new());
        }

        let guard = self.vectors.read().map_err(poisoned)?;
        let mut hits: Vec<(f32, &str, &CachedVector)> = guard
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != request.exclude_ticket_id)
            .filter(|(_, cached)| request.filter.map_or(true, |f| f.matches(&cached.metadata)))
            .map(|(id, cached)| (cosine_similarity(request.vector, &cached.vector), id.as_str(), cached))
            .collect();

        hits.sort_by(|a, b| {
            query::compare_hits(
                (a.0, a.2.metadata.created_at, a.1),
                (b.0, b.2.metadata.created_at, b.1),
            )
        });
        hits.truncate(request.k);

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(idx, (score, id, cached))| SimilarityCandidate {
                ticket_id: id.to_string(),
                score,
                rank: idx + 1,
                metadata: cached.metadata.clone(),
            })
            .collect())
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.cfg.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.cfg.dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::InvalidVector("vector contains non-finite values".into()));
        }
        Ok(())
    }

    fn key_lock(&self, ticket_id: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(ticket_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn decode_entry(&self, data: &[u8]) -> Result<IndexEntry, IndexError> {
        let decompressed = self.cfg.compression.decompress(data)?;
        let (entry, _) = decode_from_slice(&decompressed, standard())?;
        Ok(entry)
    }

    fn encode_entry(&self, entry: &IndexEntry) -> Result<Vec<u8>, IndexError> {
        let encoded = encode_to_vec(entry, standard())?;
        self.cfg.compression.compress(&encoded)
    }
}

fn decode_dimension(raw: &[u8]) -> Result<usize, IndexError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| IndexError::Decode("stored dimension is not 8 bytes".into()))?;
    Ok(u64::from_be_bytes(bytes) as usize)
}

fn poisoned<T>(_: T) -> IndexError {
    IndexError::backend("poisoned lock")
}
