use crate::IndexError;
use std::collections::HashMap;
use std::sync::RwLock;

#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use self::redb::RedbBackend;

/// Key-value storage underneath the vector index.
///
/// Entries live in one namespace keyed by ticket id; a second small
/// namespace holds index-level metadata such as the vector dimension.
/// Every `put` must be atomic: after a crash a key holds either the old
/// value or the new one.
pub trait IndexBackend: Send + Sync {
    /// Insert or replace an entry.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), IndexError>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError>;
    fn delete(&self, key: &str) -> Result<(), IndexError>;
    /// Visit every entry as `(key, value)`.
    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), IndexError>,
    ) -> Result<(), IndexError>;
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError>;
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), IndexError>;
    /// Flush any buffered writes to the backend.
    fn flush(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Configuration for selecting and building a backend.
///
/// ```
/// use index::BackendConfig;
///
/// let memory = BackendConfig::in_memory();
/// let disk = BackendConfig::redb("/data/tickets.redb");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BackendConfig {
    /// Redb database file. Survives restarts.
    Redb { path: String },
    /// Process-local map, for tests and dry runs.
    #[default]
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    pub fn build(&self) -> Result<Box<dyn IndexBackend>, IndexError> {
        match self {
            BackendConfig::InMemory => Ok(Box::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Box::new(RedbBackend::open(path)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(IndexError::backend("redb backend disabled at compile time"))
                }
            }
        }
    }
}

/// An in-memory backend using `RwLock`s around two `HashMap`s.
#[derive(Default)]
pub struct InMemoryBackend {
    records: RwLock<HashMap<String, Vec<u8>>>,
    meta: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> IndexError {
    IndexError::backend("poisoned lock")
}

impl IndexBackend for InMemoryBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), IndexError> {
        self.records
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        Ok(self.records.read().map_err(poisoned)?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), IndexError> {
        self.records.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        let guard = self.records.read().map_err(poisoned)?;
        for (key, value) in guard.iter() {
            visitor(key, value)?;
        }
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        Ok(self.meta.read().map_err(poisoned)?.get(key).cloned())
    }

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), IndexError> {
        self.meta
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_roundtrip_and_delete() {
        let backend = InMemoryBackend::new();
        backend.put("GM-1", b"one").unwrap();
        backend.put("GM-1", b"uno").unwrap();
        assert_eq!(backend.get("GM-1").unwrap(), Some(b"uno".to_vec()));

        let mut seen = Vec::new();
        backend
            .scan(&mut |key, _| {
                seen.push(key.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["GM-1".to_string()]);

        backend.delete("GM-1").unwrap();
        assert_eq!(backend.get("GM-1").unwrap(), None);
    }

    #[test]
    fn meta_namespace_is_separate() {
        let backend = InMemoryBackend::new();
        backend.put_meta("dimension", b"768").unwrap();
        assert_eq!(backend.get("dimension").unwrap(), None);
        assert_eq!(backend.get_meta("dimension").unwrap(), Some(b"768".to_vec()));
    }
}
