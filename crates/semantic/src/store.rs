//! Persistent fingerprint -> embedding cache.
//!
//! Stores are synchronous; the embedder calls them from async code but every
//! operation is a single short key lookup or write.

use dashmap::DashMap;

use crate::error::StoreError;
use crate::types::EmbeddingRecord;

pub trait EmbeddingStore: Send + Sync {
    fn get(&self, fingerprint: &str) -> Result<Option<EmbeddingRecord>, StoreError>;

    /// Insert or replace the record for `record.fingerprint`.
    fn put(&self, record: &EmbeddingRecord) -> Result<(), StoreError>;

    fn remove(&self, fingerprint: &str) -> Result<(), StoreError>;

    /// Drop every record not produced by `model_id`. Returns how many were removed.
    fn purge_except_model(&self, model_id: &str) -> Result<usize, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        self.len().map(|n| n == 0)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEmbeddingStore {
    records: DashMap<String, EmbeddingRecord>,
}

impl InMemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmbeddingStore for InMemoryEmbeddingStore {
    fn get(&self, fingerprint: &str) -> Result<Option<EmbeddingRecord>, StoreError> {
        Ok(self.records.get(fingerprint).map(|r| r.value().clone()))
    }

    fn put(&self, record: &EmbeddingRecord) -> Result<(), StoreError> {
        self.records
            .insert(record.fingerprint.clone(), record.clone());
        Ok(())
    }

    fn remove(&self, fingerprint: &str) -> Result<(), StoreError> {
        self.records.remove(fingerprint);
        Ok(())
    }

    fn purge_except_model(&self, model_id: &str) -> Result<usize, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| record.model_id == model_id);
        Ok(before - self.records.len())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }
}

#[cfg(feature = "store-redb")]
pub use self::redb_store::RedbEmbeddingStore;

#[cfg(feature = "store-redb")]
mod redb_store {
    use super::*;
    use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
    use std::path::Path;

    const EMBEDDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("embeddings");

    /// Redb-backed store. Each record is one JSON value; each write is its own
    /// committed transaction.
    pub struct RedbEmbeddingStore {
        db: Database,
    }

    impl RedbEmbeddingStore {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
            let db = Database::create(path).map_err(StoreError::backend)?;
            let txn = db.begin_write().map_err(StoreError::backend)?;
            {
                txn.open_table(EMBEDDINGS).map_err(StoreError::backend)?;
            }
            txn.commit().map_err(StoreError::backend)?;
            Ok(Self { db })
        }
    }

    fn decode(bytes: &[u8]) -> Result<EmbeddingRecord, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Codec(e.to_string()))
    }

    impl EmbeddingStore for RedbEmbeddingStore {
        fn get(&self, fingerprint: &str) -> Result<Option<EmbeddingRecord>, StoreError> {
            let txn = self.db.begin_read().map_err(StoreError::backend)?;
            let table = txn.open_table(EMBEDDINGS).map_err(StoreError::backend)?;
            match table.get(fingerprint).map_err(StoreError::backend)? {
                Some(value) => decode(value.value()).map(Some),
                None => Ok(None),
            }
        }

        fn put(&self, record: &EmbeddingRecord) -> Result<(), StoreError> {
            let bytes = serde_json::to_vec(record).map_err(|e| StoreError::Codec(e.to_string()))?;
            let txn = self.db.begin_write().map_err(StoreError::backend)?;
            {
                let mut table = txn.open_table(EMBEDDINGS).map_err(StoreError::backend)?;
                table
                    .insert(record.fingerprint.as_str(), bytes.as_slice())
                    .map_err(StoreError::backend)?;
            }
            txn.commit().map_err(StoreError::backend)
        }

        fn remove(&self, fingerprint: &str) -> Result<(), StoreError> {
            let txn = self.db.begin_write().map_err(StoreError::backend)?;
            {
                let mut table = txn.open_table(EMBEDDINGS).map_err(StoreError::backend)?;
                table.remove(fingerprint).map_err(StoreError::backend)?;
            }
            txn.commit().map_err(StoreError::backend)
        }

        fn purge_except_model(&self, model_id: &str) -> Result<usize, StoreError> {
            let stale: Vec<String> = {
                let txn = self.db.begin_read().map_err(StoreError::backend)?;
                let table = txn.open_table(EMBEDDINGS).map_err(StoreError::backend)?;
                let mut stale = Vec::new();
                for item in table.iter().map_err(StoreError::backend)? {
                    let (key, value) = item.map_err(StoreError::backend)?;
                    // Undecodable records are stale too.
                    let keep = decode(value.value()).is_ok_and(|r| r.model_id == model_id);
                    if !keep {
                        stale.push(key.value().to_string());
                    }
                }
                stale
            };

            if stale.is_empty() {
                return Ok(0);
            }
            let txn = self.db.begin_write().map_err(StoreError::backend)?;
            {
                let mut table = txn.open_table(EMBEDDINGS).map_err(StoreError::backend)?;
                for key in &stale {
                    table.remove(key.as_str()).map_err(StoreError::backend)?;
                }
            }
            txn.commit().map_err(StoreError::backend)?;
            Ok(stale.len())
        }

        fn len(&self) -> Result<usize, StoreError> {
            let txn = self.db.begin_read().map_err(StoreError::backend)?;
            let table = txn.open_table(EMBEDDINGS).map_err(StoreError::backend)?;
            table
                .len()
                .map(|n| n as usize)
                .map_err(StoreError::backend)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fp: &str, model: &str) -> EmbeddingRecord {
        EmbeddingRecord::new(fp, vec![0.6, 0.8], model)
    }

    fn exercise(store: &dyn EmbeddingStore) {
        assert!(store.is_empty().unwrap());
        store.put(&record("aa", "m1")).unwrap();
        store.put(&record("bb", "m1")).unwrap();
        store.put(&record("cc", "m2")).unwrap();
        assert_eq!(store.len().unwrap(), 3);

        assert_eq!(store.get("aa").unwrap().unwrap().model_id, "m1");
        assert!(store.get("zz").unwrap().is_none());

        store.put(&record("aa", "m2")).unwrap();
        assert_eq!(store.get("aa").unwrap().unwrap().model_id, "m2");

        assert_eq!(store.purge_except_model("m2").unwrap(), 1);
        assert!(store.get("bb").unwrap().is_none());

        store.remove("aa").unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn in_memory_store_contract() {
        exercise(&InMemoryEmbeddingStore::new());
    }

    #[cfg(feature = "store-redb")]
    #[test]
    fn redb_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&RedbEmbeddingStore::open(dir.path().join("emb.redb")).unwrap());
    }

    #[cfg(feature = "store-redb")]
    #[test]
    fn redb_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emb.redb");
        {
            let store = RedbEmbeddingStore::open(&path).unwrap();
            store.put(&record("f1", "m1")).unwrap();
        }
        let store = RedbEmbeddingStore::open(&path).unwrap();
        assert_eq!(store.get("f1").unwrap().unwrap().vector, vec![0.6, 0.8]);
    }
}
