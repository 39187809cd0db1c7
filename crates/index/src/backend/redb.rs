//! Redb backend for the ticket index.
//!
//! Every put is its own write transaction, so a crash mid-write leaves the
//! previous value intact. Redb commits are durable when `commit` returns.
//!
//! ```yaml
//! index:
//!   backend: redb
//!   path: "/data/tickets.redb"
//! ```

use crate::{IndexBackend, IndexError};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

const ENTRIES: Table = TableDefinition::new("ticket_entries");
const META: Table = TableDefinition::new("index_meta");

pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a database at `path`, creating both tables.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let db = Database::create(path).map_err(IndexError::backend)?;

        let write_txn = db.begin_write().map_err(IndexError::backend)?;
        {
            write_txn.open_table(ENTRIES).map_err(IndexError::backend)?;
            write_txn.open_table(META).map_err(IndexError::backend)?;
        }
        write_txn.commit().map_err(IndexError::backend)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn write(&self, table: Table, key: &str, value: Option<&[u8]>) -> Result<(), IndexError> {
        let write_txn = self.db.begin_write().map_err(IndexError::backend)?;
        {
            let mut table = write_txn.open_table(table).map_err(IndexError::backend)?;
            match value {
                Some(value) => {
                    table.insert(key, value).map_err(IndexError::backend)?;
                }
                None => {
                    table.remove(key).map_err(IndexError::backend)?;
                }
            }
        }
        write_txn.commit().map_err(IndexError::backend)
    }

    fn read(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        let read_txn = self.db.begin_read().map_err(IndexError::backend)?;
        let table = read_txn.open_table(table).map_err(IndexError::backend)?;
        let value = table.get(key).map_err(IndexError::backend)?;
        Ok(value.map(|v| v.value().to_vec()))
    }
}

impl IndexBackend for RedbBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), IndexError> {
        self.write(ENTRIES, key, Some(value))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        self.read(ENTRIES, key)
    }

    fn delete(&self, key: &str) -> Result<(), IndexError> {
        self.write(ENTRIES, key, None)
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        let read_txn = self.db.begin_read().map_err(IndexError::backend)?;
        let table = read_txn.open_table(ENTRIES).map_err(IndexError::backend)?;

        for item in table.iter().map_err(IndexError::backend)? {
            let (key, value) = item.map_err(IndexError::backend)?;
            visitor(key.value(), value.value())?;
        }
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        self.read(META, key)
    }

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), IndexError> {
        self.write(META, key, Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn redb_roundtrip_and_delete() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend.put("GM-1", b"value1").unwrap();
        assert_eq!(backend.get("GM-1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(backend.get("GM-2").unwrap(), None);

        backend.delete("GM-1").unwrap();
        assert_eq!(backend.get("GM-1").unwrap(), None);
    }

    #[test]
    fn redb_scan_reports_keys() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend.put("GM-1", b"a").unwrap();
        backend.put("GM-2", b"b").unwrap();
        backend.put_meta("dimension", b"3").unwrap();

        let mut collected = Vec::new();
        backend
            .scan(&mut |key, value| {
                collected.push((key.to_string(), value.to_vec()));
                Ok(())
            })
            .unwrap();

        assert_eq!(
            collected,
            vec![
                ("GM-1".to_string(), b"a".to_vec()),
                ("GM-2".to_string(), b"b".to_vec()),
            ]
        );
    }

    #[test]
    fn redb_survives_reopen() {
        let temp_file = NamedTempFile::new().unwrap();
        {
            let backend = RedbBackend::open(temp_file.path()).unwrap();
            backend.put("GM-1", b"persisted").unwrap();
            backend.put_meta("dimension", b"3").unwrap();
        }
        let backend = RedbBackend::open(temp_file.path()).unwrap();
        assert_eq!(backend.get("GM-1").unwrap(), Some(b"persisted".to_vec()));
        assert_eq!(backend.get_meta("dimension").unwrap(), Some(b"3".to_vec()));
    }
}
