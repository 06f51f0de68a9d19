//! Append-only byte log backends beneath the Truth-Chain.
//!
//! The recorder treats storage as an ordered list of opaque records per
//! chain. Backends only guarantee ordering and compare-and-append on the
//! record index; hashing and validation live in [`crate::ledger`].

use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another writer appended first
    #[error("Index conflict on chain {chain}: expected {expected}, log length is {actual}")]
    IndexConflict {
        /// Chain identifier
        chain: String,
        /// Index the writer intended to occupy
        expected: u64,
        /// Current length of the log
        actual: u64,
    },

    /// A lock protecting the backend was poisoned by a panicking writer
    #[error("Storage lock poisoned")]
    Poisoned,

    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// SQLite failure
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered, append-only record storage partitioned by chain
pub trait AppendLog: Send + Sync {
    /// Append `record` at `expected_index`; fails if the log length differs
    fn append(&self, chain: &str, expected_index: u64, record: &[u8]) -> Result<(), StorageError>;

    /// Read the record at `index`
    fn read(&self, chain: &str, index: u64) -> Result<Option<Vec<u8>>, StorageError>;

    /// Number of records on a chain
    fn len(&self, chain: &str) -> Result<u64, StorageError>;

    /// All chains that hold at least one record
    fn chains(&self) -> Result<Vec<String>, StorageError>;
}

/// In-memory log, the default backend for field deployments and tests
#[derive(Debug, Default)]
pub struct MemoryLog {
    records: Mutex<BTreeMap<String, Vec<Vec<u8>>>>,
}

impl MemoryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a stored record in place, simulating tampering of the medium
    #[cfg(test)]
    pub(crate) fn overwrite(&self, chain: &str, index: u64, record: Vec<u8>) {
        let mut records = self.records.lock().unwrap();
        records.get_mut(chain).unwrap()[index as usize] = record;
    }
}

impl AppendLog for MemoryLog {
    fn append(&self, chain: &str, expected_index: u64, record: &[u8]) -> Result<(), StorageError> {
        let mut records = self.records.lock().map_err(|_| StorageError::Poisoned)?;
        let chain_records = records.entry(chain.to_string()).or_default();
        let actual = chain_records.len() as u64;
        if actual != expected_index {
            return Err(StorageError::IndexConflict {
                chain: chain.to_string(),
                expected: expected_index,
                actual,
            });
        }
        chain_records.push(record.to_vec());
        Ok(())
    }

    fn read(&self, chain: &str, index: u64) -> Result<Option<Vec<u8>>, StorageError> {
        let records = self.records.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(records
            .get(chain)
            .and_then(|r| r.get(index as usize))
            .cloned())
    }

    fn len(&self, chain: &str) -> Result<u64, StorageError> {
        let records = self.records.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(records.get(chain).map(|r| r.len() as u64).unwrap_or(0))
    }

    fn chains(&self) -> Result<Vec<String>, StorageError> {
        let records = self.records.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(records
            .iter()
            .filter(|(_, r)| !r.is_empty())
            .map(|(chain, _)| chain.clone())
            .collect())
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLog;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::{AppendLog, StorageError};
    use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
    use std::path::Path;
    use std::sync::Mutex;
    use tracing::info;

    /// SQLite byte log with WAL journaling
    pub struct SqliteLog {
        conn: Mutex<Connection>,
    }

    impl SqliteLog {
        /// Create or open a log at the specified path
        pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
            let path = path.as_ref();
            info!(path = %path.display(), "Opening truth-chain log");

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            Self::from_connection(conn)
        }

        /// Open a private in-memory database
        pub fn open_in_memory() -> Result<Self, StorageError> {
            Self::from_connection(Connection::open_in_memory()?)
        }

        fn from_connection(conn: Connection) -> Result<Self, StorageError> {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS truth_chain_records (
                    chain_id TEXT NOT NULL,
                    seq_no INTEGER NOT NULL,
                    record BLOB NOT NULL,
                    PRIMARY KEY (chain_id, seq_no)
                );
                "#,
            )?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        fn count(conn: &Connection, chain: &str) -> Result<u64, StorageError> {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM truth_chain_records WHERE chain_id = ?1",
                params![chain],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        }
    }

    impl AppendLog for SqliteLog {
        fn append(
            &self,
            chain: &str,
            expected_index: u64,
            record: &[u8],
        ) -> Result<(), StorageError> {
            let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
            let tx = conn.transaction()?;
            let actual = Self::count(&tx, chain)?;
            if actual != expected_index {
                return Err(StorageError::IndexConflict {
                    chain: chain.to_string(),
                    expected: expected_index,
                    actual,
                });
            }
            tx.execute(
                "INSERT INTO truth_chain_records (chain_id, seq_no, record) VALUES (?1, ?2, ?3)",
                params![chain, expected_index as i64, record],
            )?;
            tx.commit()?;
            Ok(())
        }

        fn read(&self, chain: &str, index: u64) -> Result<Option<Vec<u8>>, StorageError> {
            let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
            let record = conn
                .query_row(
                    "SELECT record FROM truth_chain_records WHERE chain_id = ?1 AND seq_no = ?2",
                    params![chain, index as i64],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?;
            Ok(record)
        }

        fn len(&self, chain: &str) -> Result<u64, StorageError> {
            let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
            Self::count(&conn, chain)
        }

        fn chains(&self) -> Result<Vec<String>, StorageError> {
            let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
            let mut stmt =
                conn.prepare("SELECT DISTINCT chain_id FROM truth_chain_records ORDER BY chain_id")?;
            let chains = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(chains)
        }
    }
}
