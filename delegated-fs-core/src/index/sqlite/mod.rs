//! SQLite-backed local index.
//!
//! One row per (user, application) in `data_content`, keyed by the composite
//! primary key. Writes on the engine path go through an `IMMEDIATE`
//! transaction so the nonce comparison and the upsert cannot interleave with
//! another writer.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};

use super::LocalIndex;
use crate::error::{DelegatedFsError, Result};
use crate::primitives::EthAddress;
use crate::types::{RootSnapshot, StoredRecord};

mod records;
mod schema;
mod util;

use util::map_db_err;

/// SQLite index wrapper.
#[derive(Debug)]
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Opens or creates the index database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or its schema is
    /// from an unknown version.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| map_db_err(&err))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|err| map_db_err(&err))?;
        Self::prepared(conn)
    }

    /// Creates a transient in-memory index.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|err| map_db_err(&err))?;
        Self::prepared(conn)
    }

    fn prepared(conn: Connection) -> Result<Self> {
        schema::ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Total number of stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn record_count(&self) -> Result<u64> {
        records::count(&*self.lock()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DelegatedFsError::LocalIndex("mutex poisoned".to_string()))
    }
}

#[async_trait]
impl LocalIndex for SqliteIndex {
    async fn get_record(
        &self,
        user: &EthAddress,
        application: &EthAddress,
    ) -> Result<StoredRecord> {
        records::get(&*self.lock()?, user, application)
    }

    async fn put_record(
        &self,
        user: &EthAddress,
        application: &EthAddress,
        record: &StoredRecord,
        hash: &str,
    ) -> Result<()> {
        records::upsert(&*self.lock()?, user, application, record, hash)
    }

    async fn compare_and_put(
        &self,
        user: &EthAddress,
        application: &EthAddress,
        observed_nonce: i64,
        record: &StoredRecord,
        hash: &str,
    ) -> Result<()> {
        records::compare_and_upsert(
            &mut *self.lock()?,
            user,
            application,
            observed_nonce,
            record,
            hash,
        )
    }

    async fn get_nonce(&self, user: &EthAddress, application: &EthAddress) -> Result<i64> {
        records::nonce(&*self.lock()?, user, application)
    }

    async fn list_all_hashes(&self) -> Result<RootSnapshot> {
        records::list_hashes(&*self.lock()?)
    }
}
