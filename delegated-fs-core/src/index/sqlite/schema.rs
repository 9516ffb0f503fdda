//! Index database schema management.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{DelegatedFsError, Result};

use super::util::map_db_err;

const INDEX_SCHEMA_VERSION: i64 = 1;

pub(super) fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS index_meta (
            schema_version  INTEGER NOT NULL,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL
        );",
    )
    .map_err(|err| map_db_err(&err))?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT schema_version FROM index_meta LIMIT 1;",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| map_db_err(&err))?;

    match existing {
        Some(version) if version == INDEX_SCHEMA_VERSION => ensure_content_schema(conn),
        Some(version) => Err(DelegatedFsError::LocalIndex(format!(
            "unsupported index schema version {version}"
        ))),
        None => {
            ensure_content_schema(conn)?;
            insert_meta(conn)
        }
    }
}

fn ensure_content_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS data_content (
            user_address    TEXT    NOT NULL CHECK (length(user_address) = 40),
            app_address     TEXT    NOT NULL CHECK (length(app_address) = 40),
            data            TEXT    NOT NULL,
            proof           TEXT    NOT NULL,
            nonce           INTEGER NOT NULL CHECK (nonce >= 0),
            hash            TEXT    NOT NULL,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL,
            PRIMARY KEY (user_address, app_address)
        );",
    )
    .map_err(|err| map_db_err(&err))?;
    Ok(())
}

fn insert_meta(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT INTO index_meta (schema_version, created_at, updated_at)
         VALUES (?1, strftime('%s','now'), strftime('%s','now'))",
        [INDEX_SCHEMA_VERSION],
    )
    .map_err(|err| map_db_err(&err))?;
    Ok(())
}
