//! Queries against the `data_content` table.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::error::{DelegatedFsError, Result};
use crate::index::{next_nonce, NO_NONCE};
use crate::primitives::{canonicalize_address, EthAddress};
use crate::types::{DelegatedProof, RootSnapshot, StoredRecord};

use super::util::{current_unix_timestamp, map_db_err, to_i64};

const UPSERT_SQL: &str = "INSERT INTO data_content (
        user_address, app_address, data, proof, nonce, hash, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
     ON CONFLICT (user_address, app_address) DO UPDATE SET
        data = excluded.data,
        proof = excluded.proof,
        nonce = excluded.nonce,
        hash = excluded.hash,
        updated_at = excluded.updated_at";

pub(super) fn get(
    conn: &Connection,
    user: &EthAddress,
    application: &EthAddress,
) -> Result<StoredRecord> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT data, proof
             FROM data_content
             WHERE user_address = ?1
               AND app_address = ?2",
            params![user.to_string(), application.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|err| map_db_err(&err))?;
    let (data, proof) = row.ok_or_else(|| DelegatedFsError::NotFound {
        user: user.to_string(),
        application: application.to_string(),
    })?;
    let proof: DelegatedProof = serde_json::from_str(&proof).map_err(|err| {
        DelegatedFsError::LocalIndex(format!("stored proof is invalid: {err}"))
    })?;
    Ok(StoredRecord { data, proof })
}

pub(super) fn nonce(
    conn: &Connection,
    user: &EthAddress,
    application: &EthAddress,
) -> Result<i64> {
    let stored: Option<i64> = conn
        .query_row(
            "SELECT nonce
             FROM data_content
             WHERE user_address = ?1
               AND app_address = ?2",
            params![user.to_string(), application.to_string()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| map_db_err(&err))?;
    Ok(stored.unwrap_or(NO_NONCE))
}

pub(super) fn upsert(
    conn: &Connection,
    user: &EthAddress,
    application: &EthAddress,
    record: &StoredRecord,
    hash: &str,
) -> Result<()> {
    let proof = serde_json::to_string(&record.proof)
        .map_err(|err| DelegatedFsError::LocalIndex(format!("encode proof: {err}")))?;
    let nonce = to_i64(record.proof.nonce, "nonce")?;
    let now = current_unix_timestamp()?;
    conn.execute(
        UPSERT_SQL,
        params![
            user.to_string(),
            application.to_string(),
            record.data,
            proof,
            nonce,
            hash,
            now
        ],
    )
    .map_err(|err| map_db_err(&err))?;
    Ok(())
}

pub(super) fn compare_and_upsert(
    conn: &mut Connection,
    user: &EthAddress,
    application: &EthAddress,
    observed_nonce: i64,
    record: &StoredRecord,
    hash: &str,
) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| map_db_err(&err))?;
    let current = nonce(&tx, user, application)?;
    if current != observed_nonce {
        // Dropping the transaction rolls it back.
        return Err(DelegatedFsError::NonceMismatch {
            expected: next_nonce(current)?,
        });
    }
    upsert(&tx, user, application, record, hash)?;
    tx.commit().map_err(|err| map_db_err(&err))?;
    Ok(())
}

pub(super) fn list_hashes(conn: &Connection) -> Result<RootSnapshot> {
    let mut stmt = conn
        .prepare("SELECT user_address, app_address, hash FROM data_content")
        .map_err(|err| map_db_err(&err))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(|err| map_db_err(&err))?;

    let mut snapshot = RootSnapshot::new();
    for row in rows {
        let (user, application, hash) = row.map_err(|err| map_db_err(&err))?;
        let user = canonicalize_address(&user)
            .map_err(|err| DelegatedFsError::LocalIndex(err.to_string()))?;
        let application = canonicalize_address(&application)
            .map_err(|err| DelegatedFsError::LocalIndex(err.to_string()))?;
        snapshot.entry(user).or_default().insert(application, hash);
    }
    Ok(snapshot)
}

pub(super) fn count(conn: &Connection) -> Result<u64> {
    let total: i64 = conn
        .query_row("SELECT COUNT(*) FROM data_content", [], |row| row.get(0))
        .map_err(|err| map_db_err(&err))?;
    u64::try_from(total)
        .map_err(|_| DelegatedFsError::LocalIndex(format!("negative row count {total}")))
}
