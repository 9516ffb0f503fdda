//! Shared helpers for SQLite index operations.

use crate::error::{DelegatedFsError, Result};

pub(super) fn map_db_err(err: &rusqlite::Error) -> DelegatedFsError {
    DelegatedFsError::LocalIndex(err.to_string())
}

pub(super) fn to_i64(value: u64, label: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| {
        DelegatedFsError::LocalIndex(format!("{label} out of range for i64: {value}"))
    })
}

pub(super) fn current_unix_timestamp() -> Result<i64> {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|err| {
            DelegatedFsError::LocalIndex(format!("system time before unix epoch: {err}"))
        })?;
    to_i64(duration.as_secs(), "now")
}
