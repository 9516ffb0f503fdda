use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{next_nonce, LocalIndex, NO_NONCE};
use crate::error::{DelegatedFsError, Result};
use crate::primitives::EthAddress;
use crate::types::{RootSnapshot, StoredRecord, MAX_NONCE};

type Entries = BTreeMap<(EthAddress, EthAddress), (StoredRecord, String)>;

/// Process-local index, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: Mutex<Entries>,
}

impl MemoryIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>> {
        self.entries
            .lock()
            .map_err(|_| DelegatedFsError::LocalIndex("mutex poisoned".to_string()))
    }
}

fn stored_nonce(entries: &Entries, key: &(EthAddress, EthAddress)) -> Result<i64> {
    entries.get(key).map_or(Ok(NO_NONCE), |(record, _)| {
        i64::try_from(record.proof.nonce).map_err(|_| out_of_range(record.proof.nonce))
    })
}

fn check_nonce(record: &StoredRecord) -> Result<()> {
    if record.proof.nonce > MAX_NONCE {
        return Err(out_of_range(record.proof.nonce));
    }
    Ok(())
}

fn out_of_range(nonce: u64) -> DelegatedFsError {
    DelegatedFsError::LocalIndex(format!("nonce {nonce} out of range"))
}

#[async_trait]
impl LocalIndex for MemoryIndex {
    async fn get_record(
        &self,
        user: &EthAddress,
        application: &EthAddress,
    ) -> Result<StoredRecord> {
        self.lock()?
            .get(&(*user, *application))
            .map(|(record, _)| record.clone())
            .ok_or_else(|| DelegatedFsError::NotFound {
                user: user.to_string(),
                application: application.to_string(),
            })
    }

    async fn put_record(
        &self,
        user: &EthAddress,
        application: &EthAddress,
        record: &StoredRecord,
        hash: &str,
    ) -> Result<()> {
        check_nonce(record)?;
        self.lock()?
            .insert((*user, *application), (record.clone(), hash.to_string()));
        Ok(())
    }

    async fn compare_and_put(
        &self,
        user: &EthAddress,
        application: &EthAddress,
        observed_nonce: i64,
        record: &StoredRecord,
        hash: &str,
    ) -> Result<()> {
        check_nonce(record)?;
        let mut entries = self.lock()?;
        let key = (*user, *application);
        let current = stored_nonce(&entries, &key)?;
        if current != observed_nonce {
            return Err(DelegatedFsError::NonceMismatch {
                expected: next_nonce(current)?,
            });
        }
        entries.insert(key, (record.clone(), hash.to_string()));
        Ok(())
    }

    async fn get_nonce(&self, user: &EthAddress, application: &EthAddress) -> Result<i64> {
        stored_nonce(&*self.lock()?, &(*user, *application))
    }

    async fn list_all_hashes(&self) -> Result<RootSnapshot> {
        let mut snapshot = RootSnapshot::new();
        for ((user, application), (_, hash)) in self.lock()?.iter() {
            snapshot
                .entry(*user)
                .or_default()
                .insert(*application, hash.clone());
        }
        Ok(snapshot)
    }
}
