//! End-to-end engine behavior over the `SQLite` index.

#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use common::Grant;
use delegated_fs_core::{
    DelegatedFs, DelegatedFsError, EngineConfig, LocalIndex, MemoryContentStore, SqliteIndex,
};

#[tokio::test]
async fn test_sqlite_engine_flow_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let auth = alloy::signers::local::PrivateKeySigner::random();
    let config = EngineConfig::new(auth.address().into());
    let store = Arc::new(MemoryContentStore::new());

    let source_index = Arc::new(SqliteIndex::open(&dir.path().join("source.sqlite")).expect("open"));
    let source = DelegatedFs::new(&config, source_index.clone(), store.clone());

    let grants: Vec<Grant> = (0..3).map(|_| Grant::random()).collect();
    for grant in &grants {
        for nonce in 0..2 {
            let data = format!("{{\"score\":{nonce}}}");
            let proof = grant.proof(&auth, &data, nonce).await;
            source
                .set_record(&format!("0x{}", grant.user_hex()), &data, &proof)
                .await
                .expect("write");
        }
    }
    assert_eq!(source_index.record_count().expect("count"), 3);

    let replay = grants[0].proof(&auth, "again", 1).await;
    let err = source
        .set_record(&grants[0].user_hex(), "again", &replay)
        .await
        .unwrap_err();
    assert_eq!(err, DelegatedFsError::NonceMismatch { expected: 2 });

    let root = source.upload_root_snapshot().await.expect("root");
    drop(source);

    let replica_path = dir.path().join("replica.sqlite");
    {
        let replica_index = Arc::new(SqliteIndex::open(&replica_path).expect("open replica"));
        let replica = DelegatedFs::new(&config, replica_index, store.clone());
        assert_eq!(replica.recover_from_root(&root).await.expect("recover"), 3);
    }

    // Recovered state survives reopening the database.
    let reopened = Arc::new(SqliteIndex::open(&replica_path).expect("reopen"));
    let replica = DelegatedFs::new(&config, reopened.clone(), store);
    assert_eq!(reopened.record_count().expect("count"), 3);
    assert_eq!(
        replica.user_app_hashes().await.expect("replica hashes"),
        source_index.list_all_hashes().await.expect("source hashes")
    );
    for grant in &grants {
        let record = replica
            .get_record(&grant.user_hex(), &grant.app_hex())
            .await
            .expect("record");
        assert_eq!(record.data, "{\"score\":1}");
        assert_eq!(
            replica
                .get_nonce(&grant.user_hex(), &grant.app_hex())
                .await
                .expect("nonce"),
            1
        );
    }
}
