//! Wire codec for root snapshots and stored records.
//!
//! Encoding is JSON with sorted keys (the snapshot is a `BTreeMap`), so the
//! same index always produces the same bytes and therefore the same content
//! hash. Decoding validates the full shape before anything is handed to the
//! engine; a mismatch is reported as `CorruptSnapshot` or `CorruptRecord`,
//! never defaulted.

use std::collections::BTreeMap;

use crate::error::{DelegatedFsError, Result};
use crate::primitives::canonicalize_address;
use crate::types::{RootSnapshot, StoredRecord, MAX_NONCE};

/// Serializes a snapshot to its canonical JSON form.
///
/// # Errors
///
/// Returns [`DelegatedFsError::CorruptSnapshot`] if serialization fails.
pub fn encode_snapshot(snapshot: &RootSnapshot) -> Result<String> {
    serde_json::to_string(snapshot)
        .map_err(|err| DelegatedFsError::CorruptSnapshot(err.to_string()))
}

/// Parses and validates a snapshot blob.
///
/// # Errors
///
/// Returns [`DelegatedFsError::CorruptSnapshot`] if the blob is not JSON, is
/// not a `user -> app -> hash` mapping of strings, or contains a key that is
/// not an address.
pub fn decode_snapshot(raw: &str) -> Result<RootSnapshot> {
    let parsed: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_str(raw)
        .map_err(|err| {
            DelegatedFsError::CorruptSnapshot(format!("data under the root hash is invalid: {err}"))
        })?;

    let mut snapshot = RootSnapshot::new();
    for (user, applications) in parsed {
        let user_address = canonicalize_address(&user).map_err(|_| {
            DelegatedFsError::CorruptSnapshot(format!("key '{user}' is not an address"))
        })?;
        let entry = snapshot.entry(user_address).or_default();
        for (application, hash) in applications {
            let application_address = canonicalize_address(&application).map_err(|_| {
                DelegatedFsError::CorruptSnapshot(format!(
                    "key '{user}.{application}' is not an address"
                ))
            })?;
            if hash.is_empty() {
                return Err(DelegatedFsError::CorruptSnapshot(format!(
                    "value at '{user}.{application}' is empty"
                )));
            }
            entry.insert(application_address, hash);
        }
    }
    Ok(snapshot)
}

/// Serializes a record for upload.
///
/// # Errors
///
/// Returns [`DelegatedFsError::StorageUnavailable`] if serialization fails.
pub fn encode_record(record: &StoredRecord) -> Result<String> {
    serde_json::to_string(record)
        .map_err(|err| DelegatedFsError::StorageUnavailable(format!("encode record: {err}")))
}

/// Parses and validates a record blob downloaded from `hash`.
///
/// # Errors
///
/// Returns [`DelegatedFsError::CorruptRecord`] if the blob does not have the
/// `{ data, proof: { nonce, applicationAddress, authServiceProof,
/// applicationDelegateDataSignature } }` shape or its nonce is above
/// [`MAX_NONCE`].
pub fn decode_record(hash: &str, raw: &str) -> Result<StoredRecord> {
    let corrupt = |reason: String| DelegatedFsError::CorruptRecord {
        hash: hash.to_string(),
        reason,
    };
    let record: StoredRecord = serde_json::from_str(raw).map_err(|err| corrupt(err.to_string()))?;
    if record.proof.nonce > MAX_NONCE {
        return Err(corrupt(format!("nonce {} out of range", record.proof.nonce)));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{canonicalize_signature, EthAddress};
    use crate::types::DelegatedProof;

    fn address(fill: char) -> EthAddress {
        canonicalize_address(&fill.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn test_snapshot_encoding_is_sorted_and_canonical() {
        let mut snapshot = RootSnapshot::new();
        snapshot
            .entry(address('b'))
            .or_default()
            .insert(address('2'), "h2".to_string());
        snapshot
            .entry(address('a'))
            .or_default()
            .insert(address('1'), "h1".to_string());

        let encoded = encode_snapshot(&snapshot).unwrap();
        let expected = format!(
            "{{\"{}\":{{\"{}\":\"h1\"}},\"{}\":{{\"{}\":\"h2\"}}}}",
            "a".repeat(40),
            "1".repeat(40),
            "b".repeat(40),
            "2".repeat(40)
        );
        assert_eq!(encoded, expected);
        assert_eq!(decode_snapshot(&encoded).unwrap(), snapshot);
    }

    #[test]
    fn test_decode_snapshot_accepts_prefixed_keys() {
        let raw = format!("{{\"0x{}\":{{\"0x{}\":\"h\"}}}}", "A".repeat(40), "B".repeat(40));
        let snapshot = decode_snapshot(&raw).unwrap();
        assert_eq!(snapshot[&address('a')][&address('b')], "h");
    }

    #[test]
    fn test_decode_snapshot_rejects_bad_shapes() {
        for raw in [
            "not json",
            "[]",
            "null",
            "{\"aa\": \"flat\"}",
            "{\"aa\": {\"bb\": 5}}",
        ] {
            let err = decode_snapshot(raw).unwrap_err();
            assert!(
                matches!(err, DelegatedFsError::CorruptSnapshot(_)),
                "{raw}: {err}"
            );
        }
        let bad_key = format!("{{\"{}\":{{\"nope\":\"h\"}}}}", "a".repeat(40));
        assert!(matches!(
            decode_snapshot(&bad_key),
            Err(DelegatedFsError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_decode_empty_snapshot() {
        assert!(decode_snapshot("{}").unwrap().is_empty());
    }

    #[test]
    fn test_record_wire_shape() {
        let record = StoredRecord {
            data: "hello".to_string(),
            proof: DelegatedProof {
                nonce: 4,
                application_address: address('c'),
                auth_service_proof: canonicalize_signature(&"1b".repeat(65)).unwrap(),
                application_delegate_data_signature: canonicalize_signature(&"1c".repeat(65))
                    .unwrap(),
            },
        };
        let encoded = encode_record(&record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["data"], "hello");
        assert_eq!(value["proof"]["nonce"], 4);
        assert_eq!(value["proof"]["applicationAddress"], "c".repeat(40));
        assert_eq!(value["proof"]["authServiceProof"], "1b".repeat(65));
        assert_eq!(
            value["proof"]["applicationDelegateDataSignature"],
            "1c".repeat(65)
        );
        assert_eq!(decode_record("h", &encoded).unwrap(), record);
    }

    #[test]
    fn test_decode_record_rejects_bad_shapes() {
        let sig = "1b".repeat(65);
        let app = "c".repeat(40);
        let cases = [
            String::new(),
            "{}".to_string(),
            "{\"data\": 1, \"proof\": {}}".to_string(),
            "{\"data\": \"x\", \"proof\": null}".to_string(),
            format!(
                "{{\"data\":\"x\",\"proof\":{{\"nonce\":\"1\",\"applicationAddress\":\"{app}\",\"authServiceProof\":\"{sig}\",\"applicationDelegateDataSignature\":\"{sig}\"}}}}"
            ),
            format!(
                "{{\"data\":\"x\",\"proof\":{{\"nonce\":-1,\"applicationAddress\":\"{app}\",\"authServiceProof\":\"{sig}\",\"applicationDelegateDataSignature\":\"{sig}\"}}}}"
            ),
            format!(
                "{{\"data\":\"x\",\"proof\":{{\"nonce\":{},\"applicationAddress\":\"{app}\",\"authServiceProof\":\"{sig}\",\"applicationDelegateDataSignature\":\"{sig}\"}}}}",
                MAX_NONCE + 1
            ),
            format!(
                "{{\"data\":\"x\",\"proof\":{{\"nonce\":{},\"applicationAddress\":\"{app}\",\"authServiceProof\":\"{sig}\",\"applicationDelegateDataSignature\":\"{sig}\"}}}}",
                u64::MAX
            ),
            format!(
                "{{\"data\":\"x\",\"proof\":{{\"nonce\":1,\"applicationAddress\":\"xyz\",\"authServiceProof\":\"{sig}\",\"applicationDelegateDataSignature\":\"{sig}\"}}}}"
            ),
        ];
        for raw in cases {
            let err = decode_record("bafy", &raw).unwrap_err();
            match err {
                DelegatedFsError::CorruptRecord { hash, .. } => assert_eq!(hash, "bafy"),
                other => panic!("unexpected error for {raw}: {other}"),
            }
        }
    }
}
