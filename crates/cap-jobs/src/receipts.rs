//! Enqueue receipt construction and verification, grounded directly on
//! `bpi_receipts::{TransactionReceipt, FinalityProof}` and
//! `bpi_enc::domains::RECEIPT_HASH`'s "digest over self-minus-digest"
//! pattern, but sealed with SHA3-512 over the real canonical CBOR encoding.

use crate::ids::derive_task_id;
use crate::types::{JobKind, JobReceiptV1};
use cap_enc::{domains, encode, sha3_256, sha3_512, ToValue, Value};
use cap_errors::CapError;

/// `build_receipt(kind, chain_id, height, tx_hash, caller, payload,
/// created_at?)` per spec.md §4.12: derives `task_id`, hashes `payload`
/// into `payload_hash`, then seals everything but the digest itself.
pub fn build_receipt(
    kind: JobKind,
    chain_id: i64,
    height: i64,
    tx_hash: &[u8],
    caller: &[u8],
    payload: &Value,
    created_at: i64,
) -> Result<JobReceiptV1, CapError> {
    let payload_canonical = encode(payload)?;
    let payload_hash = sha3_256(&payload_canonical);
    let task_id = derive_task_id(chain_id, height, tx_hash, caller, &payload_canonical)?;

    let without_digest = receipt_value(
        1,
        &task_id,
        kind,
        chain_id,
        height,
        tx_hash,
        caller,
        &payload_hash,
        created_at,
    );
    let encoded = encode(&without_digest)?;
    let mut buf = Vec::with_capacity(domains::RECEIPT.len() + encoded.len());
    buf.extend_from_slice(domains::RECEIPT);
    buf.extend_from_slice(&encoded);
    let digest = sha3_512(&buf);

    Ok(JobReceiptV1 {
        version: 1,
        task_id,
        kind,
        chain_id,
        height,
        tx_hash: tx_hash.to_vec(),
        caller: caller.to_vec(),
        payload_hash,
        created_at,
        digest,
    })
}

fn receipt_value(
    version: u32,
    task_id: &[u8; 32],
    kind: JobKind,
    chain_id: i64,
    height: i64,
    tx_hash: &[u8],
    caller: &[u8],
    payload_hash: &[u8; 32],
    created_at: i64,
) -> Value {
    Value::map(vec![
        (Value::text("version"), Value::int(version)),
        (Value::text("task_id"), Value::bytes(task_id.to_vec())),
        (Value::text("kind"), kind.to_value()),
        (Value::text("chain_id"), Value::int(chain_id)),
        (Value::text("height"), Value::int(height)),
        (Value::text("tx_hash"), Value::bytes(tx_hash.to_vec())),
        (Value::text("caller"), Value::bytes(caller.to_vec())),
        (
            Value::text("payload_hash"),
            Value::bytes(payload_hash.to_vec()),
        ),
        (Value::text("created_at"), Value::int(created_at)),
    ])
}

/// Expected-value assertions for [`validate_receipt`]. Any field left
/// `None` is not checked.
#[derive(Debug, Default, Clone)]
pub struct ExpectedReceipt<'a> {
    pub chain_id: Option<i64>,
    pub height: Option<i64>,
    pub tx_hash: Option<&'a [u8]>,
    pub caller: Option<&'a [u8]>,
    pub payload: Option<&'a Value>,
}

/// Stable reason codes returned alongside the boolean verdict.
pub const REASON_OK: &str = "OK";
pub const REASON_BAD_DIGEST: &str = "BAD_DIGEST";
pub const REASON_FIELD_MISMATCH: &str = "FIELD_MISMATCH";
pub const REASON_TASK_ID_MISMATCH: &str = "TASK_ID_MISMATCH";

/// Recomputes the digest, checks any field-level expectations, and
/// recomputes `task_id` when `expect.payload` is given to confirm binding.
/// Returns `(ok, reason_code)`; never raises.
pub fn validate_receipt(receipt: &JobReceiptV1, expect: &ExpectedReceipt) -> (bool, &'static str) {
    let without_digest = receipt_value(
        receipt.version,
        &receipt.task_id,
        receipt.kind,
        receipt.chain_id,
        receipt.height,
        &receipt.tx_hash,
        &receipt.caller,
        &receipt.payload_hash,
        receipt.created_at,
    );
    let Ok(encoded) = encode(&without_digest) else {
        return (false, REASON_BAD_DIGEST);
    };
    let mut buf = Vec::with_capacity(domains::RECEIPT.len() + encoded.len());
    buf.extend_from_slice(domains::RECEIPT);
    buf.extend_from_slice(&encoded);
    let expected_digest = sha3_512(&buf);
    if expected_digest != receipt.digest {
        return (false, REASON_BAD_DIGEST);
    }

    if let Some(chain_id) = expect.chain_id {
        if chain_id != receipt.chain_id {
            return (false, REASON_FIELD_MISMATCH);
        }
    }
    if let Some(height) = expect.height {
        if height != receipt.height {
            return (false, REASON_FIELD_MISMATCH);
        }
    }
    if let Some(tx_hash) = expect.tx_hash {
        if tx_hash != receipt.tx_hash.as_slice() {
            return (false, REASON_FIELD_MISMATCH);
        }
    }
    if let Some(caller) = expect.caller {
        if caller != receipt.caller.as_slice() {
            return (false, REASON_FIELD_MISMATCH);
        }
    }

    if let Some(payload) = expect.payload {
        let Ok(payload_canonical) = encode(payload) else {
            return (false, REASON_FIELD_MISMATCH);
        };
        let recomputed = derive_task_id(
            receipt.chain_id,
            receipt.height,
            &receipt.tx_hash,
            &receipt.caller,
            &payload_canonical,
        );
        match recomputed {
            Ok(task_id) if task_id == receipt.task_id => {}
            _ => return (false, REASON_TASK_ID_MISMATCH),
        }
    }

    (true, REASON_OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Value {
        Value::map(vec![
            (Value::text("model"), Value::text("gpt")),
            (Value::text("prompt"), Value::bytes(b"hi".to_vec())),
        ])
    }

    #[test]
    fn build_then_validate_round_trips_ok() {
        let payload = sample_payload();
        let receipt =
            build_receipt(JobKind::Ai, 1, 10, b"txhash", b"caller", &payload, 1000).unwrap();
        let (ok, reason) = validate_receipt(&receipt, &ExpectedReceipt::default());
        assert!(ok);
        assert_eq!(reason, REASON_OK);
    }

    #[test]
    fn tampered_digest_fails_validation() {
        let payload = sample_payload();
        let mut receipt =
            build_receipt(JobKind::Ai, 1, 10, b"txhash", b"caller", &payload, 1000).unwrap();
        receipt.digest[0] ^= 0xFF;
        let (ok, reason) = validate_receipt(&receipt, &ExpectedReceipt::default());
        assert!(!ok);
        assert_eq!(reason, REASON_BAD_DIGEST);
    }

    #[test]
    fn expected_payload_confirms_task_id_binding() {
        let payload = sample_payload();
        let receipt =
            build_receipt(JobKind::Ai, 1, 10, b"txhash", b"caller", &payload, 1000).unwrap();
        let other_payload = Value::map(vec![(Value::text("model"), Value::text("other"))]);
        let (ok, reason) = validate_receipt(
            &receipt,
            &ExpectedReceipt {
                payload: Some(&other_payload),
                ..Default::default()
            },
        );
        assert!(!ok);
        assert_eq!(reason, REASON_TASK_ID_MISMATCH);
    }

    #[test]
    fn field_mismatch_is_detected() {
        let payload = sample_payload();
        let receipt =
            build_receipt(JobKind::Ai, 1, 10, b"txhash", b"caller", &payload, 1000).unwrap();
        let (ok, reason) = validate_receipt(
            &receipt,
            &ExpectedReceipt {
                chain_id: Some(2),
                ..Default::default()
            },
        );
        assert!(!ok);
        assert_eq!(reason, REASON_FIELD_MISMATCH);
    }
}
