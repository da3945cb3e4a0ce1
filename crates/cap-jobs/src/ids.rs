//! Deterministic task-id derivation, grounded on `bpi_enc::domain_hash`'s
//! domain-separation idiom but following spec.md §4.2's literal byte
//! layout exactly (SHA3-256, not the teacher's BLAKE3).

use cap_enc::{domains, sha3_256, u64be, Hash32};
use cap_errors::CapError;

/// `SHA3-256(DOMAIN_TASK || u64BE(chain_id) || u64BE(height) ||
/// u16BE(len(tx_hash)) || tx_hash || u16BE(len(caller)) || caller ||
/// SHA3-256(canonical(payload)))`.
///
/// Rejects empty `tx_hash`/`caller`, non-positive `chain_id`, negative
/// `height`, or either field exceeding `0xFFFF` bytes.
pub fn derive_task_id(
    chain_id: i64,
    height: i64,
    tx_hash: &[u8],
    caller: &[u8],
    payload_canonical: &[u8],
) -> Result<Hash32, CapError> {
    let payload_digest = sha3_256(payload_canonical);
    derive_task_id_from_digest(chain_id, height, tx_hash, caller, &payload_digest)
}

/// Same formula as [`derive_task_id`], but for callers (the AI/Quantum
/// enqueue providers) that already hold a domain-specific `payload_digest`
/// and must not re-hash it through the generic canonical-codec path.
pub fn derive_task_id_from_digest(
    chain_id: i64,
    height: i64,
    tx_hash: &[u8],
    caller: &[u8],
    payload_digest: &Hash32,
) -> Result<Hash32, CapError> {
    if chain_id <= 0 {
        return Err(CapError::invalid_input("chain_id must be positive")
            .with_detail("chain_id", chain_id.to_string()));
    }
    if height < 0 {
        return Err(CapError::invalid_input("height must be non-negative")
            .with_detail("height", height.to_string()));
    }
    if tx_hash.is_empty() {
        return Err(CapError::invalid_input("tx_hash must not be empty"));
    }
    if caller.is_empty() {
        return Err(CapError::invalid_input("caller must not be empty"));
    }
    if tx_hash.len() > u16::MAX as usize {
        return Err(CapError::invalid_input("tx_hash exceeds maximum length")
            .with_detail("len", tx_hash.len() as u64));
    }
    if caller.len() > u16::MAX as usize {
        return Err(CapError::invalid_input("caller exceeds maximum length")
            .with_detail("len", caller.len() as u64));
    }

    let mut buf = Vec::with_capacity(
        domains::TASK.len() + 8 + 8 + 2 + tx_hash.len() + 2 + caller.len() + 32,
    );
    buf.extend_from_slice(domains::TASK);
    buf.extend_from_slice(&u64be(chain_id as u64));
    buf.extend_from_slice(&u64be(height as u64));
    buf.extend_from_slice(&(tx_hash.len() as u16).to_be_bytes());
    buf.extend_from_slice(tx_hash);
    buf.extend_from_slice(&(caller.len() as u16).to_be_bytes());
    buf.extend_from_slice(caller);
    buf.extend_from_slice(payload_digest);

    Ok(sha3_256(&buf))
}
