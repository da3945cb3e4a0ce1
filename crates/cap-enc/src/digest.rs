//! Domain-separated digests. Every hash the capabilities core computes
//! binds a textual domain tag before the payload, following the teacher's
//! `bpi_enc::domain_hash` idiom, but using SHA3 (Keccak family) rather than
//! BLAKE3 since the spec's literal formulas are defined in terms of
//! SHA3-256/512.

use sha3::{Digest, Sha3_256, Sha3_512};

pub type Hash32 = [u8; 32];
pub type Hash64 = [u8; 64];

pub fn sha3_256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&out);
    buf
}

pub fn sha3_512(data: &[u8]) -> Hash64 {
    let mut hasher = Sha3_512::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut buf = [0u8; 64];
    buf.copy_from_slice(&out);
    buf
}

/// `SHA3-256(domain || 0x00 || data)`, mirroring the teacher's
/// `domain_hash` separator-byte convention.
pub fn domain_hash(domain: &str, data: &[u8]) -> Hash32 {
    let mut buf = Vec::with_capacity(domain.len() + 1 + data.len());
    buf.extend_from_slice(domain.as_bytes());
    buf.push(0x00);
    buf.extend_from_slice(data);
    sha3_256(&buf)
}

pub fn u16be(v: u16) -> [u8; 2] {
    v.to_be_bytes()
}

pub fn u32be(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

pub fn u64be(v: u64) -> [u8; 8] {
    v.to_be_bytes()
}

/// Length-prefixed bytes with a 16-bit big-endian length, as used by
/// `derive_task_id` for `tx_hash`/`caller` and failing if the field
/// exceeds `0xFFFF` bytes.
pub fn lp16(field: &[u8]) -> Result<Vec<u8>, LengthPrefixError> {
    if field.len() > u16::MAX as usize {
        return Err(LengthPrefixError::TooLong {
            max: u16::MAX as usize,
            actual: field.len(),
        });
    }
    let mut out = Vec::with_capacity(2 + field.len());
    out.extend_from_slice(&u16be(field.len() as u16));
    out.extend_from_slice(field);
    Ok(out)
}

/// Length-prefixed bytes with a 32-bit big-endian length, used for larger
/// fields such as quantum circuit extras.
pub fn lp32(field: &[u8]) -> Result<Vec<u8>, LengthPrefixError> {
    if field.len() > u32::MAX as usize {
        return Err(LengthPrefixError::TooLong {
            max: u32::MAX as usize,
            actual: field.len(),
        });
    }
    let mut out = Vec::with_capacity(4 + field.len());
    out.extend_from_slice(&u32be(field.len() as u32));
    out.extend_from_slice(field);
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum LengthPrefixError {
    #[error("field length {actual} exceeds maximum {max}")]
    TooLong { max: usize, actual: usize },
}

/// Stable domain-separation tags for every hash the capabilities core
/// computes. Each is a distinct ASCII prefix, never reused across formulas,
/// so a digest from one context can never collide with another by
/// construction.
pub mod domains {
    pub const TASK: &[u8] = b"ANIMICA_CAP_TASK_V1";
    pub const AI: &[u8] = b"ANIMICA_CAP_AI_V1";
    pub const QUANTUM: &[u8] = b"ANIMICA_CAP_QUANTUM_V1";
    pub const RAND: &[u8] = b"ANIMICA_CAP_RAND_V1";
    pub const ASSIGN: &[u8] = b"ANIMICA_CAP_ASSIGN_V1";
    pub const RECEIPT: &[u8] = b"ANIMICA_CAP_RECEIPT_V1";
    /// Local (adapter-less) blob commitment fallback. No adapter-independent
    /// formula is mandated; this tag keeps it distinct from every other
    /// digest this crate computes.
    pub const BLOB: &[u8] = b"ANIMICA_CAP_BLOB_V1";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_hash_separates_domains() {
        let data = b"same payload";
        let a = domain_hash("DOMAIN_A", data);
        let b = domain_hash("DOMAIN_B", data);
        assert_ne!(a, b);
    }

    #[test]
    fn domain_hash_is_deterministic() {
        let a = domain_hash("DOMAIN_TASK", b"x");
        let b = domain_hash("DOMAIN_TASK", b"x");
        assert_eq!(a, b);
    }

    #[test]
    fn lp16_rejects_oversized_fields() {
        let too_long = vec![0u8; u16::MAX as usize + 1];
        assert!(lp16(&too_long).is_err());
    }
}
