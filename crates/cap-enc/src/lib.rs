//! Canonical CBOR codec and domain-separated digests for the capabilities
//! core, grounded on the teacher's `bpi_enc` crate: a `CanonicalCbor`-style
//! encode/decode surface plus a `domain_hash` primitive, but with a real
//! canonical CBOR implementation underneath rather than a JSON passthrough.

mod cbor;
mod digest;
mod value;

pub use digest::{
    domain_hash, domains, lp16, lp32, sha3_256, sha3_512, u16be, u32be, u64be, Hash32, Hash64,
    LengthPrefixError,
};
pub use value::{FromValue, ToValue, Value};

/// Errors raised by the canonical codec. Spec.md names these all
/// `CODEC_ERROR` at the syscall boundary; this enum carries the detail a
/// caller needs to decide whether a bug is theirs or the wire's.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CodecError {
    #[error("map key is not one of {{int, text, bytes}}")]
    InvalidMapKey,
    #[error("map contains a duplicate key after canonical sorting")]
    DuplicateMapKey,
    #[error("map keys are not encoded in canonical ascending order")]
    MapKeysNotCanonical,
    #[error("integer {0} cannot be represented by this codec")]
    IntegerOutOfRange(i128),
    #[error("text field is not valid utf-8")]
    InvalidUtf8,
    #[error("unexpected trailing bytes after decoding one item")]
    TrailingBytes,
    #[error("input truncated before a complete item could be decoded")]
    Truncated,
    #[error("unsupported CBOR major type {0}")]
    UnsupportedMajorType(u8),
    #[error("unsupported CBOR simple value {0}")]
    UnsupportedSimple(u64),
    #[error("integer encoded in a non-minimal form")]
    NonMinimalInt,
    #[error("indefinite-length items are not supported by the canonical codec")]
    IndefiniteLength,
    #[error("expected field `{0}` was missing or had the wrong type")]
    MissingOrWrongType(&'static str),
}

/// Encode any [`Value`] as canonical CBOR bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>, CodecError> {
    cbor::encode(value)
}

/// Decode canonical CBOR bytes into a [`Value`], rejecting any input that
/// was not itself produced in canonical form (out-of-order map keys,
/// non-minimal integers, indefinite-length items).
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    cbor::decode(bytes)
}

/// Convenience: encode a [`ToValue`] type directly to canonical CBOR bytes.
pub fn encode_typed<T: ToValue>(value: &T) -> Result<Vec<u8>, CodecError> {
    encode(&value.to_value())
}

/// Convenience: decode canonical CBOR bytes directly into a [`FromValue`]
/// type.
pub fn decode_typed<T: FromValue>(bytes: &[u8]) -> Result<T, CodecError> {
    let value = decode(bytes)?;
    T::from_value(&value)
}
