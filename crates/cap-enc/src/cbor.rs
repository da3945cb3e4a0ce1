//! Canonical CBOR encode/decode over the restricted [`Value`] model.
//!
//! Follows RFC 8949 §4.2's deterministic encoding rules for the subset of
//! major types this codec supports: integers are minimally encoded, map
//! keys are sorted ascending by their own encoded bytes, floats are always
//! binary64, and no indefinite-length items are ever produced. The decoder
//! enforces the same rules on the way in rather than trusting the wire.

use crate::value::{key_order, Value};
use crate::CodecError;

const MAJOR_UINT: u8 = 0;
const MAJOR_NINT: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;
const MAJOR_SIMPLE: u8 = 7;

pub fn encode(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    encode_into(value, &mut out)?;
    Ok(out)
}

pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    let (value, consumed) = decode_item(bytes)?;
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes);
    }
    Ok(value)
}

fn encode_into(value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match value {
        Value::Null => out.push(0xf6),
        Value::Bool(false) => out.push(0xf4),
        Value::Bool(true) => out.push(0xf5),
        Value::Int(i) => encode_int(*i, out)?,
        Value::Bytes(b) => {
            encode_head(MAJOR_BYTES, b.len() as u64, out);
            out.extend_from_slice(b);
        }
        Value::Text(s) => {
            let bytes = s.as_bytes();
            encode_head(MAJOR_TEXT, bytes.len() as u64, out);
            out.extend_from_slice(bytes);
        }
        Value::Array(items) => {
            encode_head(MAJOR_ARRAY, items.len() as u64, out);
            for item in items {
                encode_into(item, out)?;
            }
        }
        Value::Map(entries) => encode_map(entries, out)?,
        Value::Float(f) => {
            out.push(0xfb);
            out.extend_from_slice(&f.to_bits().to_be_bytes());
        }
    }
    Ok(())
}

fn encode_int(i: i128, out: &mut Vec<u8>) -> Result<(), CodecError> {
    if i >= 0 {
        let v: u64 = i
            .try_into()
            .map_err(|_| CodecError::IntegerOutOfRange(i))?;
        encode_head(MAJOR_UINT, v, out);
    } else {
        let magnitude = (-1 - i)
            .try_into()
            .map_err(|_| CodecError::IntegerOutOfRange(i))?;
        encode_head(MAJOR_NINT, magnitude, out);
    }
    Ok(())
}

fn encode_head(major: u8, value: u64, out: &mut Vec<u8>) {
    let major_bits = major << 5;
    if value < 24 {
        out.push(major_bits | value as u8);
    } else if value <= u8::MAX as u64 {
        out.push(major_bits | 24);
        out.push(value as u8);
    } else if value <= u16::MAX as u64 {
        out.push(major_bits | 25);
        out.extend_from_slice(&(value as u16).to_be_bytes());
    } else if value <= u32::MAX as u64 {
        out.push(major_bits | 26);
        out.extend_from_slice(&(value as u32).to_be_bytes());
    } else {
        out.push(major_bits | 27);
        out.extend_from_slice(&value.to_be_bytes());
    }
}

fn encode_map(entries: &[(Value, Value)], out: &mut Vec<u8>) -> Result<(), CodecError> {
    let mut encoded: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        if !k.map_key_is_valid() {
            return Err(CodecError::InvalidMapKey);
        }
        let key_bytes = encode(k)?;
        let val_bytes = encode(v)?;
        encoded.push((key_bytes, val_bytes));
    }
    encoded.sort_by(|a, b| key_order(&a.0, &b.0));
    for i in 1..encoded.len() {
        if encoded[i - 1].0 == encoded[i].0 {
            return Err(CodecError::DuplicateMapKey);
        }
    }
    encode_head(MAJOR_MAP, encoded.len() as u64, out);
    for (k, v) in encoded {
        out.extend_from_slice(&k);
        out.extend_from_slice(&v);
    }
    Ok(())
}

fn decode_item(bytes: &[u8]) -> Result<(Value, usize), CodecError> {
    let (major, arg, header_len) = decode_head(bytes)?;
    match major {
        MAJOR_UINT => Ok((Value::Int(arg as i128), header_len)),
        MAJOR_NINT => Ok((Value::Int(-1 - arg as i128), header_len)),
        MAJOR_BYTES => {
            let len = arg as usize;
            let end = header_len
                .checked_add(len)
                .ok_or(CodecError::Truncated)?;
            let body = bytes.get(header_len..end).ok_or(CodecError::Truncated)?;
            Ok((Value::Bytes(body.to_vec()), end))
        }
        MAJOR_TEXT => {
            let len = arg as usize;
            let end = header_len
                .checked_add(len)
                .ok_or(CodecError::Truncated)?;
            let body = bytes.get(header_len..end).ok_or(CodecError::Truncated)?;
            let text = std::str::from_utf8(body).map_err(|_| CodecError::InvalidUtf8)?;
            Ok((Value::Text(text.to_string()), end))
        }
        MAJOR_ARRAY => {
            let len = arg as usize;
            let mut offset = header_len;
            let mut items = Vec::with_capacity(len.min(1 << 16));
            for _ in 0..len {
                let (item, consumed) = decode_item(&bytes[offset..])?;
                items.push(item);
                offset += consumed;
            }
            Ok((Value::Array(items), offset))
        }
        MAJOR_MAP => {
            let len = arg as usize;
            let mut offset = header_len;
            let mut entries = Vec::with_capacity(len.min(1 << 16));
            let mut prev_key_bytes: Option<Vec<u8>> = None;
            for _ in 0..len {
                let key_start = offset;
                let (key, key_consumed) = decode_item(&bytes[offset..])?;
                if !key.map_key_is_valid() {
                    return Err(CodecError::InvalidMapKey);
                }
                let key_bytes = bytes[key_start..key_start + key_consumed].to_vec();
                offset += key_consumed;
                let (val, val_consumed) = decode_item(&bytes[offset..])?;
                offset += val_consumed;
                if let Some(prev) = &prev_key_bytes {
                    match key_order(prev, &key_bytes) {
                        std::cmp::Ordering::Less => {}
                        _ => return Err(CodecError::MapKeysNotCanonical),
                    }
                }
                prev_key_bytes = Some(key_bytes);
                entries.push((key, val));
            }
            Ok((Value::Map(entries), offset))
        }
        MAJOR_TAG => {
            // Tags are consumed and discarded; the decoder never round
            // trips them back out (the encoder emits none).
            let (inner, consumed) = decode_item(&bytes[header_len..])?;
            Ok((inner, header_len + consumed))
        }
        MAJOR_SIMPLE => decode_simple(arg, header_len, bytes),
        _ => Err(CodecError::UnsupportedMajorType(major)),
    }
}

fn decode_simple(arg: u64, header_len: usize, bytes: &[u8]) -> Result<(Value, usize), CodecError> {
    match arg {
        20 => Ok((Value::Bool(false), header_len)),
        21 => Ok((Value::Bool(true), header_len)),
        22 => Ok((Value::Null, header_len)),
        27 => {
            let end = header_len.checked_add(8).ok_or(CodecError::Truncated)?;
            let body = bytes.get(header_len..end).ok_or(CodecError::Truncated)?;
            let bits = u64::from_be_bytes(body.try_into().unwrap());
            Ok((Value::Float(f64::from_bits(bits)), end))
        }
        other => Err(CodecError::UnsupportedSimple(other)),
    }
}

/// Returns `(major type, argument, bytes consumed by the head)`. The
/// "argument" is the additional-info payload: the literal value for
/// small heads, or the following 1/2/4/8-byte integer, always rejecting
/// non-minimal encodings (a head that could have used a shorter form).
fn decode_head(bytes: &[u8]) -> Result<(u8, u64, usize), CodecError> {
    let first = *bytes.first().ok_or(CodecError::Truncated)?;
    let major = first >> 5;
    let info = first & 0x1f;
    match info {
        0..=23 => Ok((major, info as u64, 1)),
        24 => {
            let b = *bytes.get(1).ok_or(CodecError::Truncated)?;
            if b < 24 {
                return Err(CodecError::NonMinimalInt);
            }
            Ok((major, b as u64, 2))
        }
        25 => {
            let b = bytes.get(1..3).ok_or(CodecError::Truncated)?;
            let v = u16::from_be_bytes(b.try_into().unwrap());
            if v <= u8::MAX as u16 {
                return Err(CodecError::NonMinimalInt);
            }
            Ok((major, v as u64, 3))
        }
        26 => {
            let b = bytes.get(1..5).ok_or(CodecError::Truncated)?;
            let v = u32::from_be_bytes(b.try_into().unwrap());
            if v <= u16::MAX as u32 {
                return Err(CodecError::NonMinimalInt);
            }
            Ok((major, v as u64, 5))
        }
        27 => {
            if major == MAJOR_SIMPLE {
                // float64 marker; argument is unused by callers of this arm.
                return Ok((major, 27, 1));
            }
            let b = bytes.get(1..9).ok_or(CodecError::Truncated)?;
            let v = u64::from_be_bytes(b.try_into().unwrap());
            if v <= u32::MAX as u64 {
                return Err(CodecError::NonMinimalInt);
            }
            Ok((major, v, 9))
        }
        28..=30 => Err(CodecError::UnsupportedSimple(info as u64)),
        31 => Err(CodecError::IndefiniteLength),
        _ => unreachable!(),
    }
}
