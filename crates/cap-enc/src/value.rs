use std::cmp::Ordering;

/// The restricted data model the canonical codec can carry: enough to
/// represent job payloads, receipts, and proof bodies without pulling in
/// a general-purpose CBOR crate whose canonicalization rules we'd have to
/// trust blindly.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i128),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Value>),
    /// Map entries in arbitrary insertion order; the encoder sorts them by
    /// encoded-key bytes before writing, so construction order never
    /// matters for the resulting digest.
    Map(Vec<(Value, Value)>),
    Float(f64),
}

impl Value {
    pub fn map_key_is_valid(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Text(_) | Value::Bytes(_))
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn get<'a>(&'a self, key: &str) -> Option<&'a Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(b.into())
    }

    pub fn int(i: impl Into<i128>) -> Value {
        Value::Int(i.into())
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Value {
        Value::Map(entries)
    }
}

/// Lexicographic order over two keys' canonical encodings. Used both by the
/// encoder (to sort a map's entries) and the decoder (to reject a map whose
/// keys were not already sorted this way).
pub(crate) fn key_order(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

pub trait ToValue {
    fn to_value(&self) -> Value;
}

pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, crate::CodecError>;
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, crate::CodecError> {
        Ok(value.clone())
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl ToValue for [u8] {
    fn to_value(&self) -> Value {
        Value::Bytes(self.to_vec())
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

macro_rules! impl_to_value_int {
    ($($t:ty),*) => {
        $(impl ToValue for $t {
            fn to_value(&self) -> Value {
                Value::Int(*self as i128)
            }
        })*
    };
}
impl_to_value_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(|v| v.to_value()).collect())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, crate::CodecError> {
        value
            .as_text()
            .map(|s| s.to_string())
            .ok_or(crate::CodecError::MissingOrWrongType("string"))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, crate::CodecError> {
        value
            .as_bytes()
            .map(|b| b.to_vec())
            .ok_or(crate::CodecError::MissingOrWrongType("bytes"))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, crate::CodecError> {
        match value {
            Value::Bool(b) => Ok(*b),
            _ => Err(crate::CodecError::MissingOrWrongType("bool")),
        }
    }
}

macro_rules! impl_from_value_int {
    ($($t:ty),*) => {
        $(impl FromValue for $t {
            fn from_value(value: &Value) -> Result<Self, crate::CodecError> {
                let i = value.as_int().ok_or(crate::CodecError::MissingOrWrongType("int"))?;
                <$t>::try_from(i).map_err(|_| crate::CodecError::IntegerOutOfRange(i))
            }
        })*
    };
}
impl_from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, crate::CodecError> {
        match value {
            Value::Float(f) => Ok(*f),
            _ => Err(crate::CodecError::MissingOrWrongType("float")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, crate::CodecError> {
        match value {
            Value::Null => Ok(None),
            other => Ok(Some(T::from_value(other)?)),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, crate::CodecError> {
        value
            .as_array()
            .ok_or(crate::CodecError::MissingOrWrongType("array"))?
            .iter()
            .map(T::from_value)
            .collect()
    }
}
