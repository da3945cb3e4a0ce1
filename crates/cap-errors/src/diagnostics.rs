//! Diagnostic sanitization: truncates bytes/strings beyond a cap and
//! summarizes containers beyond a cap, so error `details` maps can never
//! balloon into a denial-of-service vector or leak more of a payload than
//! intended. Never panics — worst case it returns a summary placeholder.

use cap_enc::Value;

pub const DEFAULT_STRING_CAP: usize = 256;
pub const DEFAULT_BYTES_CAP: usize = 256;
pub const DEFAULT_CONTAINER_CAP: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct Diagnostics {
    pub max_string_len: usize,
    pub max_bytes_len: usize,
    pub max_container_items: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            max_string_len: DEFAULT_STRING_CAP,
            max_bytes_len: DEFAULT_BYTES_CAP,
            max_container_items: DEFAULT_CONTAINER_CAP,
        }
    }
}

impl Diagnostics {
    pub fn sanitize(&self, value: &Value) -> Value {
        sanitize_with(value, self)
    }
}

/// Free-function entry point using the default caps, for call sites that
/// don't need a custom [`Diagnostics`] instance.
pub fn sanitize_value(value: &Value) -> Value {
    Diagnostics::default().sanitize(value)
}

fn sanitize_with(value: &Value, caps: &Diagnostics) -> Value {
    match value {
        Value::Text(s) => Value::Text(truncate_str(s, caps.max_string_len)),
        Value::Bytes(b) => {
            if b.len() <= caps.max_bytes_len {
                Value::Bytes(b.clone())
            } else {
                Value::Text(format!(
                    "<{} bytes, truncated at {}>",
                    b.len(),
                    caps.max_bytes_len
                ))
            }
        }
        Value::Array(items) => {
            if items.len() <= caps.max_container_items {
                Value::Array(items.iter().map(|v| sanitize_with(v, caps)).collect())
            } else {
                Value::Text(format!(
                    "<array of {} items, summarized at {}>",
                    items.len(),
                    caps.max_container_items
                ))
            }
        }
        Value::Map(entries) => {
            if entries.len() <= caps.max_container_items {
                Value::Map(
                    entries
                        .iter()
                        .map(|(k, v)| (k.clone(), sanitize_with(v, caps)))
                        .collect(),
                )
            } else {
                Value::Text(format!(
                    "<map of {} entries, summarized at {}>",
                    entries.len(),
                    caps.max_container_items
                ))
            }
        }
        other => other.clone(),
    }
}

/// Truncate a string to at most `max_len` bytes on a UTF-8 boundary,
/// appending a marker so truncation is never silent.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...<truncated from {}>", &s[..end], s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_pass_through() {
        let caps = Diagnostics::default();
        let v = caps.sanitize(&Value::text("hi"));
        assert_eq!(v, Value::text("hi"));
    }

    #[test]
    fn long_strings_are_truncated() {
        let caps = Diagnostics {
            max_string_len: 4,
            ..Default::default()
        };
        let v = caps.sanitize(&Value::text("hello world"));
        match v {
            Value::Text(s) => assert!(s.starts_with("hell") && s.contains("truncated")),
            _ => panic!("expected text"),
        }
    }

    #[test]
    fn large_containers_are_summarized() {
        let caps = Diagnostics {
            max_container_items: 2,
            ..Default::default()
        };
        let arr = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        match caps.sanitize(&arr) {
            Value::Text(s) => assert!(s.contains("3 items")),
            _ => panic!("expected summary text"),
        }
    }

    #[test]
    fn never_panics_on_empty_string() {
        let caps = Diagnostics {
            max_string_len: 0,
            ..Default::default()
        };
        let _ = caps.sanitize(&Value::text(""));
    }
}
