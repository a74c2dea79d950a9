//! Canonical JSON encoding used for top-hash computation.
//!
//! Output matches `json.dumps(value, sort_keys=True, separators=(",", ":"))`
//! with the default `ensure_ascii=True`.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Number, Value};

use crate::float::format_float;

/// Errors produced while canonicalizing a value.
#[derive(Debug, thiserror::Error)]
pub enum CanonicalError {
    #[error("value is not representable as JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("non-finite number cannot be canonicalized")]
    NonFinite,
}

/// Canonicalize any serializable value into a fresh byte vector.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&value, &mut out)?;
    Ok(out.into_bytes())
}

/// Append the canonical rendering of `value` to `out`.
pub fn write_canonical(value: &Value, out: &mut String) -> Result<(), CanonicalError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_number(n: &Number, out: &mut String) -> Result<(), CanonicalError> {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
    } else if is_integer_literal(n) {
        // Wider than 64 bits; printed exactly as parsed.
        let _ = write!(out, "{n}");
    } else {
        let f = n.as_f64().ok_or(CanonicalError::NonFinite)?;
        if !f.is_finite() {
            return Err(CanonicalError::NonFinite);
        }
        out.push_str(&format_float(f));
    }
    Ok(())
}

fn is_integer_literal(n: &Number) -> bool {
    !n.to_string().contains(|c| matches!(c, '.' | 'e' | 'E'))
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04x}", unit);
                }
            }
        }
    }
    out.push('"');
}
