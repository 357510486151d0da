//! Canonical JSON encoding for hashing.
//!
//! Canonical form rules:
//! - Object keys sorted ascending by their UTF-8 bytes
//! - No insignificant whitespace (`,` and `:` separators only)
//! - UTF-8 output; non-ASCII characters are never escaped
//! - Strings escape only `"`, `\` and control characters below U+0020
//!   (`\b \f \n \r \t` short forms, `\u00XX` otherwise)
//! - Integers in plain decimal; floats in their shortest round-trip form
//! - `true`, `false`, `null` as literals
//!
//! The encoding is a pure function of the value. Any change to these rules
//! produces different hashes for existing records and must come with a new
//! [`CANONICAL_FORM`] identifier.

use serde_json::{Number, Value};

/// Identifier of the canonical form produced by this module.
pub const CANONICAL_FORM: &str = "pancake-json-c14n/1";

/// Encode a value to its canonical bytes.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    canonical_string(value).into_bytes()
}

/// Canonical form as a `String`.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::with_capacity(128);
    encode_value(value, &mut out);
    out
}

/// Length in bytes of the canonical encoding.
pub fn canonical_len(value: &Value) -> usize {
    canonicalize(value).len()
}

fn encode_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => encode_number(n, out),
        Value::String(s) => encode_str(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_str(key, out);
                out.push(':');
                encode_value(val, out);
            }
            out.push('}');
        }
    }
}

fn encode_number(n: &Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
    } else {
        // serde_json rejects NaN and infinities at parse time, so the
        // remaining case is a finite f64.
        out.push_str(&n.to_string());
    }
}

fn encode_str(s: &str, out: &mut String) {
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
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}
