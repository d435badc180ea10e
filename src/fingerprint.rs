//! Canonical content fingerprints.
//!
//! A fingerprint identifies a structured value independently of the order in
//! which its fields were inserted. The value is rendered to a canonical text
//! form and hashed with SHA-256:
//!
//! - object keys are sorted lexicographically at every depth
//! - items are separated by `", "` and keys from values by `": "`
//! - every non-ASCII character is written as a `\uXXXX` escape (surrogate
//!   pairs above the BMP)
//!
//! - integers are written as-is; floats use the shortest digits that round-trip,
//!   in positional form for exponents from -4 to 15 (always with a fractional
//!   part, `5.0`) and as `1e+16` or `1.5e-07` otherwise
//!
//! The result is rendered as `sha256:<64 hex digits>`. This is the same text
//! form a Python `json.dumps(value, sort_keys=True)` produces for finite
//! values, so fingerprints recorded by earlier tooling in an existing patch log
//! stay comparable.
//!
//! # Example
//!
//! ```rust
//! use jarpatch::fingerprint::{canonical_json, fingerprint};
//! use serde_json::json;
//!
//! let a = json!({"name": "Warrior", "key": "warrior"});
//! let b = json!({"key": "warrior", "name": "Warrior"});
//! assert_eq!(canonical_json(&a), r#"{"key": "warrior", "name": "Warrior"}"#);
//! assert_eq!(fingerprint(&a), fingerprint(&b));
//! ```

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Algorithm tag prefixed to every fingerprint.
pub const ALGORITHM: &str = "sha256";

/// A content fingerprint in `<algorithm>:<hex digest>` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps an already-rendered fingerprint string, e.g. one read from a log.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the full `<algorithm>:<digest>` text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the algorithm tag, if the text has one.
    pub fn algorithm(&self) -> Option<&str> {
        self.0.split_once(':').map(|(alg, _)| alg)
    }

    /// Returns the hex digest without the algorithm tag.
    pub fn digest(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(_, d)| d)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of a JSON value.
pub fn fingerprint(value: &Value) -> Fingerprint {
    fingerprint_text(&canonical_json(value))
}

/// Computes the fingerprint of a JSON object without wrapping it in a value.
pub(crate) fn fingerprint_map(map: &Map<String, Value>) -> Fingerprint {
    let mut out = String::new();
    write_object(&mut out, map);
    fingerprint_text(&out)
}

fn fingerprint_text(text: &str) -> Fingerprint {
    let digest = Sha256::digest(text.as_bytes());
    Fingerprint(format!("{}:{}", ALGORITHM, hex::encode(digest)))
}

/// Renders the canonical text form of a JSON value.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => write_float(out, f),
            _ => {
                let _ = write!(out, "{}", n);
            }
        },
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(out, map),
    }
}

fn write_object(out: &mut String, map: &Map<String, Value>) {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_string(out, key);
        out.push_str(": ");
        write_value(out, value);
    }
    out.push('}');
}

fn write_float(out: &mut String, f: f64) {
    // `{:e}` yields the shortest round-trip digits, e.g. `-2.5e-7`.
    let sci = format!("{:e}", f);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let mantissa = match mantissa.strip_prefix('-') {
        Some(rest) => {
            out.push('-');
            rest
        }
        None => mantissa,
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exp) {
        if exp >= 0 {
            let int_len = exp as usize + 1;
            if digits.len() <= int_len {
                out.push_str(&digits);
                out.extend(std::iter::repeat_n('0', int_len - digits.len()));
                out.push_str(".0");
            } else {
                out.push_str(&digits[..int_len]);
                out.push('.');
                out.push_str(&digits[int_len..]);
            }
        } else {
            out.push_str("0.");
            out.extend(std::iter::repeat_n('0', (-exp - 1) as usize));
            out.push_str(&digits);
        }
    } else {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let sign = if exp < 0 { '-' } else { '+' };
        let _ = write!(out, "e{}{:02}", sign, exp.unsigned_abs());
    }
}

fn write_string(out: &mut String, s: &str) {
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
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04x}", unit);
                }
            }
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_sorts_nested_keys() {
        let value = json!({"b": {"y": 1, "x": [true, null]}, "a": "s"});
        assert_eq!(
            canonical_json(&value),
            r#"{"a": "s", "b": {"x": [true, null], "y": 1}}"#
        );
    }

    #[test]
    fn test_canonical_escapes_non_ascii() {
        let value = json!({"name": "Café ☕ 𝄞", "tab": "a\tb"});
        assert_eq!(
            canonical_json(&value),
            r#"{"name": "Caf\u00e9 \u2615 \ud834\udd1e", "tab": "a\tb"}"#
        );
    }

    #[test]
    fn test_canonical_escapes_control_chars() {
        let value = json!("\u{01}");
        assert_eq!(canonical_json(&value), r#""\u0001""#);
    }

    #[test]
    fn test_canonical_float_forms() {
        let value = json!([
            1.5,
            5.0,
            -0.0,
            0.0001,
            1e-5,
            1.5e-7,
            1e15,
            1e16,
            123456789012345680.0,
            29071.691878102818,
            -2.5e22
        ]);
        assert_eq!(
            canonical_json(&value),
            "[1.5, 5.0, -0.0, 0.0001, 1e-05, 1.5e-07, 1000000000000000.0, 1e+16, \
             1.2345678901234568e+17, 29071.691878102818, -2.5e+22]"
        );
    }

    #[test]
    fn test_canonical_integers_stay_integral() {
        let value = json!([0, -7, 10000000000000000i64, u64::MAX]);
        assert_eq!(
            canonical_json(&value),
            "[0, -7, 10000000000000000, 18446744073709551615]"
        );
    }

    #[test]
    fn test_known_digest() {
        // sha256 of `{}`
        assert_eq!(
            fingerprint(&json!({})).as_str(),
            "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn test_fingerprint_parts() {
        let fp = fingerprint(&json!({"key": "warrior"}));
        assert_eq!(fp.algorithm(), Some(ALGORITHM));
        assert_eq!(fp.digest().len(), 64);
        assert!(fp.digest().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_map_matches_value() {
        let value = json!({"key": "warrior", "power": 5});
        let map = value.as_object().unwrap();
        assert_eq!(fingerprint_map(map), fingerprint(&value));
    }

    #[test]
    fn test_different_values_differ() {
        let a = fingerprint(&json!({"power": 5}));
        let b = fingerprint(&json!({"power": 6}));
        assert_ne!(a, b);
    }
}
