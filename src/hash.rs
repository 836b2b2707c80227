//! Canonical Hashing
//!
//! Deterministic SHA-256 over canonicalised values. Objects hash as
//! their JSON serialisation with keys sorted lexicographically, scalars
//! as their textual form, and absent values as the empty string, so any
//! two parties hashing the same semantic input get the same digest.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Shapes the engine actually hashes: identity strings, action text,
/// state snapshots, timestamps.
pub trait Canonical {
    /// Canonical text fed to the digest.
    fn canonical_text(&self) -> String;
}

impl Canonical for str {
    fn canonical_text(&self) -> String {
        self.to_string()
    }
}

impl Canonical for String {
    fn canonical_text(&self) -> String {
        self.clone()
    }
}

impl Canonical for i64 {
    fn canonical_text(&self) -> String {
        self.to_string()
    }
}

impl Canonical for u64 {
    fn canonical_text(&self) -> String {
        self.to_string()
    }
}

impl Canonical for usize {
    fn canonical_text(&self) -> String {
        self.to_string()
    }
}

impl Canonical for Value {
    fn canonical_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => canonical_json(other),
        }
    }
}

impl<T: Canonical> Canonical for Option<T> {
    fn canonical_text(&self) -> String {
        self.as_ref()
            .map(Canonical::canonical_text)
            .unwrap_or_default()
    }
}

impl<T: Canonical + ?Sized> Canonical for &T {
    fn canonical_text(&self) -> String {
        (**self).canonical_text()
    }
}

/// JSON text with keys sorted lexicographically at every depth.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

/// SHA-256 of the canonical text of `input`, as 64 lowercase hex chars.
pub fn hash<T: Canonical + ?Sized>(input: &T) -> String {
    sha256_hex(input.canonical_text().as_bytes())
}

/// SHA-256 over the canonical texts of `parts` joined by `|`.
///
/// Component ordering is significant and fixed by the caller.
pub fn hash_many(parts: &[&dyn Canonical]) -> String {
    let joined = parts
        .iter()
        .map(|p| p.canonical_text())
        .collect::<Vec<_>>()
        .join("|");
    sha256_hex(joined.as_bytes())
}

/// Raw SHA-256 over bytes, hex encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// True when `s` is exactly 64 hex characters.
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}
