// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical JSON serialization and stable hashing.
//!
//! `stable_json` renders a [`serde_json::Value`] with object keys sorted
//! lexicographically and no incidental whitespace, so that two values equal
//! under key-permutation produce byte-identical output. `hash_payload` is
//! the SHA-256 hex digest of that canonical form.
//!
//! Canonicalization walks an owned [`Value`] tree, which is acyclic by
//! construction in safe Rust (there is no shared-mutable-pointer type in the
//! tree), so circular-graph rejection is not reachable here; the recursion
//! depth cap is the actual defense against runaway or adversarial payloads,
//! and doubles as the structural cycle guard the source language needed.

#![deny(unsafe_code)]

use ak_error::{AkError, ErrorCode};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Maximum nesting depth a canonicalized payload may reach.
pub const MAX_DEPTH: usize = 40;
/// Maximum number of entries an object or array may contain at any level.
pub const MAX_WIDTH: usize = 20_000;

/// Render `value` as canonical JSON: sorted keys, no insignificant
/// whitespace, UTF-8 strings.
pub fn stable_json(value: &Value) -> Result<String, AkError> {
    let mut out = String::new();
    write_canonical(value, 0, &mut out)?;
    Ok(out)
}

/// Convenience overload: serialize `value` via serde first.
pub fn stable_json_of<T: Serialize>(value: &T) -> Result<String, AkError> {
    let v = serde_json::to_value(value).map_err(|e| {
        AkError::new(ErrorCode::PayloadTooDeep, "value could not be serialized to JSON")
            .with_source(e)
    })?;
    stable_json(&v)
}

/// SHA-256 hex digest of `stable_json(value)`.
pub fn hash_payload(value: &Value) -> Result<String, AkError> {
    let canon = stable_json(value)?;
    Ok(hash_bytes(canon.as_bytes()))
}

/// SHA-256 hex digest of an arbitrary serializable value's canonical form.
pub fn hash_payload_of<T: Serialize>(value: &T) -> Result<String, AkError> {
    let canon = stable_json_of(value)?;
    Ok(hash_bytes(canon.as_bytes()))
}

/// Raw SHA-256 hex digest of a byte string (used to chain ledger hashes).
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn write_canonical(value: &Value, depth: usize, out: &mut String) -> Result<(), AkError> {
    if depth > MAX_DEPTH {
        return Err(AkError::new(ErrorCode::PayloadTooDeep, "payload exceeds maximum nesting depth")
            .with_context("max_depth", MAX_DEPTH));
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_json_string(s, out),
        Value::Array(items) => {
            if items.len() > MAX_WIDTH {
                return Err(AkError::new(ErrorCode::PayloadTooWide, "array exceeds maximum width")
                    .with_context("max_width", MAX_WIDTH));
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, depth + 1, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            if map.len() > MAX_WIDTH {
                return Err(AkError::new(ErrorCode::PayloadTooWide, "object exceeds maximum width")
                    .with_context("max_width", MAX_WIDTH));
            }
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_canonical(&map[*key], depth + 1, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

/// Serialize a string with JSON escaping, relying on serde_json for the
/// escape table rather than hand-rolling one.
fn write_json_string(s: &str, out: &mut String) {
    // serde_json::to_string on a &str never fails.
    out.push_str(&serde_json::to_string(s).expect("string serialization is infallible"));
}
