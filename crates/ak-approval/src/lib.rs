// SPDX-License-Identifier: MIT OR Apache-2.0
//! One-shot approval tokens (design §4.8): a token is a bearer credential
//! bound to the exact canonical-JSON fingerprint of the request it was
//! granted for, consumable exactly once.

#![deny(unsafe_code)]

use std::time::Duration;

use ak_cache::BoundedCache;
use ak_error::{AkError, ErrorCode};
use base64::Engine;
use rand::RngCore;
use serde::Serialize;
use serde_json::{Map, Value};

/// The fields hashed to produce a bind-hash. `approval_token` and
/// `capability_approval_token` are always stripped from the request before
/// hashing, so a token can never bind to a payload that contains itself.
#[derive(Debug, Clone, Serialize)]
pub struct BindRequest {
    pub command: String,
    pub argv: Vec<String>,
    pub env: Value,
    pub cwd: String,
    pub host: Option<String>,
    pub security: Value,
    pub ask: Option<String>,
    pub agent_id: String,
    pub resolved_path: Option<String>,
    pub session_key: String,
}

const STRIPPED_FIELDS: &[&str] = &["approvalToken", "capabilityApprovalToken"];

/// Compute the bind-hash for a request, sorting `argv` canonically and
/// stripping any approval-token fields before hashing.
pub fn compute_bind_hash(request: &BindRequest) -> Result<String, AkError> {
    let mut value = serde_json::to_value(request)
        .map_err(|e| AkError::new(ErrorCode::PolicyInvalidIntent, "request did not serialize").with_source(e))?;

    if let Value::Object(map) = &mut value {
        for field in STRIPPED_FIELDS {
            map.remove(*field);
        }
        if let Some(Value::Array(argv)) = map.get_mut("argv") {
            let mut sorted: Vec<String> =
                argv.iter().filter_map(|v| v.as_str().map(String::from)).collect();
            sorted.sort_unstable();
            *argv = sorted.into_iter().map(Value::String).collect();
        }
    }

    ak_hash::hash_payload(&value)
}

#[derive(Debug, Clone)]
struct Grant {
    bind_hash: String,
    consumed: bool,
}

/// Issues and consumes one-shot approval tokens, backed by a bounded TTL
/// map so abandoned grants age out rather than accumulating forever.
pub struct ApprovalTokenManager {
    grants: BoundedCache<String, Grant>,
}

impl ApprovalTokenManager {
    pub fn new(max_tokens: usize, ttl: Duration) -> Self {
        Self { grants: BoundedCache::with_ttl(max_tokens, ttl) }
    }

    /// Issue a fresh 32-byte URL-safe token bound to `bind_hash`.
    pub fn issue_token(&mut self, bind_hash: impl Into<String>) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        self.grants.set(token.clone(), Grant { bind_hash: bind_hash.into(), consumed: false });
        token
    }

    /// Consume `token` iff it exists, has not yet been consumed, and its
    /// stored bind-hash matches `bind_hash` exactly. A token is marked
    /// consumed on its first successful match and on any mismatch attempt,
    /// so it can never be retried into a match.
    pub fn consume_token(&mut self, token: &str, bind_hash: &str) -> bool {
        let Some(grant) = self.grants.get(&token.to_string()).cloned() else {
            return false;
        };
        if grant.consumed {
            return false;
        }
        let matches = grant.bind_hash == bind_hash;
        self.grants.set(token.to_string(), Grant { bind_hash: grant.bind_hash, consumed: true });
        matches
    }
}

#[allow(dead_code)]
fn empty_object() -> Value {
    Value::Object(Map::new())
}
