// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cryptographic anchoring of a ledger tip hash.
//!
//! An anchor is an RSA-SHA256 signature over `anchor_id:timestamp:ledgerHash`,
//! produced with an externally supplied PKCS#8 private key and verified
//! against the matching public key. This proves the tip hash existed at
//! the claimed time to anyone holding the public key; it is not a claim
//! about a globally trusted clock.

use ak_error::{AkError, ErrorCode};
use ring::rand::SystemRandom;
use ring::signature::{self, RsaKeyPair};
use serde::{Deserialize, Serialize};

/// A signed claim that `ledger_hash` was the chain tip at `timestamp_ms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Anchor {
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    #[serde(rename = "ledgerHash")]
    pub ledger_hash: String,
    pub signature: String,
    #[serde(rename = "anchorId")]
    pub anchor_id: String,
}

fn anchor_message(anchor_id: &str, timestamp_ms: i64, ledger_hash: &str) -> String {
    format!("{anchor_id}:{timestamp_ms}:{ledger_hash}")
}

/// Sign `ledger_hash` at `timestamp_ms` under `anchor_id`, using an
/// RSA private key in PKCS#8 DER form.
pub fn generate_anchor(
    anchor_id: &str,
    timestamp_ms: i64,
    ledger_hash: &str,
    pkcs8_der: &[u8],
) -> Result<Anchor, AkError> {
    let key_pair = RsaKeyPair::from_pkcs8(pkcs8_der).map_err(|e| {
        AkError::new(ErrorCode::UnsafeStartup, "invalid RSA PKCS#8 private key")
            .with_context("detail", e.to_string())
    })?;
    let message = anchor_message(anchor_id, timestamp_ms, ledger_hash);
    let rng = SystemRandom::new();
    let mut signature = vec![0u8; key_pair.public_modulus_len()];
    key_pair
        .sign(&signature::RSA_PKCS1_SHA256, &rng, message.as_bytes(), &mut signature)
        .map_err(|_| AkError::new(ErrorCode::UnsafeStartup, "RSA signing failed"))?;
    Ok(Anchor {
        timestamp_ms,
        ledger_hash: ledger_hash.to_string(),
        signature: hex_encode(&signature),
        anchor_id: anchor_id.to_string(),
    })
}

/// Verify an anchor's signature against an RSA public key (DER,
/// `RSAPublicKey` / PKCS#1 form expected by `ring`).
pub fn verify_anchor(anchor: &Anchor, public_key_der: &[u8]) -> bool {
    let Ok(sig_bytes) = hex_decode(&anchor.signature) else { return false };
    let message = anchor_message(&anchor.anchor_id, anchor.timestamp_ms, &anchor.ledger_hash);
    let public_key =
        signature::UnparsedPublicKey::new(&signature::RSA_PKCS1_2048_8192_SHA256, public_key_der);
    public_key.verify(message.as_bytes(), &sig_bytes).is_ok()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}
