// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only, hash-chained forensic ledger.
//!
//! Each session owns one JSONL file plus a sidecar `<file>.last_hash`
//! holding the current tip hash. Appends are redacted (`ak_redact`) before
//! they are canonicalized and hashed (`ak_hash`), so the ledger can be
//! published without secret disclosure while remaining independently
//! verifiable.

#![deny(unsafe_code)]

pub mod anchor;
pub mod verify;

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use ak_error::{AkError, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use verify::{verify_ledger, VerifyReport};

/// The literal previous-hash value for a ledger's first entry.
pub const GENESIS: &str = "GENESIS";

/// One line of the ledger file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    #[serde(rename = "prevHash")]
    pub prev_hash: String,
    pub hash: String,
    pub payload: Value,
}

/// A single-writer handle to one session's ledger file and its sidecar.
pub struct Ledger {
    path: PathBuf,
    sidecar_path: PathBuf,
    tip: String,
}

impl Ledger {
    /// Open (creating if absent) the ledger at `path`, resolving the tip
    /// hash from the sidecar, or by scanning the file backwards if the
    /// sidecar is missing or empty, healing the sidecar either way.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AkError> {
        let path = path.into();
        let sidecar_path = sidecar_path_for(&path);
        let tip = resolve_tip(&path, &sidecar_path)?;
        Ok(Self { path, sidecar_path, tip })
    }

    /// The current chain tip hash.
    pub fn tip_hash(&self) -> &str {
        &self.tip
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Redact, canonicalize, hash, and append `payload`, then atomically
    /// advance the sidecar tip.
    pub fn append(&mut self, payload: &Value) -> Result<LedgerEntry, AkError> {
        let redacted = ak_redact::redact(payload);
        let canon = ak_hash::stable_json(&redacted)?;
        let hash = ak_hash::hash_bytes(format!("{}{}", self.tip, canon).as_bytes());
        let entry = LedgerEntry { prev_hash: self.tip.clone(), hash: hash.clone(), payload: redacted };

        append_line(&self.path, &entry)?;
        write_sidecar_atomic(&self.sidecar_path, &hash)?;
        self.tip = hash;
        tracing::debug!(target: "ak.ledger", hash = %entry.hash, "appended ledger entry");
        Ok(entry)
    }
}

pub(crate) fn sidecar_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".last_hash");
    PathBuf::from(os)
}

fn resolve_tip(path: &Path, sidecar_path: &Path) -> Result<String, AkError> {
    if let Ok(contents) = std::fs::read_to_string(sidecar_path) {
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    let tip = scan_last_hash(path)?;
    write_sidecar_atomic(sidecar_path, &tip)?;
    Ok(tip)
}

fn scan_last_hash(path: &Path) -> Result<String, AkError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            for line in contents.lines().rev() {
                if line.trim().is_empty() {
                    continue;
                }
                if let Ok(entry) = serde_json::from_str::<LedgerEntry>(line) {
                    return Ok(entry.hash);
                }
            }
            Ok(GENESIS.to_string())
        }
        Err(_) => Ok(GENESIS.to_string()),
    }
}

fn append_line(path: &Path, entry: &LedgerEntry) -> Result<(), AkError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).map_err(|e| {
        AkError::new(ErrorCode::LedgerCorrupt, "could not open ledger file for append").with_source(e)
    })?;
    let line = serde_json::to_string(entry).map_err(|e| {
        AkError::new(ErrorCode::LedgerCorrupt, "ledger entry failed to serialize").with_source(e)
    })?;
    writeln!(file, "{line}").map_err(|e| {
        AkError::new(ErrorCode::LedgerCorrupt, "could not write ledger line").with_source(e)
    })?;
    file.flush().map_err(|e| {
        AkError::new(ErrorCode::LedgerCorrupt, "could not flush ledger file").with_source(e)
    })
}

/// Overwrite the sidecar via a temp-file-then-rename so a crash mid-write
/// never leaves a partially-written tip file.
fn write_sidecar_atomic(sidecar_path: &Path, hash: &str) -> Result<(), AkError> {
    let dir = sidecar_path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        AkError::new(ErrorCode::LedgerCorrupt, "could not create sidecar temp file").with_source(e)
    })?;
    tmp.write_all(hash.as_bytes()).map_err(|e| {
        AkError::new(ErrorCode::LedgerCorrupt, "could not write sidecar temp file").with_source(e)
    })?;
    tmp.persist(sidecar_path).map_err(|e| {
        AkError::new(ErrorCode::LedgerCorrupt, "could not persist sidecar file").with_source(e.error)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn first_append_chains_from_genesis() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        let mut ledger = Ledger::open(&path).unwrap();
        assert_eq!(ledger.tip_hash(), GENESIS);
        let entry = ledger.append(&json!({"set_value": "hello"})).unwrap();
        assert_eq!(entry.prev_hash, GENESIS);
        assert_eq!(ledger.tip_hash(), entry.hash);
    }

    #[test]
    fn sidecar_tracks_tip_after_each_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let mut ledger = Ledger::open(&path).unwrap();
        ledger.append(&json!({"a": 1})).unwrap();
        let e2 = ledger.append(&json!({"b": 2})).unwrap();
        let sidecar = std::fs::read_to_string(sidecar_path_for(&path)).unwrap();
        assert_eq!(sidecar.trim(), e2.hash);
    }

    #[test]
    fn reopen_without_sidecar_heals_by_scanning_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let mut ledger = Ledger::open(&path).unwrap();
        let e1 = ledger.append(&json!({"a": 1})).unwrap();
        std::fs::remove_file(sidecar_path_for(&path)).unwrap();

        let reopened = Ledger::open(&path).unwrap();
        assert_eq!(reopened.tip_hash(), e1.hash);
        let sidecar = std::fs::read_to_string(sidecar_path_for(&path)).unwrap();
        assert_eq!(sidecar.trim(), e1.hash);
    }

    #[test]
    fn secrets_are_redacted_before_hashing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let mut ledger = Ledger::open(&path).unwrap();
        let entry = ledger.append(&json!({"api_key": "sk-verysecretvalue"})).unwrap();
        assert_eq!(entry.payload["api_key"], json!("[REDACTED]"));
    }

    #[test]
    fn entries_are_strictly_chained_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let mut ledger = Ledger::open(&path).unwrap();
        let e1 = ledger.append(&json!({"i": 1})).unwrap();
        let e2 = ledger.append(&json!({"i": 2})).unwrap();
        let e3 = ledger.append(&json!({"i": 3})).unwrap();
        assert_eq!(e2.prev_hash, e1.hash);
        assert_eq!(e3.prev_hash, e2.hash);
    }
}
