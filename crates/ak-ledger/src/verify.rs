// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ledger verification: replay the chain and confirm every hash.

use std::path::Path;

use ak_error::{AkError, ErrorCode};

use crate::{LedgerEntry, GENESIS};

/// Summary of a successful verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub entry_count: usize,
    pub terminal_hash: String,
}

/// Stream the ledger file, checking that every entry's `prevHash` equals
/// the running hash and that every `hash` recomputes correctly; finally
/// confirm the sidecar (if present) matches the terminal hash. Any
/// deviation fails with [`ErrorCode::LedgerCorrupt`], annotated with the
/// offending line number.
pub fn verify_ledger(path: impl AsRef<Path>) -> Result<VerifyReport, AkError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).unwrap_or_default();
    let mut expected_prev = GENESIS.to_string();
    let mut entry_count = 0usize;

    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let entry: LedgerEntry = serde_json::from_str(line).map_err(|e| {
            AkError::new(ErrorCode::LedgerCorrupt, "unparseable ledger line")
                .with_context("line", line_no)
                .with_source(e)
        })?;
        if entry.prev_hash != expected_prev {
            return Err(AkError::new(ErrorCode::LedgerCorrupt, "prevHash does not chain from prior entry")
                .with_context("line", line_no)
                .with_context("expected", expected_prev)
                .with_context("got", entry.prev_hash));
        }
        let canon = ak_hash::stable_json(&entry.payload)?;
        let recomputed = ak_hash::hash_bytes(format!("{}{}", entry.prev_hash, canon).as_bytes());
        if recomputed != entry.hash {
            return Err(AkError::new(ErrorCode::LedgerCorrupt, "entry hash does not match recomputed value")
                .with_context("line", line_no));
        }
        expected_prev = entry.hash;
        entry_count += 1;
    }

    let sidecar_path = crate::sidecar_path_for(path);
    if let Ok(sidecar) = std::fs::read_to_string(&sidecar_path) {
        let trimmed = sidecar.trim();
        if !trimmed.is_empty() && trimmed != expected_prev {
            return Err(AkError::new(ErrorCode::LedgerCorrupt, "sidecar tip does not match terminal ledger hash")
                .with_context("sidecar", trimmed)
                .with_context("terminal", expected_prev));
        }
    }

    Ok(VerifyReport { entry_count, terminal_hash: expected_prev })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ledger;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn verify_succeeds_on_untampered_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let mut ledger = Ledger::open(&path).unwrap();
        ledger.append(&json!({"a": 1})).unwrap();
        ledger.append(&json!({"b": 2})).unwrap();
        let report = verify_ledger(&path).unwrap();
        assert_eq!(report.entry_count, 2);
        assert_eq!(report.terminal_hash, ledger.tip_hash());
    }

    #[test]
    fn verify_fails_when_a_byte_of_payload_is_altered() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let mut ledger = Ledger::open(&path).unwrap();
        ledger.append(&json!({"a": 1})).unwrap();

        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents = contents.replace("\"a\":1", "\"a\":2");
        std::fs::write(&path, contents).unwrap();

        let err = verify_ledger(&path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LedgerCorrupt);
    }

    #[test]
    fn verify_fails_on_broken_prev_hash_link() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let mut ledger = Ledger::open(&path).unwrap();
        ledger.append(&json!({"a": 1})).unwrap();
        ledger.append(&json!({"b": 2})).unwrap();

        let lines: Vec<String> = std::fs::read_to_string(&path).unwrap().lines().map(String::from).collect();
        std::fs::write(&path, format!("{}\n", lines[1])).unwrap();

        let err = verify_ledger(&path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LedgerCorrupt);
    }
}
