// SPDX-License-Identifier: MIT OR Apache-2.0
//! Replay Engine (design §4.13): re-run recorded ledger entries through a
//! pure executor and confirm the post-state hashes match exactly.

use ak_error::{AkError, ErrorCode};
use ak_ledger::LedgerEntry;
use serde_json::Value;

use crate::merge::deep_merge;

/// Re-run `entries` in order starting from `initial_state`, applying each
/// entry's recorded `diff` through the same deep-merge the original
/// dispatch used, and confirm the recomputed state hash matches the one
/// recorded in the entry's payload at every step.
///
/// Returns `Ok(())` if every entry's post-state hash reproduces exactly;
/// otherwise returns `ReplayDiverged` naming the first offending index.
pub fn replay_ledger(initial_state: &Value, entries: &[LedgerEntry]) -> Result<(), AkError> {
    let mut state = initial_state.clone();

    for (index, entry) in entries.iter().enumerate() {
        let is_ok_outcome = matches!(entry.payload.get("outcome").and_then(Value::as_str), Some("ok"));
        if !is_ok_outcome {
            continue; // non-ok outcomes (denied/failure/fatal/cancelled) carry no state diff
        }
        let Some(diff) = entry.payload.get("diff") else {
            continue;
        };
        let Some(expected_hash) = entry.payload.get("state_hash").and_then(Value::as_str) else {
            continue;
        };

        let next_state = deep_merge(&state, diff);
        let actual_hash = ak_hash::hash_payload(&next_state)?;

        if actual_hash != expected_hash {
            return Err(AkError::new(ErrorCode::ReplayDiverged, "recomputed state hash diverged from the recorded ledger entry")
                .with_context("index", index)
                .with_context("expected", expected_hash.to_string())
                .with_context("actual", actual_hash));
        }

        state = next_state;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(prev_hash: &str, diff: Value, state_hash: &str) -> LedgerEntry {
        LedgerEntry {
            prev_hash: prev_hash.to_string(),
            hash: "irrelevant".to_string(),
            payload: json!({"diff": diff, "state_hash": state_hash, "outcome": "ok"}),
        }
    }

    #[test]
    fn replay_succeeds_when_hashes_match() {
        let initial = json!({});
        let after = deep_merge(&initial, &json!({"x": 1}));
        let hash = ak_hash::hash_payload(&after).unwrap();
        let entries = vec![entry("GENESIS", json!({"x": 1}), &hash)];
        assert!(replay_ledger(&initial, &entries).is_ok());
    }

    #[test]
    fn replay_fails_on_tampered_hash() {
        let initial = json!({});
        let entries = vec![entry("GENESIS", json!({"x": 1}), "deadbeef")];
        let err = replay_ledger(&initial, &entries).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ReplayDiverged);
    }

    #[test]
    fn entries_without_a_diff_are_skipped() {
        let initial = json!({"a": 1});
        let entries = vec![LedgerEntry { prev_hash: "GENESIS".to_string(), hash: "h".to_string(), payload: json!({"outcome": "denied"}) }];
        assert!(replay_ledger(&initial, &entries).is_ok());
    }

    #[test]
    fn multi_step_replay_chains_state_forward() {
        let initial = json!({});
        let s1 = deep_merge(&initial, &json!({"x": 1}));
        let h1 = ak_hash::hash_payload(&s1).unwrap();
        let s2 = deep_merge(&s1, &json!({"y": 2}));
        let h2 = ak_hash::hash_payload(&s2).unwrap();
        let entries = vec![entry("GENESIS", json!({"x": 1}), &h1), entry("e1", json!({"y": 2}), &h2)];
        assert!(replay_ledger(&initial, &entries).is_ok());
    }
}
