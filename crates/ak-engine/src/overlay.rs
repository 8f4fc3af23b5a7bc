// SPDX-License-Identifier: MIT OR Apache-2.0
//! Policy-Tightening Overlay (design §4.12): the only supported runtime
//! policy mutation, and only in the tightening direction.

use ak_error::{AkError, ErrorCode};
use serde_json::Value;

const NETWORK_ALLOWLIST_PATH: &[&str] = &["security", "network", "allowlist"];
const FS_ALLOW_PATH: &[&str] = &["agents", "sandbox", "fs", "allow"];
const TIMEOUT_PATH: &[&str] = &["agents", "sandbox", "executionBudget", "timeoutMs"];

fn get_path<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = doc;
    for segment in path {
        cur = cur.get(segment)?;
    }
    Some(cur)
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value?.as_array().map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
}

fn is_subset(proposed: &[String], current: &[String]) -> bool {
    proposed.iter().all(|item| current.contains(item))
}

/// Validate that `proposed` is strictly no looser than `current`, applying
/// it field-by-field on success. Every other field of `current` is
/// replaced by `proposed`'s value untouched. On any violation, returns the
/// `PolicyRelaxed` error and performs no mutation at all.
///
/// `allow_mutation` is the `PolicyEnvOverlay::allow_policy_mutation`
/// break-glass flag: when set, tightening is not enforced and `proposed` is
/// accepted as-is. Callers that honor it are expected to ledger the
/// application themselves, since this function has no ledger handle.
pub fn apply_overlay(current: &Value, proposed: &Value, allow_mutation: bool) -> Result<Value, AkError> {
    if allow_mutation {
        return Ok(proposed.clone());
    }
    check_list_tightened(current, proposed, NETWORK_ALLOWLIST_PATH, "security.network.allowlist")?;
    check_list_tightened(current, proposed, FS_ALLOW_PATH, "agents.sandbox.fs.allow")?;
    check_timeout_monotone(current, proposed)?;
    Ok(proposed.clone())
}

fn check_list_tightened(current: &Value, proposed: &Value, path: &[&str], label: &str) -> Result<(), AkError> {
    let current_list = string_list(get_path(current, path));
    let proposed_list = string_list(get_path(proposed, path));

    match (current_list, proposed_list) {
        (Some(_), None) => Err(AkError::new(ErrorCode::PolicyRelaxed, "removing a governed allowlist is a relaxation")
            .with_context("field", label)),
        (Some(cur), Some(prop)) if !is_subset(&prop, &cur) => {
            Err(AkError::new(ErrorCode::PolicyRelaxed, "proposed allowlist is not a subset of the current one")
                .with_context("field", label))
        }
        _ => Ok(()),
    }
}

fn check_timeout_monotone(current: &Value, proposed: &Value) -> Result<(), AkError> {
    let cur = get_path(current, TIMEOUT_PATH).and_then(Value::as_i64);
    let prop = get_path(proposed, TIMEOUT_PATH).and_then(Value::as_i64);
    if let (Some(cur), Some(prop)) = (cur, prop) {
        if prop > cur {
            return Err(AkError::new(ErrorCode::PolicyRelaxed, "execution budget timeout may only decrease")
                .with_context("field", "agents.sandbox.executionBudget.timeoutMs")
                .with_context("current", cur)
                .with_context("proposed", prop));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subset_network_allowlist_is_accepted() {
        let current = json!({"security": {"network": {"allowlist": ["google.com", "github.com"]}}});
        let proposed = json!({"security": {"network": {"allowlist": ["google.com"]}}});
        assert!(apply_overlay(&current, &proposed, false).is_ok());
    }

    #[test]
    fn superset_network_allowlist_is_rejected() {
        let current = json!({"security": {"network": {"allowlist": ["google.com", "github.com"]}}});
        let proposed = json!({"security": {"network": {"allowlist": ["google.com", "yahoo.com"]}}});
        let err = apply_overlay(&current, &proposed, false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyRelaxed);
    }

    #[test]
    fn removing_allowlist_entirely_is_rejected() {
        let current = json!({"security": {"network": {"allowlist": ["google.com"]}}});
        let proposed = json!({"security": {"network": {}}});
        let err = apply_overlay(&current, &proposed, false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyRelaxed);
    }

    #[test]
    fn fs_allow_subset_rule_mirrors_network() {
        let current = json!({"agents": {"sandbox": {"fs": {"allow": ["/a", "/b"]}}}});
        let proposed = json!({"agents": {"sandbox": {"fs": {"allow": ["/a", "/c"]}}}});
        let err = apply_overlay(&current, &proposed, false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyRelaxed);
    }

    #[test]
    fn timeout_may_only_decrease() {
        let current = json!({"agents": {"sandbox": {"executionBudget": {"timeoutMs": 10_000}}}});
        let lower = json!({"agents": {"sandbox": {"executionBudget": {"timeoutMs": 5_000}}}});
        let higher = json!({"agents": {"sandbox": {"executionBudget": {"timeoutMs": 20_000}}}});
        assert!(apply_overlay(&current, &lower, false).is_ok());
        assert_eq!(apply_overlay(&current, &higher, false).unwrap_err().code(), ErrorCode::PolicyRelaxed);
    }

    #[test]
    fn unrelated_fields_pass_through() {
        let current = json!({"unrelated": {"x": 1}});
        let proposed = json!({"unrelated": {"x": 2}});
        let applied = apply_overlay(&current, &proposed, false).unwrap();
        assert_eq!(applied, json!({"unrelated": {"x": 2}}));
    }

    #[test]
    fn break_glass_bypass_accepts_a_relaxation() {
        let current = json!({"security": {"network": {"allowlist": ["google.com"]}}});
        let proposed = json!({"security": {"network": {"allowlist": ["google.com", "evil.com"]}}});
        let applied = apply_overlay(&current, &proposed, true).unwrap();
        assert_eq!(applied, proposed);
    }
}
