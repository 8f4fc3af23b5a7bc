// SPDX-License-Identifier: MIT OR Apache-2.0
//! The 12-step Capability Gate pipeline (design §4.9).

use ak_egress::{validate_target, EgressPolicy};
use ak_error::{AkError, ErrorCode};
use ak_risk::{AdaptiveRiskTracker, RiskLevel};
use serde_json::Value;

use crate::types::{Allowed, GateRuntime, Intent, Policy, PolicyMode, ToolClass, ToolRule};

const DEFAULT_MAX_ARGS_BYTES: usize = 128_000;

fn normalize_cap(cap: &str) -> String {
    cap.trim().to_lowercase()
}

fn capabilities_satisfied(required: &std::collections::HashSet<String>, granted: &std::collections::HashSet<String>) -> Option<String> {
    let granted_norm: std::collections::HashSet<String> = granted.iter().map(|c| normalize_cap(c)).collect();
    for cap in required {
        let norm = normalize_cap(cap);
        if norm.is_empty() {
            continue;
        }
        if !granted_norm.contains(&norm) {
            return Some(cap.clone());
        }
    }
    None
}

fn extract_exec_argv(args: &Value) -> (Option<String>, Vec<String>) {
    let command = args.get("command").and_then(|v| v.as_str()).map(String::from);
    let argv = args
        .get("argv")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    (command, argv)
}

fn extract_urls(args: &Value) -> Vec<String> {
    args.get("urls")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn contains_command_substitution(command: &str, argv: &[String]) -> bool {
    let all = std::iter::once(command.to_string()).chain(argv.iter().cloned()).collect::<Vec<_>>().join(" ");
    all.contains("$(") || all.contains('`')
}

fn requires_approval(risk: RiskLevel) -> bool {
    risk == RiskLevel::High
}

/// Run the full 12-step evaluation and return either an [`Allowed`] grant
/// or the first [`AkError`] encountered, in step order.
pub fn evaluate_intent(
    intent: &Intent,
    policy: &Policy,
    runtime: &GateRuntime,
    risk_tracker: &AdaptiveRiskTracker,
    egress_policy: Option<&EgressPolicy>,
) -> Result<Allowed, AkError> {
    let mut reasons = Vec::new();

    // 1. Normalize & validate intent.
    if !intent.is_well_formed() {
        return Err(AkError::new(ErrorCode::PolicyInvalidIntent, "intent failed well-formedness check")
            .with_context("tool_name", intent.tool_name.clone()));
    }

    // 2. Size cap.
    let canon = ak_hash::stable_json(&intent.args)?;
    let effective_cap = if policy.max_args_bytes == 0 { DEFAULT_MAX_ARGS_BYTES } else { policy.max_args_bytes };
    if canon.len() > effective_cap {
        return Err(AkError::new(ErrorCode::PolicyArgsTooLarge, "intent args exceed the size cap")
            .with_context("bytes", canon.len())
            .with_context("cap", effective_cap));
    }

    // 3. Deny-list always wins.
    if policy.deny_tools.contains(&intent.tool_name) {
        return Err(AkError::new(ErrorCode::PolicyDenyList, "tool is explicitly denied")
            .with_context("tool_name", intent.tool_name.clone()));
    }

    // 4. Mode check.
    if policy.mode == PolicyMode::Allowlist && !policy.allow_tools.contains(&intent.tool_name) {
        return Err(AkError::new(ErrorCode::PolicyToolDenied, "tool is not on the allowlist")
            .with_context("tool_name", intent.tool_name.clone()));
    }

    // 5. Tool rule lookup.
    let rule = match policy.tool_rules.get(&intent.tool_name) {
        Some(rule) => rule.clone(),
        None => {
            if policy.mode == PolicyMode::Allowlist {
                return Err(AkError::new(ErrorCode::PolicyUnknownTool, "no tool rule and no allowlist entry")
                    .with_context("tool_name", intent.tool_name.clone()));
            }
            ToolRule::default()
        }
    };
    let base_risk = rule.risk.unwrap_or(RiskLevel::Medium);

    // 6. Capability check.
    let granted = policy.effective_granted_capabilities();
    let mut required = rule.capabilities_required.clone();
    required.extend(intent.capabilities_required.iter().cloned());
    if let Some(missing) = capabilities_satisfied(&required, &granted) {
        return Err(AkError::new(ErrorCode::PolicyMissingCapability, "required capability not granted")
            .with_context("capability", missing));
    }

    // 7. Capability combination validation.
    let granted_norm: std::collections::HashSet<String> = granted.iter().map(|c| normalize_cap(c)).collect();
    if required.iter().any(|c| normalize_cap(c) == "exec:host") {
        return Err(AkError::new(ErrorCode::PolicyInvalidCombo, "exec:host is never a grantable capability")
            .with_context("tool_name", intent.tool_name.clone()));
    }
    if required.iter().any(|c| normalize_cap(c) == "browser:unsafe_eval")
        && !granted_norm.contains("net:browser")
    {
        return Err(AkError::new(ErrorCode::PolicyInvalidCombo, "browser:unsafe_eval requires net:browser")
            .with_context("tool_name", intent.tool_name.clone()));
    }

    // 8. Sandbox requirement.
    if rule.require_sandbox && !runtime.sandboxed {
        return Err(AkError::new(ErrorCode::PolicySandboxRequired, "tool requires a sandboxed runtime")
            .with_context("tool_name", intent.tool_name.clone()));
    }

    // 9. Adaptive risk.
    let effective_risk = risk_tracker.resolve(&intent.tool_name, base_risk);
    if requires_approval(effective_risk) && !runtime.approval_granted {
        return Err(AkError::new(ErrorCode::ApprovalRequired, "effective risk requires a consumed approval token")
            .with_context("tool_name", intent.tool_name.clone())
            .with_context("risk", format!("{effective_risk:?}")));
    }
    if effective_risk > base_risk {
        reasons.push(format!("adaptive risk escalated {base_risk:?} -> {effective_risk:?}"));
    }

    // 10. Exec-specific constraints.
    if intent.tool_class == ToolClass::Exec {
        let (command, argv) = extract_exec_argv(&intent.args);
        let command = command.ok_or_else(|| {
            AkError::new(ErrorCode::PolicyInvalidIntent, "exec-class intent missing a command")
        })?;
        let normalized = ak_sandbox::normalize_command(&command, policy.allow_absolute_path)?;
        if !policy.exec_safe_bins.contains(&normalized) {
            return Err(AkError::new(ErrorCode::PolicyToolDenied, "executable is not in exec_safe_bins")
                .with_context("command", normalized));
        }
        ak_sandbox::check_exec_constraints(&normalized, &argv, policy.allow_interpreter_argv)?;
        if policy.block_exec_command_substitution && contains_command_substitution(&command, &argv) {
            return Err(AkError::new(ErrorCode::PolicyInvalidCombo, "command substitution is blocked by policy")
                .with_context("command", command));
        }
    }

    // 11. Net-specific constraints.
    if intent.tool_class == ToolClass::Net {
        let urls = extract_urls(&intent.args);
        if let Some(egress_policy) = egress_policy {
            for url in &urls {
                let parsed = validate_target(egress_policy, url)?;
                if policy.enforce_fetch_domain_allowlist {
                    let host = parsed.host_str().unwrap_or_default();
                    let granted = policy.fetch_allowed_domains.iter().any(|domain| {
                        host.eq_ignore_ascii_case(domain)
                            || (policy.fetch_allow_subdomains && host.to_lowercase().ends_with(&format!(".{}", domain.to_lowercase())))
                    });
                    if !granted {
                        return Err(AkError::new(ErrorCode::PolicyMissingCapability, "missing net:outbound grant for host")
                            .with_context("capability", format!("net:outbound:{host}")));
                    }
                }
            }
        }
    }

    // 12. Allow.
    Ok(Allowed { normalized_args: intent.args.clone(), granted_caps: required, risk: effective_risk, reasons })
}
