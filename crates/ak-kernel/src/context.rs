// SPDX-License-Identifier: MIT OR Apache-2.0
//! `KernelContext` (design §3, §9 "Re-architect as explicit `KernelContext`
//! values"): one owned bundle of everything that used to live as
//! process-wide global state. Exactly one per process; sessions borrow it.

use std::path::Path;

use ak_approval::ApprovalTokenManager;
use ak_error::AkError;
use ak_ledger::Ledger;
use ak_policy::Policy;
use ak_risk::{AdaptiveRiskTracker, ModelSuccessTracker};

/// Everything the kernel needs to evaluate and dispatch intents, owned in
/// one place instead of scattered across statics.
pub struct KernelContext {
    pub policy: Policy,
    pub approvals: ApprovalTokenManager,
    pub risk: AdaptiveRiskTracker,
    pub model_success: ModelSuccessTracker,
    pub ledger: Ledger,
}

impl KernelContext {
    /// Build a `KernelContext` from its already-resolved parts. Callers
    /// typically produce `policy` via `ak_config::PolicyEnvOverlay::apply`
    /// and `ledger` via `Ledger::open` on the session's ledger path.
    pub fn new(
        policy: Policy,
        approvals: ApprovalTokenManager,
        ledger: Ledger,
    ) -> Self {
        let risk = AdaptiveRiskTracker::new(policy.intrinsic_risk_tools.clone());
        Self { policy, approvals, risk, model_success: ModelSuccessTracker::new(), ledger }
    }

    /// Convenience constructor that opens (or resumes) the ledger file at
    /// `ledger_path` as part of construction.
    pub fn open(
        policy: Policy,
        approvals: ApprovalTokenManager,
        ledger_path: impl AsRef<Path>,
    ) -> Result<Self, AkError> {
        let ledger = Ledger::open(ledger_path.as_ref())?;
        Ok(Self::new(policy, approvals, ledger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    fn allow_all_policy() -> Policy {
        Policy {
            mode: ak_policy::PolicyMode::AllowAll,
            max_args_bytes: 0,
            allow_tools: HashSet::new(),
            deny_tools: HashSet::new(),
            granted_capabilities: HashSet::new(),
            tool_rules: HashMap::new(),
            exec_safe_bins: HashSet::new(),
            fetch_allowed_domains: HashSet::new(),
            fetch_allow_subdomains: false,
            enforce_fetch_domain_allowlist: false,
            block_exec_command_substitution: false,
            intrinsic_risk_tools: HashSet::from(["exec_shell".to_string()]),
            allow_absolute_path: false,
            allow_interpreter_argv: false,
        }
    }

    #[test]
    fn new_seeds_risk_tracker_from_policy_intrinsic_tools() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = KernelContext::open(
            allow_all_policy(),
            ApprovalTokenManager::new(128, Duration::from_secs(300)),
            dir.path().join("session.jsonl"),
        )
        .unwrap();
        // Five clean runs would normally de-escalate a High tool to Low,
        // but exec_shell was named in policy.intrinsic_risk_tools, so the
        // tracker constructed by KernelContext::new floors it at Medium.
        for _ in 0..5 {
            ctx.risk.record_outcome("exec_shell", ak_risk::RiskLevel::High, false);
        }
        assert_eq!(ctx.risk.resolve("exec_shell", ak_risk::RiskLevel::High), ak_risk::RiskLevel::Medium);
    }
}
