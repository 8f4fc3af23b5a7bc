// SPDX-License-Identifier: MIT OR Apache-2.0
//! `PolicyEnvOverlay` (design §4.14, §9 "Global environment as policy
//! channel"): every break-glass knob the host previously read ad hoc from
//! the environment, collected into one typed struct and applied exactly
//! once, at `KernelContext` construction.

use std::collections::HashMap;
use std::env;

use ak_egress::EgressPolicy;
use ak_policy::types::{Policy, PolicyMode, ToolRule};

use crate::policy_config::{EgressConfig, PolicyConfig, PolicyModeConfig};

const ENV_ALLOW_ABSOLUTE_PATH: &str = "AK_ALLOW_ABSOLUTE_PATH";
const ENV_ALLOW_INTERPRETER_ARGV: &str = "AK_ALLOW_INTERPRETER_ARGV";
const ENV_ALLOW_POLICY_MUTATION: &str = "AK_ALLOW_POLICY_MUTATION";
const ENV_ALLOW_PRIVATE_HOSTS: &str = "AK_ALLOW_PRIVATE_HOSTS";

fn env_flag(name: &str) -> bool {
    matches!(env::var(name), Ok(v) if v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Every break-glass/env-sourced knob, read once and carried as data rather
/// than re-read ad hoc by whichever component happens to need it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEnvOverlay {
    /// Allow path-separator-qualified exec commands past the gate.
    pub allow_absolute_path: bool,
    /// Allow argv\[0\] to be a known interpreter.
    pub allow_interpreter_argv: bool,
    /// Allow the Policy-Tightening Overlay to accept a relaxation instead
    /// of rejecting it. Intended for incident response only; every such
    /// application should still be ledgered by the caller.
    pub allow_policy_mutation: bool,
    /// Permit egress validation to resolve to RFC1918/loopback targets.
    /// Intended for local development only.
    pub allow_private_hosts: bool,
}

impl PolicyEnvOverlay {
    /// Read every break-glass variable from the process environment.
    pub fn from_env() -> Self {
        Self {
            allow_absolute_path: env_flag(ENV_ALLOW_ABSOLUTE_PATH),
            allow_interpreter_argv: env_flag(ENV_ALLOW_INTERPRETER_ARGV),
            allow_policy_mutation: env_flag(ENV_ALLOW_POLICY_MUTATION),
            allow_private_hosts: env_flag(ENV_ALLOW_PRIVATE_HOSTS),
        }
    }

    /// Fold a parsed, on-disk [`PolicyConfig`] and this overlay's break-glass
    /// flags into the runtime [`Policy`] record the gate evaluates against.
    pub fn apply(&self, cfg: PolicyConfig) -> Policy {
        let mode = match cfg.mode {
            PolicyModeConfig::AllowAll => PolicyMode::AllowAll,
            PolicyModeConfig::Allowlist => PolicyMode::Allowlist,
        };

        let tool_rules = cfg
            .tool_rules
            .into_iter()
            .map(|(name, rule)| {
                (
                    name,
                    ToolRule {
                        risk: rule.risk,
                        capabilities_required: rule.capabilities_required,
                        require_sandbox: rule.require_sandbox,
                        max_args_bytes: rule.max_args_bytes,
                    },
                )
            })
            .collect::<HashMap<_, _>>();

        Policy {
            mode,
            max_args_bytes: cfg.max_args_bytes,
            allow_tools: cfg.allow_tools,
            deny_tools: cfg.deny_tools,
            granted_capabilities: cfg.granted_capabilities,
            tool_rules,
            exec_safe_bins: cfg.exec_safe_bins,
            fetch_allowed_domains: cfg.fetch_allowed_domains,
            fetch_allow_subdomains: cfg.fetch_allow_subdomains,
            enforce_fetch_domain_allowlist: cfg.enforce_fetch_domain_allowlist,
            block_exec_command_substitution: cfg.block_exec_command_substitution,
            intrinsic_risk_tools: cfg.intrinsic_risk_tools,
            allow_absolute_path: self.allow_absolute_path,
            allow_interpreter_argv: self.allow_interpreter_argv,
        }
    }

    /// Resolve an on-disk [`EgressConfig`] into the runtime [`EgressPolicy`],
    /// honoring the `allow_private_hosts` break-glass flag.
    pub fn apply_egress(&self, cfg: &EgressConfig) -> EgressPolicy {
        let policy = EgressPolicy::new(
            cfg.enabled,
            cfg.allow_domains.iter().cloned().collect(),
            cfg.max_bytes,
            cfg.max_seconds,
        );
        policy.allow_private_hosts(self.allow_private_hosts)
    }
}
