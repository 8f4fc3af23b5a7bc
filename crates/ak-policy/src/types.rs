// SPDX-License-Identifier: MIT OR Apache-2.0
//! Data model (design §3): Intent, Policy, ToolRule, and the tagged
//! ToolClass a tool name resolves to before dispatch.

use std::collections::{HashMap, HashSet};

use ak_risk::RiskLevel;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The dispatch class a tool belongs to, used to select which §4.6/§4.7
/// constraints apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolClass {
    Exec,
    Net,
    Fs,
    Messaging,
    Session,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    AllowAll,
    Allowlist,
}

/// A pending tool invocation, prior to gate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub actor: String,
    pub tool_name: String,
    pub tool_class: ToolClass,
    pub args: Value,
    pub capabilities_required: HashSet<String>,
    pub session_key: String,
    pub timestamp_ms: i64,
    pub provenance: Value,
}

impl Intent {
    /// §3 invariant: actor, tool_name, timestamp_ms non-empty/finite.
    pub fn is_well_formed(&self) -> bool {
        !self.actor.trim().is_empty() && !self.tool_name.trim().is_empty() && self.timestamp_ms > 0
    }
}

/// Per-tool dispatch rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolRule {
    pub risk: Option<RiskLevel>,
    pub capabilities_required: HashSet<String>,
    pub require_sandbox: bool,
    pub max_args_bytes: Option<usize>,
}

/// The policy record the gate is evaluated against.
#[derive(Debug, Clone)]
pub struct Policy {
    pub mode: PolicyMode,
    pub max_args_bytes: usize,
    pub allow_tools: HashSet<String>,
    pub deny_tools: HashSet<String>,
    pub granted_capabilities: HashSet<String>,
    pub tool_rules: HashMap<String, ToolRule>,
    pub exec_safe_bins: HashSet<String>,
    pub fetch_allowed_domains: HashSet<String>,
    pub fetch_allow_subdomains: bool,
    pub enforce_fetch_domain_allowlist: bool,
    pub block_exec_command_substitution: bool,
    /// Never a substring heuristic: tools whose adaptive risk may not drop
    /// below `Medium` are named here explicitly.
    pub intrinsic_risk_tools: HashSet<String>,
    /// Break-glass: allow path-separator-qualified commands past the gate.
    /// Off by default; only `PolicyEnvOverlay` should ever turn this on.
    pub allow_absolute_path: bool,
    /// Break-glass: allow argv\[0\] to be a known interpreter (`python`,
    /// `bash`, ...). Off by default for the same reason.
    pub allow_interpreter_argv: bool,
}

impl Policy {
    /// Capabilities granted implicitly by the exec/fetch allowlists, on top
    /// of whatever is declared in `granted_capabilities`.
    pub fn effective_granted_capabilities(&self) -> HashSet<String> {
        let mut caps = self.granted_capabilities.clone();
        for bin in &self.exec_safe_bins {
            caps.insert(format!("proc:spawn:{bin}"));
        }
        for domain in &self.fetch_allowed_domains {
            caps.insert(format!("net:outbound:{domain}"));
        }
        caps
    }
}

/// Facts about the current execution context the gate cannot derive from
/// the intent or policy alone.
#[derive(Debug, Clone, Default)]
pub struct GateRuntime {
    pub sandboxed: bool,
    /// Whether a valid approval token was already consumed for this intent.
    pub approval_granted: bool,
}

/// The result of a successful gate evaluation.
#[derive(Debug, Clone)]
pub struct Allowed {
    pub normalized_args: Value,
    pub granted_caps: HashSet<String>,
    pub risk: RiskLevel,
    pub reasons: Vec<String>,
}
