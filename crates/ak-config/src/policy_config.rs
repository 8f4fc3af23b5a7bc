// SPDX-License-Identifier: MIT OR Apache-2.0
//! On-disk shape of the policy record (design §4.14), deserialized via
//! `toml`/`serde` from a file the operator edits by hand.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use ak_error::{AkError, ErrorCode};
use ak_risk::RiskLevel;
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PolicyModeConfig {
    AllowAll,
    Allowlist,
}

impl Default for PolicyModeConfig {
    fn default() -> Self {
        Self::Allowlist
    }
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ToolRuleConfig {
    pub risk: Option<RiskLevel>,
    #[serde(default)]
    pub capabilities_required: HashSet<String>,
    #[serde(default)]
    pub require_sandbox: bool,
    pub max_args_bytes: Option<usize>,
}

/// Egress sub-section: resolved into an `ak_egress::EgressPolicy` at startup.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EgressConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allow_domains: HashSet<String>,
    #[serde(default = "default_egress_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_egress_max_seconds")]
    pub max_seconds: u64,
}

fn default_egress_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_egress_max_seconds() -> u64 {
    30
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { enabled: false, allow_domains: HashSet::new(), max_bytes: default_egress_max_bytes(), max_seconds: default_egress_max_seconds() }
    }
}

/// Resource governor caps (design §5 resource caps table).
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResourceCapsConfig {
    #[serde(default = "default_max_concurrent_dangerous_ops")]
    pub max_concurrent_dangerous_ops: usize,
    #[serde(default = "default_max_archive_entries")]
    pub max_archive_entries: usize,
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
}

fn default_max_concurrent_dangerous_ops() -> usize {
    5
}

fn default_max_archive_entries() -> usize {
    10_000
}

fn default_max_archive_bytes() -> u64 {
    512 * 1024 * 1024
}

impl Default for ResourceCapsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_dangerous_ops: default_max_concurrent_dangerous_ops(),
            max_archive_entries: default_max_archive_entries(),
            max_archive_bytes: default_max_archive_bytes(),
        }
    }
}

/// The full on-disk policy definition an operator ships alongside the binary.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PolicyConfig {
    #[serde(default)]
    pub mode: PolicyModeConfig,
    #[serde(default)]
    pub max_args_bytes: usize,
    #[serde(default)]
    pub allow_tools: HashSet<String>,
    #[serde(default)]
    pub deny_tools: HashSet<String>,
    #[serde(default)]
    pub granted_capabilities: HashSet<String>,
    #[serde(default)]
    pub tool_rules: HashMap<String, ToolRuleConfig>,
    #[serde(default)]
    pub exec_safe_bins: HashSet<String>,
    #[serde(default)]
    pub fetch_allowed_domains: HashSet<String>,
    #[serde(default)]
    pub fetch_allow_subdomains: bool,
    #[serde(default)]
    pub enforce_fetch_domain_allowlist: bool,
    #[serde(default = "default_true")]
    pub block_exec_command_substitution: bool,
    #[serde(default)]
    pub intrinsic_risk_tools: HashSet<String>,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub resource_caps: ResourceCapsConfig,
}

fn default_true() -> bool {
    true
}

impl PolicyConfig {
    /// Parse a policy file from disk. Wraps the `toml` parse error as a
    /// `PolicyConfigInvalid` `AkError` rather than leaking `toml::de::Error`.
    pub fn load(path: &Path) -> Result<Self, AkError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            AkError::new(ErrorCode::PolicyConfigInvalid, "failed to read policy config file")
                .with_context("path", path.display().to_string())
                .with_source(err)
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, AkError> {
        toml::from_str(text).map_err(|err| {
            AkError::new(ErrorCode::PolicyConfigInvalid, "failed to parse policy config").with_source(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let cfg = PolicyConfig::parse("mode = \"allow_all\"\n").unwrap();
        assert_eq!(cfg.mode, PolicyModeConfig::AllowAll);
        assert_eq!(cfg.max_args_bytes, 0);
        assert!(cfg.block_exec_command_substitution);
    }

    #[test]
    fn parses_nested_tool_rules() {
        let text = r#"
            mode = "allowlist"
            allow_tools = ["read_file"]

            [tool_rules.read_file]
            risk = "low"
            require_sandbox = true
        "#;
        let cfg = PolicyConfig::parse(text).unwrap();
        let rule = cfg.tool_rules.get("read_file").unwrap();
        assert_eq!(rule.risk, Some(RiskLevel::Low));
        assert!(rule.require_sandbox);
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = PolicyConfig::parse("mode = [this is not valid").unwrap_err();
        assert_eq!(err.code(), ErrorCode::PolicyConfigInvalid);
    }

    #[test]
    fn egress_defaults_are_conservative() {
        let cfg = PolicyConfig::parse("mode = \"allow_all\"\n").unwrap();
        assert!(!cfg.egress.enabled);
        assert!(cfg.egress.allow_domains.is_empty());
    }

    #[test]
    fn json_schema_is_generated_with_expected_properties() {
        let schema = schemars::schema_for!(PolicyConfig);
        let value = serde_json::to_value(&schema).unwrap();
        let props = value.get("properties").expect("schema should have properties");
        assert!(props.get("mode").is_some());
        assert!(props.get("tool_rules").is_some());
        assert!(props.get("resource_caps").is_some());
    }
}
