// SPDX-License-Identifier: MIT OR Apache-2.0
//! Semantic validation of a parsed [`PolicyConfig`], modeled on the host
//! repository's `WorkOrder` validator: collect every warning rather than
//! failing on the first one, and classify by severity.

use std::collections::HashSet;

use crate::policy_config::PolicyConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
}

#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a [`PolicyConfig`] and return every warning found. An empty
    /// vec does not mean "safe defaults" — only that nothing here looked
    /// malformed.
    pub fn validate(&self, cfg: &PolicyConfig) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        self.check_duplicates(&cfg.allow_tools, "allow_tools", &mut warnings);
        self.check_duplicates(&cfg.deny_tools, "deny_tools", &mut warnings);

        for tool in cfg.allow_tools.intersection(&cfg.deny_tools) {
            warnings.push(ConfigWarning {
                field: "allow_tools/deny_tools".into(),
                message: format!("tool '{tool}' is both allowed and denied; deny wins"),
                severity: WarningSeverity::Warning,
            });
        }

        if cfg.max_args_bytes > 0 && cfg.max_args_bytes < 64 {
            warnings.push(ConfigWarning {
                field: "max_args_bytes".into(),
                message: "max_args_bytes is implausibly small".into(),
                severity: WarningSeverity::Warning,
            });
        }

        self.check_no_empty(&cfg.exec_safe_bins, "exec_safe_bins", &mut warnings);
        self.check_no_empty(&cfg.fetch_allowed_domains, "fetch_allowed_domains", &mut warnings);
        self.check_no_empty(&cfg.intrinsic_risk_tools, "intrinsic_risk_tools", &mut warnings);

        if cfg.enforce_fetch_domain_allowlist && cfg.fetch_allowed_domains.is_empty() {
            warnings.push(ConfigWarning {
                field: "fetch_allowed_domains".into(),
                message: "domain allowlist enforcement is on but the allowlist is empty; every fetch will be denied".into(),
                severity: WarningSeverity::Warning,
            });
        }

        if cfg.egress.enabled && cfg.egress.allow_domains.is_empty() {
            warnings.push(ConfigWarning {
                field: "egress.allow_domains".into(),
                message: "egress is enabled with an empty domain allowlist; every fetch will be denied".into(),
                severity: WarningSeverity::Warning,
            });
        }

        if cfg.egress.max_bytes == 0 {
            warnings.push(ConfigWarning {
                field: "egress.max_bytes".into(),
                message: "egress.max_bytes must be greater than 0".into(),
                severity: WarningSeverity::Error,
            });
        }
        if cfg.egress.max_seconds == 0 {
            warnings.push(ConfigWarning {
                field: "egress.max_seconds".into(),
                message: "egress.max_seconds must be greater than 0".into(),
                severity: WarningSeverity::Error,
            });
        }

        if cfg.resource_caps.max_concurrent_dangerous_ops == 0 {
            warnings.push(ConfigWarning {
                field: "resource_caps.max_concurrent_dangerous_ops".into(),
                message: "max_concurrent_dangerous_ops must be greater than 0".into(),
                severity: WarningSeverity::Error,
            });
        }
        if cfg.resource_caps.max_archive_entries == 0 {
            warnings.push(ConfigWarning {
                field: "resource_caps.max_archive_entries".into(),
                message: "max_archive_entries must be greater than 0".into(),
                severity: WarningSeverity::Error,
            });
        }
        if cfg.resource_caps.max_archive_bytes == 0 {
            warnings.push(ConfigWarning {
                field: "resource_caps.max_archive_bytes".into(),
                message: "max_archive_bytes must be greater than 0".into(),
                severity: WarningSeverity::Error,
            });
        }

        for (name, rule) in &cfg.tool_rules {
            if name.trim().is_empty() {
                warnings.push(ConfigWarning {
                    field: "tool_rules".into(),
                    message: "tool_rules contains an empty tool name key".into(),
                    severity: WarningSeverity::Error,
                });
            }
            for cap in &rule.capabilities_required {
                if cap.trim().is_empty() {
                    warnings.push(ConfigWarning {
                        field: format!("tool_rules.{name}.capabilities_required"),
                        message: "empty capability string".into(),
                        severity: WarningSeverity::Error,
                    });
                }
            }
        }

        warnings
    }

    /// Whether any warning in `warnings` is severe enough that the config
    /// should not be loaded as-is.
    pub fn has_errors(&self, warnings: &[ConfigWarning]) -> bool {
        warnings.iter().any(|w| w.severity == WarningSeverity::Error)
    }

    fn check_duplicates(&self, set: &HashSet<String>, field: &str, warnings: &mut Vec<ConfigWarning>) {
        // HashSet already de-duplicates on parse; this flags the only
        // duplicate-shaped issue left observable post-parse: case collisions.
        let mut seen_lower = HashSet::new();
        for item in set {
            if !seen_lower.insert(item.to_ascii_lowercase()) {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: format!("'{item}' collides with another entry differing only in case"),
                    severity: WarningSeverity::Warning,
                });
            }
        }
    }

    fn check_no_empty(&self, set: &HashSet<String>, field: &str, warnings: &mut Vec<ConfigWarning>) {
        for item in set {
            if item.trim().is_empty() {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: "empty entry".into(),
                    severity: WarningSeverity::Error,
                });
            }
        }
    }
}
