// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable error taxonomy shared by every kernel component.
//!
//! Every fallible kernel operation returns `Result<T, AkError>`. `AkError`
//! pairs a stable [`ErrorCode`] (the only thing callers should match on) with
//! a human message and a redact-before-log context map, mirroring the
//! builder pattern used throughout the host repository's error crates.

#![deny(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The three failure classes a kernel operation can surface (design §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Policy, approval, or containment refusal. Never retried.
    Denied,
    /// Subprocess/network/IO failure. Caller may retry.
    Failure,
    /// Invariant violation. Fatal; pipeline must abort.
    Fatal,
}

/// Stable, serializable error code. The `Display` impl yields the exact
/// `namespace:code` string in the observable error-code surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    PolicyToolDenied,
    PolicyDenyList,
    PolicyMissingCapability,
    PolicySandboxRequired,
    PolicyArgsTooLarge,
    PolicyInvalidCombo,
    PolicyUnknownTool,
    PolicyInvalidIntent,
    ExecBlocked,
    ExecTimeout,
    ExecOutputExceeded,
    EgressDisabled,
    EgressInvalidUrl,
    EgressRawIp,
    EgressPrivateIp,
    EgressNotAllowlisted,
    EgressNoAllowlist,
    LedgerCorrupt,
    ApprovalRequired,
    ApprovalMismatch,
    ApprovalExhausted,
    ResourceExhaustion,
    PayloadSerializationCycle,
    PayloadTooDeep,
    PayloadTooWide,
    ParallelExecutionBlocked,
    ReplayDiverged,
    PolicyRelaxed,
    HashMismatch,
    PolicyDrift,
    CapabilityRegistryGap,
    UnsafeStartup,
    RawSecretLeak,
    FilesystemEscape,
    PolicyConfigInvalid,
}

impl ErrorCode {
    /// The stable `namespace:code` string from the observable surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::PolicyToolDenied => "policy:tool_denied",
            ErrorCode::PolicyDenyList => "policy:deny_list",
            ErrorCode::PolicyMissingCapability => "policy:missing_capability",
            ErrorCode::PolicySandboxRequired => "policy:sandbox_required",
            ErrorCode::PolicyArgsTooLarge => "policy:args_too_large",
            ErrorCode::PolicyInvalidCombo => "policy:invalid_combo",
            ErrorCode::PolicyUnknownTool => "policy:unknown_tool",
            ErrorCode::PolicyInvalidIntent => "policy:invalid_intent",
            ErrorCode::ExecBlocked => "exec:blocked",
            ErrorCode::ExecTimeout => "exec:timeout",
            ErrorCode::ExecOutputExceeded => "exec:output_exceeded",
            ErrorCode::EgressDisabled => "egress:disabled",
            ErrorCode::EgressInvalidUrl => "egress:invalid_url",
            ErrorCode::EgressRawIp => "egress:raw_ip",
            ErrorCode::EgressPrivateIp => "egress:private_ip",
            ErrorCode::EgressNotAllowlisted => "egress:not_allowlisted",
            ErrorCode::EgressNoAllowlist => "egress:no_allowlist",
            ErrorCode::LedgerCorrupt => "ledger:corrupt",
            ErrorCode::ApprovalRequired => "approval:required",
            ErrorCode::ApprovalMismatch => "approval:mismatch",
            ErrorCode::ApprovalExhausted => "approval:exhausted",
            ErrorCode::ResourceExhaustion => "resource:exhaustion",
            ErrorCode::PayloadSerializationCycle => "payload:serialization_cycle",
            ErrorCode::PayloadTooDeep => "payload:too_deep",
            ErrorCode::PayloadTooWide => "payload:too_wide",
            ErrorCode::ParallelExecutionBlocked => "engine:parallel_execution_blocked",
            ErrorCode::ReplayDiverged => "engine:replay_diverged",
            ErrorCode::PolicyRelaxed => "policy:relaxed",
            ErrorCode::HashMismatch => "internal:hash_mismatch",
            ErrorCode::PolicyDrift => "internal:policy_drift",
            ErrorCode::CapabilityRegistryGap => "internal:capability_registry_gap",
            ErrorCode::UnsafeStartup => "internal:unsafe_startup",
            ErrorCode::RawSecretLeak => "internal:raw_secret_leak",
            ErrorCode::FilesystemEscape => "internal:filesystem_escape",
            ErrorCode::PolicyConfigInvalid => "internal:policy_config_invalid",
        }
    }

    /// The failure class this code belongs to (design §7).
    pub fn class(&self) -> ErrorClass {
        use ErrorCode::*;
        match self {
            PolicyToolDenied
            | PolicyDenyList
            | PolicyMissingCapability
            | PolicySandboxRequired
            | PolicyArgsTooLarge
            | PolicyInvalidCombo
            | PolicyUnknownTool
            | PolicyInvalidIntent
            | ExecBlocked
            | EgressDisabled
            | EgressInvalidUrl
            | EgressRawIp
            | EgressPrivateIp
            | EgressNotAllowlisted
            | EgressNoAllowlist
            | ApprovalRequired
            | ApprovalMismatch
            | ApprovalExhausted
            | ParallelExecutionBlocked
            | PolicyRelaxed => ErrorClass::Denied,
            ExecTimeout | ExecOutputExceeded => ErrorClass::Failure,
            LedgerCorrupt
            | PayloadSerializationCycle
            | PayloadTooDeep
            | PayloadTooWide
            | ReplayDiverged
            | HashMismatch
            | PolicyDrift
            | CapabilityRegistryGap
            | UnsafeStartup
            | RawSecretLeak
            | FilesystemEscape
            | PolicyConfigInvalid
            | ResourceExhaustion => ErrorClass::Fatal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured kernel error: stable code, message, and redacted context.
#[derive(Debug)]
pub struct AkError {
    code: ErrorCode,
    message: String,
    context: BTreeMap<String, serde_json::Value>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AkError {
    /// Construct a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
            source: None,
        }
    }

    /// Attach a context value. Silently dropped if it fails to serialize.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn class(&self) -> ErrorClass {
        self.code.class()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.context
    }
}

impl fmt::Display for AkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            let ctx = serde_json::to_string(&self.context).unwrap_or_default();
            write!(f, "[{}] {} {ctx}", self.code, self.message)
        }
    }
}

impl std::error::Error for AkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// A JSON-serializable snapshot of an [`AkError`] (the underlying source is
/// not preserved, by design — sources are for in-process diagnosis only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AkErrorDto {
    pub code: ErrorCode,
    pub class: ErrorClass,
    pub message: String,
    pub context: BTreeMap<String, serde_json::Value>,
}

impl From<&AkError> for AkErrorDto {
    fn from(e: &AkError) -> Self {
        Self {
            code: e.code,
            class: e.code.class(),
            message: e.message.clone(),
            context: e.context.clone(),
        }
    }
}
