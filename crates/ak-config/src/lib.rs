// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ambient configuration (design §4.14): parses the on-disk policy
//! definition, validates it, and folds break-glass environment variables
//! into the runtime `Policy` record exactly once, at startup.

#![deny(unsafe_code)]

pub mod overlay;
pub mod policy_config;
pub mod validator;

pub use overlay::PolicyEnvOverlay;
pub use policy_config::{EgressConfig, PolicyConfig, PolicyModeConfig, ResourceCapsConfig, ToolRuleConfig};
pub use validator::{ConfigValidator, ConfigWarning, WarningSeverity};
