// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capability Gate (design §4.9): the single deny/allow checkpoint every
//! tool invocation passes through before dispatch.

#![deny(unsafe_code)]

pub mod gate;
pub mod types;

pub use gate::evaluate_intent;
pub use types::{Allowed, GateRuntime, Intent, Policy, PolicyMode, ToolClass, ToolRule};
