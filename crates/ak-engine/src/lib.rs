// SPDX-License-Identifier: MIT OR Apache-2.0
//! Serial Execution Engine, replay, and policy-tightening overlay (design
//! §4.11–§4.13): the single-writer heart of the kernel.

#![deny(unsafe_code)]

pub mod cancel;
pub mod engine;
pub mod governor;
pub mod merge;
pub mod overlay;
pub mod replay;

pub use cancel::{CancellableRun, CancellationReason, CancellationToken};
pub use engine::{DispatchReceipt, Executor, Outcome, SerialExecutionEngine};
pub use governor::ResourceGovernor;
pub use merge::deep_merge;
pub use overlay::apply_overlay;
pub use replay::replay_ledger;
