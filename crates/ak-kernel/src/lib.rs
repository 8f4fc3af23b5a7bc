// SPDX-License-Identifier: MIT OR Apache-2.0
//! Actor identity and the explicit `KernelContext` (design §3 additions,
//! §9 "Re-architect as explicit `KernelContext` values").

#![deny(unsafe_code)]

pub mod actor;
pub mod context;

pub use actor::Actor;
pub use context::KernelContext;
