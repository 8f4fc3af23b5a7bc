// SPDX-License-Identifier: MIT OR Apache-2.0
//! Resource Governor (design §5): the dangerous-op slot counter. A strict
//! semaphore over the number of concurrently in-flight dangerous-class
//! dispatches, modeled on the teacher's atomic-counter budget tracker.

use std::sync::Arc;

use ak_error::{AkError, ErrorCode};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps concurrent dangerous-op dispatches at a fixed number of slots.
/// Saturating the counter fails `ResourceExhaustion` rather than queuing —
/// per design §5, this is a strict semaphore, not a backpressure buffer.
pub struct ResourceGovernor {
    semaphore: Arc<Semaphore>,
}

impl ResourceGovernor {
    pub fn new(max_concurrent_dangerous_ops: usize) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(max_concurrent_dangerous_ops)) }
    }

    /// Attempt to take one of the counter's slots. The returned permit
    /// releases its slot on drop and owns its own `Arc` clone, so holding it
    /// never borrows the governor itself.
    pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit, AkError> {
        Arc::clone(&self.semaphore).try_acquire_owned().map_err(|_| {
            AkError::new(ErrorCode::ResourceExhaustion, "dangerous-op slot counter is saturated")
                .with_context("max_concurrent_dangerous_ops", self.semaphore.available_permits())
        })
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
