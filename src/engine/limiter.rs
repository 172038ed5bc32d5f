//! Concurrency limiting for recipe execution
//!
//! A counting semaphore gates how many handlers run at once. Waiting for a
//! slot races against the task's context, so a queued task observes
//! cancellation and its deadline instead of blocking indefinitely.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::ExecutionContext;

/// Errors that can occur while waiting for an execution slot
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// The task was cancelled or its deadline passed before a slot freed up
    #[error("cancelled while waiting for execution slot")]
    Cancelled,
}

/// An execution slot; the slot is returned when the permit is dropped
#[derive(Debug)]
pub struct SlotPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Bounded counting semaphore; capacity 0 disables gating
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    capacity: usize,
    semaphore: Option<Arc<Semaphore>>,
}

impl ConcurrencyLimiter {
    /// Create a limiter allowing `capacity` concurrent slots (0 = unbounded)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(Semaphore::MAX_PERMITS);
        let semaphore = (capacity > 0).then(|| Arc::new(Semaphore::new(capacity)));
        Self { capacity, semaphore }
    }

    /// A limiter that never blocks
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Whether the limiter gates execution at all
    pub fn is_bounded(&self) -> bool {
        self.semaphore.is_some()
    }

    /// Configured capacity (0 = unbounded)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now, or `None` when unbounded
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Wait for a slot, giving up when `ctx` is cancelled or expires
    pub async fn acquire(&self, ctx: &ExecutionContext) -> Result<SlotPermit, AcquireError> {
        let Some(semaphore) = &self.semaphore else {
            return Ok(SlotPermit { _permit: None });
        };

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(AcquireError::Cancelled),
            permit = Arc::clone(semaphore).acquire_owned() => permit
                .map(|permit| SlotPermit { _permit: Some(permit) })
                .map_err(|_| AcquireError::Cancelled),
        }
    }
}
