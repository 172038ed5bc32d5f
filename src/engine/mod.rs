//! Sub-request execution engine
//!
//! This module provides the per-task runtime behind the orchestrator:
//! context derivation, concurrency limiting and the task state machine.

pub mod context;
pub mod executor;
pub mod limiter;

pub use context::{BatchContext, ExecutionContext, Extensions, MAX_DEADLINE_OFFSET};
pub use executor::{
    TaskExecutor, TaskState, CANCELLED_MESSAGE, INVALID_REQUEST_MESSAGE, PANIC_MESSAGE,
    TIMEOUT_MESSAGE,
};
pub use limiter::{AcquireError, ConcurrencyLimiter, SlotPermit};
