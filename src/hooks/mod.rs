//! Lifecycle hooks
//!
//! Hooks observe sub-request execution without influencing it:
//!
//! - [`ExecutionHook::on_start`] fires right before a recipe handler is invoked
//! - [`ExecutionHook::on_complete`] fires once per sub-request that passed
//!   validation, with the final response and its duration
//! - [`FaultHook::on_fault`] fires once per handler panic, with the original
//!   panic payload; the caller only ever sees a generic `500 PANIC`
//!
//! Hooks are called concurrently from many tasks, so implementations must do
//! their own synchronization. They are expected not to panic; the core does
//! not guard against it.

use std::any::Any;
use std::fmt;
use std::time::Duration;

use crate::batch::{Response, SubRequest};
use crate::engine::ExecutionContext;

pub mod composite;
pub mod logging;
pub mod metrics;

pub use composite::CompositeHook;
pub use logging::TracingHook;
pub use metrics::MetricsHook;

/// Callbacks for the execution lifecycle of a sub-request
pub trait ExecutionHook: Send + Sync {
    /// Called before the recipe handler runs
    fn on_start(&self, ctx: &ExecutionContext, request: &SubRequest);

    /// Called after the response has been classified
    fn on_complete(
        &self,
        ctx: &ExecutionContext,
        request: &SubRequest,
        response: &Response,
        duration: Duration,
    );
}

/// Callback for recipe panics, intended for alerting
pub trait FaultHook: Send + Sync {
    /// Called with the recovered panic payload
    fn on_fault(&self, ctx: &ExecutionContext, request: &SubRequest, fault: &Fault);
}

/// The original payload of a recipe panic
pub struct Fault {
    payload: Box<dyn Any + Send + 'static>,
}

impl Fault {
    /// Wrap a recovered panic payload
    pub fn new(payload: Box<dyn Any + Send + 'static>) -> Self {
        Self { payload }
    }

    /// Best-effort text of the panic payload
    pub fn message(&self) -> String {
        if let Some(msg) = self.payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = self.payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        }
    }

    /// Downcast the payload to a concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// The raw payload
    pub fn payload(&self) -> &(dyn Any + Send) {
        self.payload.as_ref()
    }

    /// Take ownership of the raw payload, e.g. to resume unwinding
    pub fn into_payload(self) -> Box<dyn Any + Send + 'static> {
        self.payload
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault").field("message", &self.message()).finish()
    }
}

/// Hook that does nothing; the default for both hook kinds
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl ExecutionHook for NoopHook {
    fn on_start(&self, _ctx: &ExecutionContext, _request: &SubRequest) {}

    fn on_complete(
        &self,
        _ctx: &ExecutionContext,
        _request: &SubRequest,
        _response: &Response,
        _duration: Duration,
    ) {
    }
}

impl FaultHook for NoopHook {
    fn on_fault(&self, _ctx: &ExecutionContext, _request: &SubRequest, _fault: &Fault) {}
}
