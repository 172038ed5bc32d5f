//! Fan one lifecycle event out to several hooks

use std::sync::Arc;
use std::time::Duration;

use super::{ExecutionHook, Fault, FaultHook};
use crate::batch::{Response, SubRequest};
use crate::engine::ExecutionContext;

/// Calls every registered hook, in registration order
#[derive(Default, Clone)]
pub struct CompositeHook {
    execution_hooks: Vec<Arc<dyn ExecutionHook>>,
    fault_hooks: Vec<Arc<dyn FaultHook>>,
}

impl CompositeHook {
    /// Create an empty composite
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an execution hook
    pub fn with_execution_hook(mut self, hook: Arc<dyn ExecutionHook>) -> Self {
        self.execution_hooks.push(hook);
        self
    }

    /// Add a fault hook
    pub fn with_fault_hook(mut self, hook: Arc<dyn FaultHook>) -> Self {
        self.fault_hooks.push(hook);
        self
    }

    /// Add a hook implementing both traits
    pub fn with_hook<H>(self, hook: Arc<H>) -> Self
    where
        H: ExecutionHook + FaultHook + 'static,
    {
        self.with_execution_hook(hook.clone()).with_fault_hook(hook)
    }
}

impl std::fmt::Debug for CompositeHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeHook")
            .field("execution_hooks", &self.execution_hooks.len())
            .field("fault_hooks", &self.fault_hooks.len())
            .finish()
    }
}

impl ExecutionHook for CompositeHook {
    fn on_start(&self, ctx: &ExecutionContext, request: &SubRequest) {
        for hook in &self.execution_hooks {
            hook.on_start(ctx, request);
        }
    }

    fn on_complete(
        &self,
        ctx: &ExecutionContext,
        request: &SubRequest,
        response: &Response,
        duration: Duration,
    ) {
        for hook in &self.execution_hooks {
            hook.on_complete(ctx, request, response, duration);
        }
    }
}

impl FaultHook for CompositeHook {
    fn on_fault(&self, ctx: &ExecutionContext, request: &SubRequest, fault: &Fault) {
        for hook in &self.fault_hooks {
            hook.on_fault(ctx, request, fault);
        }
    }
}
