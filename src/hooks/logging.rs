//! Structured logging hook

use std::time::Duration;

use tracing::{error, info, warn};

use super::{ExecutionHook, Fault, FaultHook};
use crate::batch::{Response, SubRequest};
use crate::engine::ExecutionContext;

/// Logs lifecycle events through `tracing`.
///
/// Panic payloads are logged here, server side, and never reach the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHook;

impl ExecutionHook for TracingHook {
    fn on_start(&self, ctx: &ExecutionContext, request: &SubRequest) {
        info!(
            tenant_id = ctx.tenant_id().unwrap_or_default(),
            recipe = %request.recipe,
            request_id = %request.id,
            remaining_ms = ctx.remaining().as_millis() as u64,
            "Recipe starting"
        );
    }

    fn on_complete(
        &self,
        ctx: &ExecutionContext,
        request: &SubRequest,
        response: &Response,
        duration: Duration,
    ) {
        let tenant_id = ctx.tenant_id().unwrap_or_default();
        let duration_ms = duration.as_millis() as u64;

        if response.is_success() {
            info!(
                tenant_id,
                recipe = %request.recipe,
                request_id = %response.id,
                status = response.status,
                duration_ms,
                "Recipe completed"
            );
        } else {
            warn!(
                tenant_id,
                recipe = %request.recipe,
                request_id = %response.id,
                status = response.status,
                code = response.error_code().map(|c| c.as_str()).unwrap_or_default(),
                duration_ms,
                "Recipe failed"
            );
        }
    }
}

impl FaultHook for TracingHook {
    fn on_fault(&self, ctx: &ExecutionContext, request: &SubRequest, fault: &Fault) {
        error!(
            tenant_id = ctx.tenant_id().unwrap_or_default(),
            recipe = %request.recipe,
            request_id = %request.id,
            panic = %fault.message(),
            "Recipe panicked"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{ErrorBody, ErrorCode};
    use crate::engine::BatchContext;
    use serde_json::json;

    #[tokio::test]
    async fn test_tracing_hook_accepts_all_events() {
        crate::telemetry::init_tracing();

        let hook = TracingHook;
        let req = SubRequest::new("1", "tenant-a", "echo", json!(1));
        let ctx = ExecutionContext::enrich(&BatchContext::new(), "tenant-a", "1", "echo", Duration::from_secs(1));

        hook.on_start(&ctx, &req);
        hook.on_complete(&ctx, &req, &Response::success(&req, json!(1)), Duration::from_millis(3));
        hook.on_complete(
            &ctx,
            &req,
            &Response::failure(&req, ErrorBody::new(ErrorCode::RecipeExecution, "boom")),
            Duration::from_millis(3),
        );
        hook.on_fault(&ctx, &req, &Fault::new(Box::new("kaput")));
    }
}
