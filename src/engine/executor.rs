//! Task executor implementation
//!
//! Runs one sub-request end to end:
//!
//! ```text
//! Validating ─► Enriching ─► Acquiring ─► Executing ─► Classifying ─► Completed
//!     │             │            │
//!     └─ 400 ───────┴─ 404 ──────┴─ 504 ──────────────────────────────►┘
//! ```
//!
//! The handler runs on its own tokio task, which owns the concurrency slot.
//! A panic unwinds only that task and is reported as a generic `500 PANIC`;
//! the original payload goes to the fault hook. When the deadline passes or
//! the batch is cancelled the executor stops waiting, answers `504 TIMEOUT`
//! and signals the handler through its context. The handler itself is not
//! aborted, and its slot is returned once it actually finishes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::sleep_until;
use tracing::{debug, error, instrument, trace, warn};

use super::{AcquireError, BatchContext, ConcurrencyLimiter, ExecutionContext, SlotPermit};
use crate::batch::{ErrorBody, ErrorCode, Response, SubRequest};
use crate::hooks::{ExecutionHook, Fault, FaultHook};
use crate::recipe::{RecipeEntry, RecipeRef, RecipeRegistry};

/// Caller-visible message for recipe panics; never carries panic detail
pub const PANIC_MESSAGE: &str = "internal error during recipe execution";

/// Message for sub-requests missing a required field
pub const INVALID_REQUEST_MESSAGE: &str = "request must have non-empty id, tenant_id, and recipe";

/// Message for a deadline hit while the handler runs
pub const TIMEOUT_MESSAGE: &str = "recipe execution timed out";

/// Message for a batch cancelled while the handler runs
pub const CANCELLED_MESSAGE: &str = "recipe execution cancelled";

/// Lifecycle states of a single task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Checking required request fields
    Validating,
    /// Resolving the recipe and deriving the execution context
    Enriching,
    /// Waiting for a concurrency slot
    Acquiring,
    /// Handler running
    Executing,
    /// Mapping the outcome to a response
    Classifying,
    /// Response produced
    Completed,
}

/// How a handler invocation ended
#[derive(Debug)]
enum Outcome {
    Returned(Value),
    Failed(anyhow::Error),
    Faulted,
    DeadlineExceeded,
    Cancelled,
}

/// Executes sub-requests against the recipe registry
pub struct TaskExecutor {
    registry: Arc<RecipeRegistry>,
    limiter: ConcurrencyLimiter,
    default_timeout: Duration,
    execution_hook: Arc<dyn ExecutionHook>,
    fault_hook: Arc<dyn FaultHook>,
}

impl TaskExecutor {
    /// Create a new task executor
    pub fn new(
        registry: Arc<RecipeRegistry>,
        limiter: ConcurrencyLimiter,
        default_timeout: Duration,
        execution_hook: Arc<dyn ExecutionHook>,
        fault_hook: Arc<dyn FaultHook>,
    ) -> Self {
        Self {
            registry,
            limiter,
            default_timeout,
            execution_hook,
            fault_hook,
        }
    }

    /// The registry recipes are resolved from
    pub fn registry(&self) -> &Arc<RecipeRegistry> {
        &self.registry
    }

    /// The concurrency limiter shared by all tasks
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Timeout used when a recipe has no override
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run one sub-request to completion. Never fails: every outcome is a response.
    #[instrument(
        name = "relay_task",
        skip_all,
        fields(request_id = %request.id, tenant_id = %request.tenant_id, recipe = %request.recipe)
    )]
    pub async fn execute(&self, base: &BatchContext, request: SubRequest) -> Response {
        let start = Instant::now();

        transition(TaskState::Validating);
        if !request.is_dispatchable() {
            debug!("Rejected sub-request with missing fields");
            return Response::failure(
                &request,
                ErrorBody::new(ErrorCode::InvalidRequest, INVALID_REQUEST_MESSAGE),
            )
            .with_duration(start.elapsed());
        }

        transition(TaskState::Enriching);
        let entry = self.registry.lookup(&request.recipe);
        let timeout = effective_timeout(entry.as_ref(), self.default_timeout);
        let ctx = ExecutionContext::enrich(
            base,
            &request.tenant_id,
            &request.id,
            &request.recipe,
            timeout,
        );

        let response = match entry {
            Some(entry) => self.dispatch(&ctx, &request, entry.handler, timeout).await,
            None => {
                debug!("Recipe not registered");
                Response::failure(
                    &request,
                    ErrorBody::new(
                        ErrorCode::RecipeNotFound,
                        format!("recipe '{}' not found", request.recipe),
                    )
                    .with_detail("recipe", request.recipe.as_str()),
                )
            }
        };

        let duration = start.elapsed();
        let response = response.with_duration(duration);
        transition(TaskState::Completed);

        // Ends the task's context; a detached handler observes this.
        ctx.token().cancel();

        debug!(
            status = response.status,
            duration_ms = duration.as_millis() as u64,
            "Sub-request completed"
        );
        self.execution_hook
            .on_complete(&ctx, &request, &response, duration);
        response
    }

    async fn dispatch(
        &self,
        ctx: &ExecutionContext,
        request: &SubRequest,
        handler: RecipeRef,
        timeout: Duration,
    ) -> Response {
        transition(TaskState::Acquiring);
        let permit = match self.limiter.acquire(ctx).await {
            Ok(permit) => permit,
            Err(err) => {
                debug!(error = %err, "Gave up waiting for an execution slot");
                return Response::failure(request, acquire_failure(err, timeout));
            }
        };

        transition(TaskState::Executing);
        self.execution_hook.on_start(ctx, request);
        let outcome = self.invoke(ctx, request, handler, permit).await;

        transition(TaskState::Classifying);
        classify(request, outcome, timeout)
    }

    async fn invoke(
        &self,
        ctx: &ExecutionContext,
        request: &SubRequest,
        handler: RecipeRef,
        permit: SlotPermit,
    ) -> Outcome {
        let handler_ctx = ctx.clone();
        let payload = request.payload.clone();
        let mut running = tokio::spawn(async move {
            let _permit = permit;
            handler.call(handler_ctx, payload).await
        });

        let outcome = tokio::select! {
            biased;
            joined = &mut running => match joined {
                Ok(Ok(value)) => Outcome::Returned(value),
                Ok(Err(err)) => Outcome::Failed(err),
                Err(join_err) => {
                    error!("Recipe handler panicked");
                    if join_err.is_panic() {
                        let fault = Fault::new(join_err.into_panic());
                        self.fault_hook.on_fault(ctx, request, &fault);
                    }
                    Outcome::Faulted
                }
            },
            _ = sleep_until(ctx.deadline()) => {
                warn!("Recipe exceeded its deadline");
                Outcome::DeadlineExceeded
            }
            _ = ctx.token().cancelled() => {
                warn!("Batch cancelled while recipe was running");
                Outcome::Cancelled
            }
        };

        // A result that lands after the deadline or a cancel is still a timeout.
        match outcome {
            Outcome::Returned(_) | Outcome::Failed(_) | Outcome::Faulted if ctx.is_expired() => {
                Outcome::DeadlineExceeded
            }
            Outcome::Returned(_) | Outcome::Failed(_) | Outcome::Faulted if ctx.is_cancelled() => {
                Outcome::Cancelled
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("registry", &self.registry)
            .field("limiter", &self.limiter)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

fn transition(state: TaskState) {
    trace!(state = ?state, "Task state");
}

fn effective_timeout(entry: Option<&RecipeEntry>, default_timeout: Duration) -> Duration {
    entry
        .and_then(|entry| entry.options.effective_timeout())
        .unwrap_or(default_timeout)
}

fn acquire_failure(err: AcquireError, timeout: Duration) -> ErrorBody {
    ErrorBody::new(ErrorCode::Timeout, err.to_string())
        .with_detail("phase", "acquire")
        .with_detail("timeout_ms", u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
}

fn classify(request: &SubRequest, outcome: Outcome, timeout: Duration) -> Response {
    match outcome {
        Outcome::Returned(value) => Response::success(request, value),
        Outcome::DeadlineExceeded => Response::failure(
            request,
            ErrorBody::new(ErrorCode::Timeout, TIMEOUT_MESSAGE)
                .with_detail("phase", "execute")
                .with_detail("timeout_ms", u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
        ),
        Outcome::Cancelled => Response::failure(
            request,
            ErrorBody::new(ErrorCode::Timeout, CANCELLED_MESSAGE).with_detail("phase", "execute"),
        ),
        Outcome::Faulted => {
            Response::failure(request, ErrorBody::new(ErrorCode::Panic, PANIC_MESSAGE))
        }
        Outcome::Failed(err) => Response::failure(
            request,
            ErrorBody::new(ErrorCode::RecipeExecution, format!("{err:#}")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NoopHook;
    use crate::recipe::{recipe_fn, RecipeOptions};
    use serde_json::json;

    fn executor(registry: Arc<RecipeRegistry>, limit: usize, timeout: Duration) -> TaskExecutor {
        TaskExecutor::new(
            registry,
            ConcurrencyLimiter::new(limit),
            timeout,
            Arc::new(NoopHook),
            Arc::new(NoopHook),
        )
    }

    #[test]
    fn test_effective_timeout() {
        let handler = recipe_fn(|_ctx, payload| async move { Ok(payload) });
        let default = Duration::from_secs(5);

        assert_eq!(effective_timeout(None, default), default);

        let entry = RecipeEntry { handler: handler.clone(), options: RecipeOptions::default() };
        assert_eq!(effective_timeout(Some(&entry), default), default);

        let entry = RecipeEntry {
            handler: handler.clone(),
            options: RecipeOptions::with_timeout(Duration::ZERO),
        };
        assert_eq!(effective_timeout(Some(&entry), default), default);

        let entry = RecipeEntry {
            handler,
            options: RecipeOptions::with_timeout(Duration::from_secs(30)),
        };
        assert_eq!(effective_timeout(Some(&entry), default), Duration::from_secs(30));
    }

    #[test]
    fn test_classify_error_keeps_context_chain() {
        let req = SubRequest::new("1", "t", "r", json!(null));
        let err = anyhow::anyhow!("disk full").context("saving report");
        let resp = classify(&req, Outcome::Failed(err), Duration::from_secs(1));

        assert_eq!(resp.status, 500);
        assert_eq!(resp.error_code(), Some(ErrorCode::RecipeExecution));
        assert_eq!(resp.error.unwrap().message, "saving report: disk full");
    }

    #[tokio::test]
    async fn test_execute_success() {
        let registry = Arc::new(RecipeRegistry::new());
        registry
            .register(
                "whoami",
                recipe_fn(|ctx, _payload| async move {
                    Ok(json!({
                        "tenant": ctx.tenant_id().map(str::to_owned),
                        "request": ctx.request_id().map(str::to_owned),
                        "recipe": ctx.recipe_name().map(str::to_owned),
                    }))
                }),
                RecipeOptions::default(),
            )
            .unwrap();

        let exec = executor(registry, 0, Duration::from_secs(1));
        let resp = exec
            .execute(&BatchContext::new(), SubRequest::new("r-1", "tenant-a", "whoami", json!(null)))
            .await;

        assert_eq!(resp.status, 200);
        assert_eq!(
            resp.data,
            Some(json!({"tenant": "tenant-a", "request": "r-1", "recipe": "whoami"}))
        );
        assert!(resp.error.is_none());
        assert_eq!(resp.tenant_id, "tenant-a");
    }

    #[tokio::test]
    async fn test_execute_invalid_request() {
        let exec = executor(Arc::new(RecipeRegistry::new()), 0, Duration::from_secs(1));
        let resp = exec
            .execute(&BatchContext::new(), SubRequest::new("1", "", "echo", json!(null)))
            .await;

        assert_eq!(resp.status, 400);
        assert_eq!(resp.error_code(), Some(ErrorCode::InvalidRequest));
        assert_eq!(resp.error.unwrap().message, INVALID_REQUEST_MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_deadline() {
        let registry = Arc::new(RecipeRegistry::new());
        registry
            .register(
                "sleepy",
                recipe_fn(|_ctx, _payload| async move {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(json!("late"))
                }),
                RecipeOptions::default(),
            )
            .unwrap();

        let exec = executor(registry, 1, Duration::from_millis(100));
        let resp = exec
            .execute(&BatchContext::new(), SubRequest::new("1", "t", "sleepy", json!(null)))
            .await;

        assert_eq!(resp.status, 504);
        let err = resp.error.unwrap();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert_eq!(err.message, TIMEOUT_MESSAGE);
    }

    #[tokio::test]
    async fn test_execute_releases_slot_after_panic() {
        let registry = Arc::new(RecipeRegistry::new());
        registry
            .register(
                "explode",
                recipe_fn(|_ctx, _payload| async move {
                    if true {
                        panic!("kaboom");
                    }
                    Ok(Value::Null)
                }),
                RecipeOptions::default(),
            )
            .unwrap();

        let exec = executor(registry, 1, Duration::from_secs(1));
        let resp = exec
            .execute(&BatchContext::new(), SubRequest::new("1", "t", "explode", json!(null)))
            .await;

        assert_eq!(resp.status, 500);
        assert_eq!(resp.error.unwrap().message, PANIC_MESSAGE);
        assert_eq!(exec.limiter().available(), Some(1));
    }
}
