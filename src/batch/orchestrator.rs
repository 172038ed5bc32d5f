//! Batch orchestration
//!
//! The [`Orchestrator`] owns the recipe registry and fans a batch out into one
//! tokio task per sub-request, then joins them back into a response vector
//! indexed exactly like the input. A failing, slow or panicking sub-request
//! never aborts its siblings or the batch call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{error, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::batch::{BatchSummary, ErrorBody, ErrorCode, Response, SubRequest};
use crate::config::OrchestratorConfig;
use crate::engine::{BatchContext, ConcurrencyLimiter, ExecutionContext, TaskExecutor, PANIC_MESSAGE};
use crate::hooks::{ExecutionHook, FaultHook, NoopHook};
use crate::recipe::{recipe_fn, RecipeOptions, RecipeRef, RecipeRegistry};
use crate::Result;

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    registry: Option<Arc<RecipeRegistry>>,
    execution_hook: Option<Arc<dyn ExecutionHook>>,
    fault_hook: Option<Arc<dyn FaultHook>>,
}

impl OrchestratorBuilder {
    /// Start from the default configuration
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            registry: None,
            execution_hook: None,
            fault_hook: None,
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default per-task timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Limit concurrently running handlers (0 = unbounded)
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.config.max_concurrency = limit;
        self
    }

    /// Reject batches larger than `limit` (0 = unbounded)
    pub fn with_max_batch_size(mut self, limit: usize) -> Self {
        self.config.max_batch_size = limit;
        self
    }

    /// Share an existing registry instead of creating an empty one
    pub fn with_registry(mut self, registry: Arc<RecipeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the start/complete hook
    pub fn with_execution_hook(mut self, hook: Arc<dyn ExecutionHook>) -> Self {
        self.execution_hook = Some(hook);
        self
    }

    /// Set the panic hook
    pub fn with_fault_hook(mut self, hook: Arc<dyn FaultHook>) -> Self {
        self.fault_hook = Some(hook);
        self
    }

    /// Validate the configuration and build the orchestrator
    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;

        let registry = self.registry.unwrap_or_default();
        let executor = TaskExecutor::new(
            Arc::clone(&registry),
            ConcurrencyLimiter::new(self.config.max_concurrency),
            self.config.timeout,
            self.execution_hook.unwrap_or_else(|| Arc::new(NoopHook)),
            self.fault_hook.unwrap_or_else(|| Arc::new(NoopHook)),
        );

        Ok(Orchestrator {
            config: self.config,
            registry,
            executor: Arc::new(executor),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers recipes and executes batches of sub-requests
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<RecipeRegistry>,
    executor: Arc<TaskExecutor>,
}

impl Orchestrator {
    /// Create a builder
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Create an orchestrator from a configuration, without hooks
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        Self::builder().with_config(config).build()
    }

    /// The active configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The recipe registry
    pub fn registry(&self) -> &Arc<RecipeRegistry> {
        &self.registry
    }

    /// Register a recipe, replacing any recipe of the same name
    pub fn register(&self, name: impl Into<String>, handler: RecipeRef) -> Result<()> {
        self.register_with_options(name, handler, RecipeOptions::default())
    }

    /// Register a recipe with options, replacing any recipe of the same name
    pub fn register_with_options(
        &self,
        name: impl Into<String>,
        handler: RecipeRef,
        options: RecipeOptions,
    ) -> Result<()> {
        Ok(self.registry.register(name, handler, options)?)
    }

    /// Register a recipe, failing if the name is already taken
    pub fn register_strict(
        &self,
        name: impl Into<String>,
        handler: RecipeRef,
        options: RecipeOptions,
    ) -> Result<()> {
        Ok(self.registry.register_strict(name, handler, options)?)
    }

    /// Register an async closure as a recipe
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, function: F) -> Result<()>
    where
        F: Fn(ExecutionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register(name, recipe_fn(function))
    }

    /// Execute a batch concurrently.
    ///
    /// Always returns one response per request, at the request's index.
    #[instrument(
        name = "relay_batch",
        skip_all,
        fields(batch_id = %Uuid::new_v4(), batch_size = requests.len())
    )]
    pub async fn execute_batch(&self, ctx: &BatchContext, requests: Vec<SubRequest>) -> Vec<Response> {
        if requests.is_empty() {
            return Vec::new();
        }

        let limit = self.config.max_batch_size;
        if limit > 0 && requests.len() > limit {
            warn!(limit, "Rejected oversized batch");
            return reject_oversized(&requests, limit);
        }

        let mut handles = Vec::with_capacity(requests.len());
        let mut placeholders = Vec::with_capacity(requests.len());

        for request in requests {
            placeholders.push(SubRequest::new(
                request.id.clone(),
                request.tenant_id.clone(),
                request.recipe.clone(),
                Value::Null,
            ));

            let executor = Arc::clone(&self.executor);
            let base = ctx.clone();
            let task = async move { executor.execute(&base, request).await };
            handles.push(tokio::spawn(task.in_current_span()));
        }

        let responses: Vec<Response> = join_all(handles)
            .await
            .into_iter()
            .zip(placeholders)
            .map(|(joined, request)| match joined {
                Ok(response) => response,
                Err(join_err) => {
                    error!(request_id = %request.id, error = %join_err, "Sub-request task failed");
                    Response::failure(&request, ErrorBody::new(ErrorCode::Panic, PANIC_MESSAGE))
                }
            })
            .collect();

        let summary = BatchSummary::from_responses(&responses);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            success_rate = format!("{:.2}%", summary.success_rate()),
            "Batch execution completed"
        );

        responses
    }
}

fn reject_oversized(requests: &[SubRequest], limit: usize) -> Vec<Response> {
    let message = format!("batch size {} exceeds limit of {}", requests.len(), limit);
    requests
        .iter()
        .map(|request| {
            Response::failure(
                request,
                ErrorBody::new(ErrorCode::BatchTooLarge, message.clone())
                    .with_detail("batch_size", requests.len() as u64)
                    .with_detail("limit", limit as u64),
            )
        })
        .collect()
}
