//! Recipe handlers
//!
//! A recipe is a named unit of business logic. The orchestrator hands each
//! recipe an [`ExecutionContext`] carrying the tenant, request id and deadline
//! of the sub-request, together with the sub-request's opaque payload.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::ExecutionContext;

pub mod registry;

pub use registry::{RecipeEntry, RecipeRegistry, RegistryError};

/// Trait for implementing recipes.
///
/// Implementations must be safe to call from many tasks at once. Returning
/// `Err` produces a `500 RECIPE_EXECUTION` response carrying the error text;
/// panicking produces a generic `500 PANIC` response instead.
///
/// ```rust
/// use async_trait::async_trait;
/// use relayer::engine::ExecutionContext;
/// use relayer::recipe::Recipe;
/// use serde_json::{json, Value};
///
/// struct Greeter;
///
/// #[async_trait]
/// impl Recipe for Greeter {
///     async fn call(&self, ctx: ExecutionContext, _payload: Value) -> anyhow::Result<Value> {
///         let tenant = ctx.tenant_id().unwrap_or("anonymous");
///         Ok(json!(format!("hello, {tenant}")))
///     }
/// }
/// ```
#[async_trait]
pub trait Recipe: Send + Sync {
    /// Execute the recipe for one sub-request
    async fn call(&self, ctx: ExecutionContext, payload: Value) -> anyhow::Result<Value>;
}

/// Shared handle to a registered recipe
pub type RecipeRef = Arc<dyn Recipe>;

/// Per-recipe registration options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecipeOptions {
    /// Replaces the orchestrator's default timeout when set and non-zero
    pub timeout: Option<Duration>,
}

impl RecipeOptions {
    /// Options overriding the default timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    /// The override to apply, ignoring a zero duration
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }
}

/// Function recipe - wraps an async closure as a recipe
pub struct FunctionRecipe<F> {
    function: F,
}

impl<F> FunctionRecipe<F> {
    /// Create a new function recipe
    pub fn new(function: F) -> Self {
        Self { function }
    }
}

impl<F> fmt::Debug for FunctionRecipe<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRecipe").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Recipe for FunctionRecipe<F>
where
    F: Fn(ExecutionContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, ctx: ExecutionContext, payload: Value) -> anyhow::Result<Value> {
        (self.function)(ctx, payload).await
    }
}

/// Wrap an async closure as a shared recipe handle
pub fn recipe_fn<F, Fut>(function: F) -> RecipeRef
where
    F: Fn(ExecutionContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FunctionRecipe::new(function))
}
