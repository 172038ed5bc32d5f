//! Execution context management
//!
//! A [`BatchContext`] is what the caller hands to
//! [`execute_batch`](crate::batch::Orchestrator::execute_batch): a cancellation
//! token, an optional deadline and a bag of typed extensions. For every
//! sub-request the executor derives an immutable [`ExecutionContext`] from it,
//! adding the tenant id, request id, recipe name and the task's own deadline.
//!
//! Metadata lives in dedicated fields rather than in the extension bag, so a
//! value a collaborator stores under some type can never be read back as a
//! tenant, request or recipe id.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Longest deadline offset; larger timeouts effectively mean "no deadline"
pub const MAX_DEADLINE_OFFSET: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

fn deadline_after(timeout: Duration) -> Instant {
    Instant::now() + timeout.min(MAX_DEADLINE_OFFSET)
}

/// Typed values attached to a batch by the caller, keyed by Rust type
#[derive(Clone, Default)]
pub struct Extensions {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Create an empty extension bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning true if a value of the same type was replaced
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> bool {
        self.values.insert(TypeId::of::<T>(), Arc::new(value)).is_some()
    }

    /// Get the value stored for type `T`
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the bag is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.values.len())
            .finish()
    }
}

/// The caller's base context for one batch
#[derive(Clone, Debug)]
pub struct BatchContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    extensions: Arc<Extensions>,
}

impl Default for BatchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchContext {
    /// A context that is never cancelled and has no deadline
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            extensions: Arc::new(Extensions::new()),
        }
    }

    /// Use an existing cancellation token, e.g. one tied to a client connection
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Bound the whole batch by a timeout from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(deadline_after(timeout))
    }

    /// Bound the whole batch by a deadline; an earlier existing deadline wins
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Attach a typed value visible to every recipe in the batch
    pub fn with_extension<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        Arc::make_mut(&mut self.extensions).insert(value);
        self
    }

    /// The batch cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel every task of the batch
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the batch has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The batch deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The caller's extensions
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }
}

/// Immutable per-task context handed to recipes and hooks
#[derive(Clone)]
pub struct ExecutionContext {
    tenant_id: Option<Arc<str>>,
    request_id: Option<Arc<str>>,
    recipe_name: Option<Arc<str>>,
    deadline: Instant,
    token: CancellationToken,
    extensions: Arc<Extensions>,
}

impl ExecutionContext {
    /// Derive a context without request metadata.
    ///
    /// The deadline is `timeout` from now, capped by the batch deadline. The
    /// task gets a child token: cancelling it leaves the batch untouched.
    pub fn new(base: &BatchContext, timeout: Duration) -> Self {
        let own_deadline = deadline_after(timeout);
        let deadline = match base.deadline {
            Some(batch_deadline) => batch_deadline.min(own_deadline),
            None => own_deadline,
        };

        Self {
            tenant_id: None,
            request_id: None,
            recipe_name: None,
            deadline,
            token: base.token.child_token(),
            extensions: Arc::clone(&base.extensions),
        }
    }

    /// Derive the full context for one sub-request
    pub fn enrich(
        base: &BatchContext,
        tenant_id: &str,
        request_id: &str,
        recipe_name: &str,
        timeout: Duration,
    ) -> Self {
        Self::new(base, timeout)
            .with_tenant_id(tenant_id)
            .with_request_id(request_id)
            .with_recipe_name(recipe_name)
    }

    /// Copy of this context carrying a tenant id
    pub fn with_tenant_id(mut self, tenant_id: impl Into<Arc<str>>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Copy of this context carrying a request id
    pub fn with_request_id(mut self, request_id: impl Into<Arc<str>>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Copy of this context carrying a recipe name
    pub fn with_recipe_name(mut self, recipe_name: impl Into<Arc<str>>) -> Self {
        self.recipe_name = Some(recipe_name.into());
        self
    }

    /// Tenant the sub-request runs for
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Id of the sub-request
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Name of the recipe being executed
    pub fn recipe_name(&self) -> Option<&str> {
        self.recipe_name.as_deref()
    }

    /// Caller-supplied extension of type `T`
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    /// When the task times out
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Whether the task or its batch has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the recipe should stop working
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// Resolves once the task is cancelled or its deadline passes.
    ///
    /// Long-running recipes should race their work against this future.
    pub async fn cancelled(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = sleep_until(self.deadline) => {}
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("tenant_id", &self.tenant_id)
            .field("request_id", &self.request_id)
            .field("recipe_name", &self.recipe_name)
            .field("remaining", &self.remaining())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct TraceId(String);

    #[tokio::test]
    async fn test_enrich_sets_metadata() {
        let base = BatchContext::new();
        let ctx = ExecutionContext::enrich(&base, "tenant-a", "req-1", "echo", Duration::from_secs(1));

        assert_eq!(ctx.tenant_id(), Some("tenant-a"));
        assert_eq!(ctx.request_id(), Some("req-1"));
        assert_eq!(ctx.recipe_name(), Some("echo"));
        assert!(!ctx.is_done());
        assert!(ctx.remaining() <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_bare_context_has_no_metadata() {
        let ctx = ExecutionContext::new(&BatchContext::new(), Duration::from_secs(1));
        assert_eq!(ctx.tenant_id(), None);
        assert_eq!(ctx.request_id(), None);
        assert_eq!(ctx.recipe_name(), None);
    }

    #[tokio::test]
    async fn test_extensions_do_not_shadow_metadata() {
        let base = BatchContext::new()
            .with_extension(String::from("tenant-evil"))
            .with_extension(TraceId("abc".into()));

        let ctx = ExecutionContext::enrich(&base, "tenant-a", "req-1", "echo", Duration::from_secs(1));

        assert_eq!(ctx.tenant_id(), Some("tenant-a"));
        assert_eq!(ctx.extension::<String>().map(String::as_str), Some("tenant-evil"));
        assert_eq!(ctx.extension::<TraceId>(), Some(&TraceId("abc".into())));
        assert_eq!(ctx.extension::<u64>(), None);
    }

    #[tokio::test]
    async fn test_huge_timeout_is_clamped() {
        let ctx = ExecutionContext::new(&BatchContext::new(), Duration::MAX);
        assert!(ctx.remaining() > Duration::from_secs(365 * 24 * 60 * 60));
        assert!(ctx.remaining() <= MAX_DEADLINE_OFFSET);
        assert!(!ctx.is_done());

        let base = BatchContext::new().with_timeout(Duration::MAX);
        let ctx = ExecutionContext::new(&base, Duration::from_millis(50));
        assert!(ctx.remaining() <= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_batch_deadline_caps_task_deadline() {
        let base = BatchContext::new().with_timeout(Duration::from_millis(50));
        let ctx = ExecutionContext::new(&base, Duration::from_secs(60));
        assert!(ctx.remaining() <= Duration::from_millis(50));

        let base = BatchContext::new().with_timeout(Duration::from_secs(60));
        let ctx = ExecutionContext::new(&base, Duration::from_millis(50));
        assert!(ctx.remaining() <= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_task_cancel_does_not_touch_batch() {
        let base = BatchContext::new();
        let first = ExecutionContext::new(&base, Duration::from_secs(1));
        let second = ExecutionContext::new(&base, Duration::from_secs(1));

        first.token().cancel();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!base.is_cancelled());

        base.cancel();
        assert!(second.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_resolves_at_deadline() {
        let ctx = ExecutionContext::new(&BatchContext::new(), Duration::from_millis(100));
        let start = Instant::now();
        ctx.cancelled().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(ctx.is_expired());
    }
}
