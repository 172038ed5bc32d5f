//! # Relayer
//!
//! A batch execution core for multi-tenant services: a caller submits a batch of
//! independent sub-requests, each naming a tenant and a registered *recipe*, and
//! receives exactly one response per sub-request, in input order, no matter how
//! many of them failed.
//!
//! ## Quick Start
//!
//! ```rust
//! use relayer::batch::{Orchestrator, SubRequest};
//! use relayer::engine::BatchContext;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() -> relayer::Result<()> {
//! let orchestrator = Orchestrator::builder()
//!     .with_timeout(Duration::from_secs(2))
//!     .with_max_concurrency(16)
//!     .build()?;
//!
//! orchestrator.register_fn("echo", |_ctx, payload| async move { Ok(payload) })?;
//!
//! let responses = orchestrator
//!     .execute_batch(
//!         &BatchContext::new(),
//!         vec![
//!             SubRequest::new("1", "tenant-a", "echo", json!("hi")),
//!             SubRequest::new("2", "tenant-b", "missing", json!(null)),
//!         ],
//!     )
//!     .await;
//!
//! assert_eq!(responses[0].status, 200);
//! assert_eq!(responses[1].status, 404);
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Features
//!
//! - **Partial success**: one failing sub-request never fails its siblings or the batch call
//! - **Bounded concurrency**: a cancellation-aware semaphore gates running handlers
//! - **Fault isolation**: a panicking recipe becomes a generic `500 PANIC` response
//! - **Per-task deadlines**: default timeout with per-recipe overrides
//! - **Lifecycle hooks**: start, completion and fault callbacks for logging and metrics
//!
//! ## Modules
//!
//! - [`batch`]: request/response types, the [`batch::Orchestrator`] and result filters
//! - [`recipe`]: the handler trait and the recipe registry
//! - [`engine`]: execution contexts, the concurrency limiter and the task executor
//! - [`hooks`]: lifecycle hook traits and ready-made tracing/metrics hooks
//! - [`config`]: orchestrator configuration
//! - [`telemetry`]: tracing subscriber bootstrap

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for relayer operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Main error type for relayer operations.
///
/// Only construction and registration can fail; per-request failures are
/// always reported inside the returned [`batch::Response`] values.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Invalid orchestrator configuration
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Recipe registration error
    #[error("Registry error: {0}")]
    Registry(#[from] recipe::RegistryError),
}

/// Request/response types, orchestration and result helpers
pub mod batch;

/// Orchestrator configuration
pub mod config;

/// Per-task execution machinery
pub mod engine;

/// Lifecycle hooks
pub mod hooks;

/// Recipe handlers and registry
pub mod recipe;

/// Tracing subscriber setup
pub mod telemetry;
