//! Metrics collection for recipe execution
//!
//! Provides Prometheus-compatible metrics for request volume, outcomes,
//! latency and panics, broken down by recipe.

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

use super::{ExecutionHook, Fault, FaultHook};
use crate::batch::{Response, SubRequest};
use crate::engine::ExecutionContext;

lazy_static! {
    /// Counter for handler invocations
    static ref RECIPE_STARTS: IntCounterVec = register_int_counter_vec!(
        "relayer_recipe_starts_total",
        "Total number of recipe handler invocations",
        &["recipe"]
    ).unwrap();

    /// Counter for completed sub-requests
    static ref RECIPE_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "relayer_requests_total",
        "Total number of completed sub-requests",
        &["recipe", "status"]
    ).unwrap();

    /// Histogram for sub-request duration
    static ref RECIPE_DURATION: HistogramVec = register_histogram_vec!(
        "relayer_request_duration_seconds",
        "Sub-request duration in seconds",
        &["recipe"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    /// Counter for recipe panics
    static ref RECIPE_FAULTS: IntCounterVec = register_int_counter_vec!(
        "relayer_recipe_faults_total",
        "Total number of recipe panics",
        &["recipe"]
    ).unwrap();
}

/// Records Prometheus metrics for every lifecycle event
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsHook;

impl MetricsHook {
    /// Completed sub-requests for a recipe and status
    pub fn requests_total(recipe: &str, status: u16) -> u64 {
        RECIPE_REQUESTS
            .with_label_values(&[recipe, &status.to_string()])
            .get()
    }

    /// Handler invocations for a recipe
    pub fn starts_total(recipe: &str) -> u64 {
        RECIPE_STARTS.with_label_values(&[recipe]).get()
    }

    /// Panics for a recipe
    pub fn faults_total(recipe: &str) -> u64 {
        RECIPE_FAULTS.with_label_values(&[recipe]).get()
    }
}

impl ExecutionHook for MetricsHook {
    fn on_start(&self, _ctx: &ExecutionContext, request: &SubRequest) {
        RECIPE_STARTS.with_label_values(&[&request.recipe]).inc();
    }

    fn on_complete(
        &self,
        _ctx: &ExecutionContext,
        request: &SubRequest,
        response: &Response,
        duration: Duration,
    ) {
        RECIPE_REQUESTS
            .with_label_values(&[&request.recipe, &response.status.to_string()])
            .inc();
        RECIPE_DURATION
            .with_label_values(&[&request.recipe])
            .observe(duration.as_secs_f64());
    }
}

impl FaultHook for MetricsHook {
    fn on_fault(&self, _ctx: &ExecutionContext, request: &SubRequest, _fault: &Fault) {
        RECIPE_FAULTS.with_label_values(&[&request.recipe]).inc();
    }
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
