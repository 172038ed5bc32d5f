//! Result filtering and batch summaries

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::Response;

/// Responses with a 2xx status, in input order
pub fn filter_success(responses: &[Response]) -> Vec<Response> {
    responses
        .iter()
        .filter(|resp| resp.is_success())
        .cloned()
        .collect()
}

/// Responses with exactly `status`, in input order
pub fn filter_by_status(responses: &[Response], status: u16) -> Vec<Response> {
    responses
        .iter()
        .filter(|resp| resp.status == status)
        .cloned()
        .collect()
}

/// Responses belonging to `tenant_id`, in input order
pub fn filter_by_tenant(responses: &[Response], tenant_id: &str) -> Vec<Response> {
    responses
        .iter()
        .filter(|resp| resp.tenant_id == tenant_id)
        .cloned()
        .collect()
}

/// Aggregated outcome counts for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of responses
    pub total: usize,
    /// Responses with a 2xx status
    pub succeeded: usize,
    /// Responses with any other status
    pub failed: usize,
    /// Response count per status class
    pub by_status: BTreeMap<u16, usize>,
    /// Sum of per-response durations
    #[serde(rename = "total_duration_ms", with = "crate::config::duration_ms")]
    pub total_duration: Duration,
}

impl BatchSummary {
    /// Summarize a response set
    pub fn from_responses(responses: &[Response]) -> Self {
        let mut summary = Self {
            total: responses.len(),
            ..Default::default()
        };

        for resp in responses {
            if resp.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            *summary.by_status.entry(resp.status).or_insert(0) += 1;
            summary.total_duration += resp.duration;
        }

        summary
    }

    /// Share of successful responses in percent
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.succeeded as f64 / self.total as f64) * 100.0
    }
}
