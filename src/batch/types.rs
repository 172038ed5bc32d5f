use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// HTTP-style status classes used in [`Response::status`]
pub mod status {
    /// Recipe returned a value
    pub const OK: u16 = 200;
    /// Sub-request is missing a required field
    pub const BAD_REQUEST: u16 = 400;
    /// Recipe is not registered
    pub const NOT_FOUND: u16 = 404;
    /// Batch exceeds the configured size limit
    pub const PAYLOAD_TOO_LARGE: u16 = 413;
    /// Recipe failed or panicked
    pub const INTERNAL_ERROR: u16 = 500;
    /// Deadline exceeded or cancelled
    pub const GATEWAY_TIMEOUT: u16 = 504;

    /// Whether a status is in the 2xx range
    pub fn is_success(status: u16) -> bool {
        (200..300).contains(&status)
    }
}

/// A single request in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRequest {
    /// Unique request identifier, mirrored in the response
    pub id: String,
    /// Tenant the request runs for
    pub tenant_id: String,
    /// Name of the recipe to execute
    pub recipe: String,
    /// Opaque recipe input; `null` is allowed
    #[serde(default)]
    pub payload: Value,
}

impl SubRequest {
    /// Create a new sub-request
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        recipe: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            recipe: recipe.into(),
            payload,
        }
    }

    /// Whether id, tenant and recipe are all present
    pub fn is_dispatchable(&self) -> bool {
        !self.id.is_empty() && !self.tenant_id.is_empty() && !self.recipe.is_empty()
    }
}

/// Error codes reported in [`ErrorBody::code`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing id, tenant or recipe
    InvalidRequest,
    /// Recipe name not registered
    RecipeNotFound,
    /// Batch size exceeds limit
    BatchTooLarge,
    /// Recipe returned an error
    RecipeExecution,
    /// Recipe panicked
    Panic,
    /// Deadline exceeded or cancelled
    Timeout,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::RecipeNotFound => "RECIPE_NOT_FOUND",
            ErrorCode::BatchTooLarge => "BATCH_TOO_LARGE",
            ErrorCode::RecipeExecution => "RECIPE_EXECUTION",
            ErrorCode::Panic => "PANIC",
            ErrorCode::Timeout => "TIMEOUT",
        }
    }

    /// Status class a response with this code carries
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::InvalidRequest => status::BAD_REQUEST,
            ErrorCode::RecipeNotFound => status::NOT_FOUND,
            ErrorCode::BatchTooLarge => status::PAYLOAD_TOO_LARGE,
            ErrorCode::RecipeExecution | ErrorCode::Panic => status::INTERNAL_ERROR,
            ErrorCode::Timeout => status::GATEWAY_TIMEOUT,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error attached to every non-2xx response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct ErrorBody {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Additional error context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl ErrorBody {
    /// Create an error without details
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add one detail entry
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Result of processing one [`SubRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the sub-request this answers
    pub id: String,
    /// HTTP-style status class
    pub status: u16,
    /// Recipe output, present only on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error details, present iff the status is not 2xx
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    /// Time from validation to classification
    #[serde(rename = "duration_ms", with = "crate::config::duration_ms")]
    pub duration: Duration,
    /// Tenant of the sub-request
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tenant_id: String,
}

impl Response {
    /// A 200 response carrying the recipe output
    pub fn success(request: &SubRequest, data: Value) -> Self {
        Self {
            id: request.id.clone(),
            status: status::OK,
            data: Some(data),
            error: None,
            duration: Duration::ZERO,
            tenant_id: request.tenant_id.clone(),
        }
    }

    /// A failure response; the status follows from the error code
    pub fn failure(request: &SubRequest, error: ErrorBody) -> Self {
        Self {
            id: request.id.clone(),
            status: error.code.status(),
            data: None,
            error: Some(error),
            duration: Duration::ZERO,
            tenant_id: request.tenant_id.clone(),
        }
    }

    /// Set the elapsed time
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        status::is_success(self.status)
    }

    /// The error code, if the response failed
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}
