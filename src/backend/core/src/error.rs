//! Error handling for Forget Core.
//!
//! This module provides:
//! - A single error type carrying a machine-readable code and a user message
//! - HTTP status code mapping for API responses
//! - Severity-aware logging with tracing integration
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use forget_core::error::{ForgetError, Result, ErrorContext, ErrorCode};
//!
//! fn load() -> Result<()> {
//!     some_operation().with_error_code(ErrorCode::FetchFailed)?;
//!     Ok(())
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Forget operations.
pub type Result<T> = std::result::Result<T, ForgetError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Distribution Errors (1000-1099)
    FetchFailed,
    ConvergenceFailed,
    CommitConflict,
    DistributionEmpty,

    // Pipeline Errors (1100-1199)
    QueueFull,
    PipelineClosed,

    // Store Errors (2100-2199)
    StoreError,
    StoreConnectionFailed,

    // Serialization Errors (2200-2299)
    SerializationError,

    // Validation Errors (4100-4199)
    MissingArgument,
    InvalidArgument,

    // Configuration Errors (5000-5099)
    ConfigurationError,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::FetchFailed => 1000,
            Self::ConvergenceFailed => 1001,
            Self::CommitConflict => 1002,
            Self::DistributionEmpty => 1003,

            Self::QueueFull => 1100,
            Self::PipelineClosed => 1101,

            Self::StoreError => 2100,
            Self::StoreConnectionFailed => 2101,

            Self::SerializationError => 2200,

            Self::MissingArgument => 4101,
            Self::InvalidArgument => 4102,

            Self::ConfigurationError => 5000,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::MissingArgument | Self::InvalidArgument => StatusCode::UNPROCESSABLE_ENTITY,

            Self::CommitConflict => StatusCode::CONFLICT,

            Self::QueueFull => StatusCode::TOO_MANY_REQUESTS,

            Self::FetchFailed => StatusCode::BAD_GATEWAY,

            Self::StoreConnectionFailed | Self::PipelineClosed => StatusCode::SERVICE_UNAVAILABLE,

            Self::ConvergenceFailed
            | Self::DistributionEmpty
            | Self::StoreError
            | Self::SerializationError
            | Self::ConfigurationError
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed
                | Self::CommitConflict
                | Self::QueueFull
                | Self::StoreError
                | Self::StoreConnectionFailed
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "distribution",
            1100..=1199 => "pipeline",
            2100..=2199 => "store",
            2200..=2299 => "serialization",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected outcomes and user errors
    Low,
    /// Operational issues (conflicts, backpressure)
    Medium,
    /// System errors (store failures)
    High,
    /// Errors that prevent the service from running
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::MissingArgument
            | ErrorCode::InvalidArgument
            | ErrorCode::DistributionEmpty => Self::Low,

            ErrorCode::CommitConflict
            | ErrorCode::ConvergenceFailed
            | ErrorCode::QueueFull
            | ErrorCode::PipelineClosed => Self::Medium,

            ErrorCode::FetchFailed
            | ErrorCode::StoreError
            | ErrorCode::SerializationError
            | ErrorCode::InternalError => Self::High,

            ErrorCode::StoreConnectionFailed | ErrorCode::ConfigurationError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Distribution the error relates to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,

    /// Retry information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_distribution(mut self, name: impl Into<String>) -> Self {
        self.distribution = Some(name.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_secs = Some(seconds);
        self
    }

    fn is_empty(&self) -> bool {
        self.context.is_empty() && self.distribution.is_none() && self.retry_after_secs.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Forget Core.
#[derive(Error, Debug)]
pub struct ForgetError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for ForgetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl ForgetError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// A required request argument was absent.
    pub fn missing_argument(name: &str) -> Self {
        Self::new(
            ErrorCode::MissingArgument,
            format!("MISSING_ARG_{}", name.to_ascii_uppercase()),
        )
        .with_context("argument", name)
    }

    /// A request argument could not be parsed.
    pub fn invalid_argument(name: &str, raw: &str) -> Self {
        Self::new(
            ErrorCode::InvalidArgument,
            format!("CANNOT_PARSE_{}", name.to_ascii_uppercase()),
        )
        .with_context("argument", name)
        .with_context("value", raw)
    }

    /// A load could not retrieve the data it needs.
    pub fn fetch_failed(distribution: &str, reason: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::FetchFailed,
            format!("Could not fetch data for {}", distribution),
            reason,
        )
        .with_details(ErrorDetails::new().with_distribution(distribution))
    }

    /// The Poisson sampler exceeded its iteration bound.
    pub fn convergence_failed(rate: f64, lambda: f64) -> Self {
        Self::new(
            ErrorCode::ConvergenceFailed,
            format!(
                "Poisson simulation did not converge with rate = {} => lambda = {}",
                rate, lambda
            ),
        )
    }

    /// A write-back lost the optimistic lock.
    pub fn commit_conflict(distribution: &str) -> Self {
        Self::new(
            ErrorCode::CommitConflict,
            format!("Concurrent modification of {}, update dropped", distribution),
        )
        .with_details(ErrorDetails::new().with_distribution(distribution))
    }

    /// A write-back was attempted on a distribution with no mass left.
    pub fn distribution_empty(distribution: &str) -> Self {
        Self::new(
            ErrorCode::DistributionEmpty,
            "Distribution already empty, not updating",
        )
        .with_details(ErrorDetails::new().with_distribution(distribution))
    }

    /// The write-back queue stayed full past the enqueue bound.
    pub fn queue_full(distribution: &str) -> Self {
        Self::new(ErrorCode::QueueFull, "Update queue is full")
            .with_details(
                ErrorDetails::new()
                    .with_distribution(distribution)
                    .with_retry_after(1),
            )
    }

    /// The write-back queue has been closed.
    pub fn pipeline_closed() -> Self {
        Self::new(ErrorCode::PipelineClosed, "Update pipeline is shut down")
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Attach the distribution name.
    pub fn for_distribution(mut self, name: impl Into<String>) -> Self {
        self.details.distribution = Some(name.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let distribution = self.details.distribution.as_deref().unwrap_or("");

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    distribution = distribution,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    distribution = distribution,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    distribution = distribution,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    distribution = distribution,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "forget_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,

    /// User-friendly error message
    pub error: String,

    /// Machine-readable error code
    pub error_code: ErrorCode,

    /// Numeric error code
    pub numeric_code: u32,

    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&ForgetError> for ErrorResponse {
    fn from(error: &ForgetError) -> Self {
        Self {
            success: false,
            error: error.user_message.to_string(),
            error_code: error.code,
            numeric_code: error.code.numeric_code(),
            details: if error.details.is_empty() {
                None
            } else {
                Some(error.details.clone())
            },
            timestamp: chrono::Utc::now(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for ForgetError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| ForgetError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| ForgetError::new(code, e.to_string()).with_source(e))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<redis::RedisError> for ForgetError {
    fn from(error: redis::RedisError) -> Self {
        let (code, user_msg) = if error.is_connection_refusal() || error.is_connection_dropped() {
            (ErrorCode::StoreConnectionFailed, "Unable to connect to store")
        } else if error.is_timeout() {
            (ErrorCode::StoreError, "Store operation timed out")
        } else {
            (ErrorCode::StoreError, "A store error occurred")
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<deadpool_redis::PoolError> for ForgetError {
    fn from(error: deadpool_redis::PoolError) -> Self {
        Self::with_internal(
            ErrorCode::StoreConnectionFailed,
            "Unable to check out a store connection",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<deadpool_redis::CreatePoolError> for ForgetError {
    fn from(error: deadpool_redis::CreatePoolError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Invalid store configuration",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<serde_json::Error> for ForgetError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to process JSON data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<config::ConfigError> for ForgetError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration error",
            error.to_string(),
        )
        .with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
