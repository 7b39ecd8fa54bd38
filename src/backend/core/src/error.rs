//! Error handling for Lumen Core.
//!
//! This module provides:
//! - A single API error type with stable machine-readable codes
//! - HTTP status code mapping for API responses
//! - User-facing messages kept apart from internal detail
//! - Severity-based logging and error metrics
//!
//! # Usage
//!
//! ```rust,ignore
//! use lumen_core::error::{LumenError, Result};
//!
//! fn find_course(id: &str) -> Result<()> {
//!     Err(LumenError::not_found("Course not found"))
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
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::db::DbError;
use crate::middleware::auth::AuthError;
use crate::middleware::rate_limit::RateLimitError;
use crate::validation::ValidationErrors;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Lumen operations.
pub type Result<T> = std::result::Result<T, LumenError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Backend Errors (2000-2099)
    DatabaseError,
    BackendRejected,
    BackendUnavailable,

    // Serialization Errors (2200-2299)
    SerializationError,
    InvalidJson,

    // Authentication/Authorization (4000-4099)
    Unauthorized,
    Forbidden,
    InvalidCredentials,

    // Validation Errors (4100-4199)
    ValidationError,
    InvalidInput,
    AlreadyExists,

    // Resource Errors (4300-4399)
    NotFound,

    // Throttling (4400-4499)
    RateLimited,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::DatabaseError => 2000,
            Self::BackendRejected => 2001,
            Self::BackendUnavailable => 2002,

            Self::SerializationError => 2200,
            Self::InvalidJson => 2201,

            Self::Unauthorized => 4000,
            Self::Forbidden => 4001,
            Self::InvalidCredentials => 4002,

            Self::ValidationError => 4100,
            Self::InvalidInput => 4101,
            Self::AlreadyExists => 4102,

            Self::NotFound => 4300,

            Self::RateLimited => 4400,

            Self::ConfigurationError => 5000,
            Self::InvalidConfiguration => 5001,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::ValidationError
            | Self::InvalidInput
            | Self::InvalidJson
            | Self::AlreadyExists
            | Self::BackendRejected
            | Self::InvalidCredentials => StatusCode::BAD_REQUEST,

            Self::Unauthorized => StatusCode::UNAUTHORIZED,

            Self::Forbidden => StatusCode::FORBIDDEN,

            Self::NotFound => StatusCode::NOT_FOUND,

            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            Self::DatabaseError
            | Self::BackendUnavailable
            | Self::SerializationError
            | Self::ConfigurationError
            | Self::InvalidConfiguration
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            2000..=2099 => "backend",
            2200..=2299 => "serialization",
            4000..=4099 => "authentication",
            4100..=4199 => "validation",
            4300..=4399 => "resource",
            4400..=4499 => "throttling",
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
    /// User errors (bad input, missing resources)
    Low,
    /// Access and throttling outcomes
    Medium,
    /// Backend and serialization failures
    High,
    /// Unexpected internal failures
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ValidationError
            | ErrorCode::InvalidInput
            | ErrorCode::InvalidJson
            | ErrorCode::AlreadyExists
            | ErrorCode::NotFound
            | ErrorCode::BackendRejected
            | ErrorCode::InvalidCredentials => Self::Low,

            ErrorCode::Unauthorized | ErrorCode::Forbidden | ErrorCode::RateLimited => Self::Medium,

            ErrorCode::DatabaseError
            | ErrorCode::BackendUnavailable
            | ErrorCode::SerializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Field-level validation messages
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Vec<String>>,

    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,

    /// Retry information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.fields.entry(field.into()).or_default().push(message.into());
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

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.context.is_empty() && self.retry_after_secs.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The API error type for Lumen Core.
///
/// The user message is the only text that reaches clients; the internal
/// message and source are logged and never serialized.
#[derive(Error, Debug)]
pub struct LumenError {
    code: ErrorCode,
    user_message: Cow<'static, str>,
    internal_message: Option<String>,
    details: ErrorDetails,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for LumenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl LumenError {
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

    /// Create an internal error (500) that hides `message` from the client.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "Internal server error", message)
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn already_exists(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::AlreadyExists, message)
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

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
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "Unexpected failure"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Request rejected"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Client error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "lumen_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category(),
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

    pub error: ErrorInfo,
}

/// Detailed error information for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,

    pub numeric_code: u32,

    /// User-friendly error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,

    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&LumenError> for ErrorResponse {
    fn from(error: &LumenError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: if error.details.is_empty() {
                    None
                } else {
                    Some(error.details.clone())
                },
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for LumenError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<DbError> for LumenError {
    fn from(error: DbError) -> Self {
        match &error {
            // Client-class refusals carry a message meant for the caller.
            DbError::Rejected { status, message } if *status < 500 => {
                let message = message.clone();
                Self::new(ErrorCode::BackendRejected, message).with_source(error)
            }
            DbError::Rejected { .. } => Self::with_internal(
                ErrorCode::BackendUnavailable,
                "Internal server error",
                error.to_string(),
            )
            .with_source(error),
            DbError::InvalidCredentials => {
                Self::new(ErrorCode::InvalidCredentials, error.to_string()).with_source(error)
            }
            DbError::Transport(_) => Self::with_internal(
                ErrorCode::BackendUnavailable,
                "Internal server error",
                error.to_string(),
            )
            .with_source(error),
            DbError::Decode(_) => Self::with_internal(
                ErrorCode::DatabaseError,
                "Internal server error",
                error.to_string(),
            )
            .with_source(error),
        }
    }
}

impl From<AuthError> for LumenError {
    fn from(error: AuthError) -> Self {
        match &error {
            AuthError::MissingCredentials | AuthError::InvalidCredential | AuthError::ProfileNotFound => {
                Self::unauthorized("Unauthorized").with_context("reason", error.code())
            }
            AuthError::InsufficientPermissions => {
                Self::forbidden("Forbidden").with_context("reason", error.code())
            }
            // Any provider failure during authentication is a server fault.
            AuthError::Provider(_) => Self::with_internal(
                ErrorCode::InternalError,
                "Internal server error",
                error.to_string(),
            )
            .with_source(error),
        }
    }
}

impl From<RateLimitError> for LumenError {
    fn from(error: RateLimitError) -> Self {
        let RateLimitError::RateLimitExceeded {
            limit,
            remaining,
            reset_at,
            retry_after_secs,
        } = &error;
        let details = ErrorDetails::new()
            .with_retry_after(*retry_after_secs)
            .with_context("limit", limit)
            .with_context("remaining", remaining)
            .with_context("reset_at", reset_at);

        Self::new(ErrorCode::RateLimited, "Too many requests")
            .with_details(details)
            .with_source(error)
    }
}

impl From<ValidationErrors> for LumenError {
    fn from(errors: ValidationErrors) -> Self {
        let mut details = ErrorDetails::new();
        for (field, messages) in errors.fields() {
            for message in messages {
                details = details.with_field(field.clone(), message.clone());
            }
        }

        Self::new(ErrorCode::ValidationError, "Invalid request").with_details(details)
    }
}

impl From<serde_json::Error> for LumenError {
    fn from(error: serde_json::Error) -> Self {
        if error.is_syntax() || error.is_data() || error.is_eof() {
            Self::with_internal(ErrorCode::InvalidJson, "Invalid request", error.to_string())
                .with_source(error)
        } else {
            Self::with_internal(
                ErrorCode::SerializationError,
                "Failed to process JSON data",
                error.to_string(),
            )
            .with_source(error)
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for LumenError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        Self::with_internal(ErrorCode::InvalidJson, "Invalid request", rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for LumenError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        Self::with_internal(ErrorCode::InvalidInput, "Invalid request", rejection.body_text())
    }
}

impl From<config::ConfigError> for LumenError {
    fn from(error: config::ConfigError) -> Self {
        let code = match &error {
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => {
                ErrorCode::InvalidConfiguration
            }
            _ => ErrorCode::ConfigurationError,
        };

        Self::with_internal(code, "Configuration error occurred", error.to_string())
    }
}

impl From<Infallible> for LumenError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::ValidationError.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::AlreadyExists.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Unauthorized.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::RateLimited.http_status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::InternalError.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::Forbidden.category(), "authentication");
        assert_eq!(ErrorCode::ValidationError.category(), "validation");
        assert_eq!(ErrorCode::BackendRejected.category(), "backend");
        assert_eq!(ErrorCode::InternalError.category(), "internal");
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let error = LumenError::internal("connection reset by peer");
        let response = ErrorResponse::from(&error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("INTERNAL_ERROR"));
        assert!(json.contains("Internal server error"));
        assert!(!json.contains("connection reset"));
    }

    #[test]
    fn test_details_omitted_when_empty() {
        let error = LumenError::not_found("Lesson not found or access denied");
        let response = ErrorResponse::from(&error);
        assert!(response.error.details.is_none());
        assert_eq!(response.error.numeric_code, 4300);
    }

    #[test]
    fn test_validation_errors_become_field_details() {
        let mut errors = ValidationErrors::new();
        errors.add("email", "Invalid email address");
        errors.add("password", "Password must be at least 6 characters");

        let error = LumenError::from(errors);
        assert_eq!(error.code(), ErrorCode::ValidationError);
        assert_eq!(error.details().fields["email"], vec!["Invalid email address"]);
        assert_eq!(error.details().fields.len(), 2);
    }

    #[test]
    fn test_db_rejection_keeps_backend_message() {
        let error = LumenError::from(DbError::Rejected {
            status: 409,
            message: "duplicate key value".to_string(),
        });
        assert_eq!(error.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.user_message(), "duplicate key value");
    }

    #[test]
    fn test_db_server_error_is_masked() {
        let error = LumenError::from(DbError::Rejected {
            status: 503,
            message: "upstream connect error: pg host 10.0.0.5".to_string(),
        });
        assert_eq!(error.code(), ErrorCode::BackendUnavailable);
        assert_eq!(error.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.user_message(), "Internal server error");

        let json = serde_json::to_string(&ErrorResponse::from(&error)).unwrap();
        assert!(!json.contains("10.0.0.5"));
    }

    #[test]
    fn test_db_transport_failure_is_masked() {
        let error = LumenError::from(DbError::Transport("dns error".to_string()));
        assert_eq!(error.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.user_message(), "Internal server error");
        assert_eq!(error.internal_message(), Some("backend request failed: dns error"));
    }

    #[test]
    fn test_auth_error_conversion() {
        assert_eq!(LumenError::from(AuthError::MissingCredentials).code(), ErrorCode::Unauthorized);
        assert_eq!(LumenError::from(AuthError::ProfileNotFound).code(), ErrorCode::Unauthorized);
        assert_eq!(LumenError::from(AuthError::InsufficientPermissions).code(), ErrorCode::Forbidden);

        let provider = LumenError::from(AuthError::Provider(DbError::Rejected {
            status: 400,
            message: "bad filter".to_string(),
        }));
        assert_eq!(provider.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(provider.user_message(), "Internal server error");
    }

    #[test]
    fn test_rate_limit_error_conversion() {
        let error = LumenError::from(RateLimitError::RateLimitExceeded {
            limit: 5,
            remaining: 0,
            reset_at: chrono::Utc::now(),
            retry_after_secs: 42,
        });
        assert_eq!(error.code(), ErrorCode::RateLimited);
        assert_eq!(error.http_status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error.user_message(), "Too many requests");
        assert_eq!(error.details().retry_after_secs, Some(42));
        assert_eq!(error.details().context["limit"], 5);

        let json = serde_json::to_value(ErrorResponse::from(&error)).unwrap();
        assert_eq!(json["error"]["numeric_code"], 4400);
        assert_eq!(json["error"]["details"]["retry_after_secs"], 42);
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(ErrorSeverity::from_code(&ErrorCode::ValidationError), ErrorSeverity::Low);
        assert_eq!(ErrorSeverity::from_code(&ErrorCode::RateLimited), ErrorSeverity::Medium);
        assert_eq!(ErrorSeverity::from_code(&ErrorCode::DatabaseError), ErrorSeverity::High);
        assert_eq!(ErrorSeverity::from_code(&ErrorCode::InternalError), ErrorSeverity::Critical);
    }

    #[test]
    fn test_error_display() {
        let error = LumenError::with_internal(ErrorCode::DatabaseError, "Internal server error", "timeout");
        let display = format!("{}", error);
        assert!(display.contains("DatabaseError"));
        assert!(display.contains("timeout"));
    }
}
