//! # Error Handling
//!
//! Gateway-wide error type built with `thiserror`. Every handler returns
//! `GatewayResult<T>`; the `IntoResponse` impl turns the error into a JSON
//! body with the right status code so handlers can use `?` freely.
//!
//! Internal failures (database, serialization, configuration) are logged
//! with their detail but answered with a generic message, so backend error
//! text never reaches API callers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Missing, malformed or expired bearer token
    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    /// Authenticated caller whose role does not grant the route
    #[error("Authorization failed: {reason}")]
    Authorization { reason: String },

    /// Malformed query string or body
    #[error("Request validation failed: {field} - {reason}")]
    RequestValidation { field: String, reason: String },

    /// Well-formed input that cannot be processed (e.g. inverted date range)
    #[error("Unprocessable request: {reason}")]
    Unprocessable { reason: String },

    /// Single-row lookup or mutation that matched nothing
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Write that collides with an existing row
    #[error("Conflict: {reason}")]
    Conflict { reason: String },

    /// Backing store did not answer within the per-call deadline
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Backing store unreachable
    #[error("Service unavailable: {service} - {reason}")]
    ServiceUnavailable { service: String, reason: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (file operations, sockets)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// JWT token validation errors
    #[error("JWT error: {message}")]
    Jwt { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an authentication error with a custom reason
    pub fn auth<S: Into<String>>(reason: S) -> Self {
        Self::Authentication {
            reason: reason.into(),
        }
    }

    /// Create an authorization error with a custom reason
    pub fn authz<S: Into<String>>(reason: S) -> Self {
        Self::Authorization {
            reason: reason.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a validation error for a specific query parameter or body field
    pub fn invalid_field<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::RequestValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::invalid_field("general", message)
    }

    pub fn unprocessable<S: Into<String>>(reason: S) -> Self {
        Self::Unprocessable {
            reason: reason.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::Jwt { .. } => StatusCode::UNAUTHORIZED,
            Self::Authorization { .. } => StatusCode::FORBIDDEN,
            Self::RequestValidation { .. } => StatusCode::BAD_REQUEST,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::Authentication { .. } => "authentication_error",
            Self::Authorization { .. } => "authorization_error",
            Self::RequestValidation { .. } => "request_validation_error",
            Self::Unprocessable { .. } => "unprocessable_entity",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Timeout { .. } => "timeout",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
            Self::Jwt { .. } => "jwt_error",
        }
    }

    /// Message safe to show to API callers.
    ///
    /// Client errors carry their own explanation; server-side failures are
    /// collapsed into a generic sentence.
    pub fn public_message(&self) -> String {
        match self {
            Self::Authentication { .. } | Self::Jwt { .. } => "unauthorized".to_string(),
            Self::Authorization { .. } => "forbidden".to_string(),
            Self::NotFound { .. } => "not found".to_string(),
            Self::RequestValidation { .. }
            | Self::Json { .. }
            | Self::Unprocessable { .. }
            | Self::Conflict { .. } => self.to_string(),
            Self::Timeout { .. } => "the request timed out".to_string(),
            Self::ServiceUnavailable { .. } => "the service is temporarily unavailable".to_string(),
            _ => "the server encountered a problem".to_string(),
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for GatewayError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Jwt {
            message: err.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.public_message(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}

/// Convenience macro for creating internal errors
///
/// Usage: `internal_error!("Failed to encode payload: {}", err)`
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::core::error::GatewayError::internal(format!($($arg)*))
    };
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("Invalid port: {}", port)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::GatewayError::config(format!($($arg)*))
    };
}
