//! Error types for threadsync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=store, 3=not_found, 4=validation, etc.)
//! - Retryability flags used by the dispatch queue and fetch chain
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use crate::http::HttpError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for threadsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Store (exit 2)
    StoreUnavailable,
    DatabaseError,

    // Not Found (exit 3)
    NotFound,
    UnknownSource,

    // Validation (exit 4)
    ValidationError,
    InvalidArgument,

    // Remote (exit 5)
    TransportError,
    RateLimited,
    AuthError,
    StaleDispatch,

    // Sync (exit 6)
    SyncInProgress,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::UnknownSource => "UNKNOWN_SOURCE",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::AuthError => "AUTH_ERROR",
            Self::StaleDispatch => "STALE_DISPATCH",
            Self::SyncInProgress => "SYNC_IN_PROGRESS",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::StoreUnavailable | Self::DatabaseError => 2,
            Self::NotFound | Self::UnknownSource => 3,
            Self::ValidationError | Self::InvalidArgument => 4,
            Self::TransportError | Self::RateLimited | Self::AuthError | Self::StaleDispatch => 5,
            Self::SyncInProgress => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether the same request may succeed if issued again later.
    ///
    /// True for network failures and rate limiting. Authentication and
    /// validation failures cannot be fixed by retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportError | Self::RateLimited)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in threadsync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Network failure, timeout, 5xx, or an unreadable response body.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed ({status}): {message}")]
    Auth {
        status: u16,
        message: String,
        /// Service that rejected the credentials.
        service: String,
    },

    #[error("Rate limited{}", retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("A sync cycle is already running")]
    SyncInProgress,

    #[error("Dispatch expired after waiting {waited_secs}s in queue")]
    StaleDispatch { waited_secs: u64 },

    #[error("Store unavailable: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<HttpError> for Error {
    fn from(err: HttpError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl Error {
    /// Build an authentication error for `service`.
    pub fn auth(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Auth {
            status,
            message: message.into(),
            service: service.into(),
        }
    }

    /// Build a not-found error for `resource`.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::TransportError,
            Self::Auth { .. } => ErrorCode::AuthError,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::SyncInProgress => ErrorCode::SyncInProgress,
            Self::StaleDispatch { .. } => ErrorCode::StaleDispatch,
            Self::Store(_) => ErrorCode::StoreUnavailable,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::UnknownSource(_) => ErrorCode::UnknownSource,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether retrying the failed request can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.error_code().is_retryable()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Auth { service, .. } => Some(format!(
                "Re-authenticate with {service} and update its credentials in \
                 ~/.threadsync/config.json"
            )),
            Self::RateLimited { .. } => {
                Some("The remote service is throttling requests. Try again later.".to_string())
            }
            Self::SyncInProgress => Some(
                "Another sync is running. Wait for it to finish; triggers are not queued."
                    .to_string(),
            ),
            Self::StaleDispatch { .. } => Some(
                "The write queue was backed up. Run `tsync failures list` and retry the item."
                    .to_string(),
            ),
            Self::UnknownSource(_) => {
                Some("Valid sources: chatgpt, claude, perplexity".to_string())
            }
            Self::Store(_) => Some("Check that the database path is writable (--db)".to_string()),
            Self::Config(_) => Some(
                "Check ~/.threadsync/config.json or pass --config <path>".to_string(),
            ),
            Self::Transport(_)
            | Self::Validation(_)
            | Self::NotFound { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Short reason string for failure records and per-item reports.
    #[must_use]
    pub fn reason(&self) -> String {
        format!("{}: {self}", self.error_code().as_str())
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_taxonomy() {
        assert!(Error::Transport("reset".into()).is_retryable());
        assert!(Error::RateLimited { retry_after: None }.is_retryable());
        assert!(!Error::auth("notion", 401, "bad token").is_retryable());
        assert!(!Error::Validation("body.children too long".into()).is_retryable());
        assert!(!Error::not_found("/api/x").is_retryable());
    }

    #[test]
    fn test_auth_hint_mentions_reauthentication() {
        let err = Error::auth("chatgpt", 403, "forbidden");
        let hint = err.hint().unwrap();
        assert!(hint.contains("Re-authenticate with chatgpt"));
    }

    #[test]
    fn test_rate_limited_message_includes_retry_after() {
        let err = Error::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.to_string(), "Rate limited (retry after 7s)");
        assert_eq!(
            Error::RateLimited { retry_after: None }.to_string(),
            "Rate limited"
        );
    }

    #[test]
    fn test_structured_json_shape() {
        let json = Error::SyncInProgress.to_structured_json();
        assert_eq!(json["error"]["code"], "SYNC_IN_PROGRESS");
        assert_eq!(json["error"]["exit_code"], 6);
        assert_eq!(json["error"]["retryable"], false);
        assert!(json["error"]["hint"].is_string());
    }

    #[test]
    fn test_http_error_maps_to_transport() {
        let err: Error = HttpError::Transport("timed out".into()).into();
        assert_eq!(err.error_code(), ErrorCode::TransportError);
        assert!(err.reason().starts_with("TRANSPORT_ERROR: "));
    }
}
