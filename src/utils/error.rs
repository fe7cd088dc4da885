//! Error Handling
//!
//! Unified error types for the bot.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Bot-wide error type.
///
/// `RateLimited` and `ServiceUnavailable` are retryable and absorbed inside
/// the store client; callers outside it only ever see `StoreUnavailable` once
/// retries are exhausted.
#[derive(Error, Debug)]
pub enum BotError {
    /// A metadata row missing its thread or entity id; skipped, never repaired
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Conversation thread could not be resolved
    #[error("Thread unavailable: {0}")]
    ThreadUnavailable(String),

    /// A rating or results surface could not be fetched or restored
    #[error("Surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// Store retries exhausted; treat as a local failure
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// HTTP 429-equivalent from the store or platform (retryable)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// HTTP 5xx-equivalent or request timeout (retryable)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Could not attach interactive components to a surface
    #[error("Binding failure: {0}")]
    BindingFailure(String),

    /// Platform API error that is not retryable (permissions, bad request)
    #[error("Platform error: {0}")]
    Platform(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for bot errors
pub type BotResult<T> = Result<T, BotError>;

impl BotError {
    /// Create an invalid-metadata error
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    /// Create a thread-unavailable error
    pub fn thread_unavailable(msg: impl Into<String>) -> Self {
        Self::ThreadUnavailable(msg.into())
    }

    /// Create a surface-unavailable error
    pub fn surface_unavailable(msg: impl Into<String>) -> Self {
        Self::SurfaceUnavailable(msg.into())
    }

    /// Create a store-unavailable error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a binding-failure error
    pub fn binding_failure(msg: impl Into<String>) -> Self {
        Self::BindingFailure(msg.into())
    }

    /// Create a platform error
    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the store client should retry this error with backoff.
    ///
    /// Timeouts are mapped to `ServiceUnavailable` before reaching here, so
    /// they retry identically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::ServiceUnavailable(_))
    }
}

/// Map an HTTP status and body into the transport slice of the taxonomy.
pub fn classify_http_status(status: u16, body: &str) -> BotError {
    match status {
        429 => BotError::RateLimited(body.to_string()),
        500..=599 => BotError::ServiceUnavailable(format!("HTTP {}: {}", status, body)),
        404 => BotError::NotFound(body.to_string()),
        _ => BotError::Platform(format!("HTTP {}: {}", status, body)),
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            // Timeouts retry identically to a 5xx
            BotError::ServiceUnavailable(err.to_string())
        } else {
            BotError::Platform(err.to_string())
        }
    }
}

/// Convert BotError to a string suitable for user-facing replies
impl From<BotError> for String {
    fn from(err: BotError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BotError::invalid_metadata("row 3 missing entity_id");
        assert_eq!(err.to_string(), "Invalid metadata: row 3 missing entity_id");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BotError::RateLimited("quota".into()).is_retryable());
        assert!(BotError::ServiceUnavailable("502".into()).is_retryable());
        assert!(!BotError::StoreUnavailable("exhausted".into()).is_retryable());
        assert!(!BotError::ThreadUnavailable("gone".into()).is_retryable());
        assert!(!BotError::BindingFailure("components rejected".into()).is_retryable());
    }

    #[test]
    fn test_classify_http_status() {
        assert!(matches!(classify_http_status(429, "slow down"), BotError::RateLimited(_)));
        assert!(matches!(classify_http_status(503, "down"), BotError::ServiceUnavailable(_)));
        assert!(matches!(classify_http_status(404, "missing"), BotError::NotFound(_)));
        assert!(matches!(classify_http_status(403, "denied"), BotError::Platform(_)));
    }

    #[test]
    fn test_error_conversion() {
        let err = BotError::config("SHEET_ID not set");
        let msg: String = err.into();
        assert!(msg.contains("Configuration error"));
    }
}
