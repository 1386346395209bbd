//! Error types for the search-router crate.
//!
//! All errors use stable string messages suitable for display to callers.
//! No API keys or other credentials appear in error messages.

/// Errors that can occur while routing a search request.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A provider reported a failure (HTTP status, malformed body, ...).
    #[error("provider failure: {0}")]
    ProviderFailure(String),

    /// A provider did not answer before its deadline.
    #[error("provider timed out: {0}")]
    ProviderTimeout(String),

    /// No registered tool is currently available.
    #[error("no available tools: {0}")]
    NoAvailableTools(String),

    /// A provider answered, but the result was rejected by the confidence gate.
    #[error("low confidence result: {0}")]
    LowConfidence(String),

    /// The client exceeded one of its rate-limit windows.
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// The serialized request exceeds the configured maximum size.
    #[error("request too large: {0}")]
    RequestTooLarge(String),

    /// The cache backend cannot be reached. Never surfaced to callers of the gateway.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// No tool with the given name is registered.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// An HTTP request could not be built or sent.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A response body could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RouterError {
    /// Returns true for errors that are rejected before any provider is called.
    pub fn is_admission_rejection(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::RequestTooLarge(_))
    }
}

/// Convenience type alias for search-router results.
pub type Result<T> = std::result::Result<T, RouterError>;
