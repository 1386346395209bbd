//! Shared HTTP client for provider APIs and the remote cache.

use std::time::Duration;

use crate::error::RouterError;

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("search-router/", env!("CARGO_PKG_VERSION"));

/// Build a [`reqwest::Client`] with the given request timeout.
///
/// # Errors
///
/// Returns [`RouterError::Http`] if the client cannot be constructed.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, RouterError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| RouterError::Http(format!("failed to build HTTP client: {e}")))
}

/// Map a transport error, keeping timeouts distinguishable.
pub(crate) fn classify_error(tool: &str, err: reqwest::Error) -> RouterError {
    if err.is_timeout() {
        RouterError::ProviderTimeout(format!("{tool} request timed out"))
    } else {
        RouterError::Http(format!("{tool} request failed: {err}"))
    }
}
