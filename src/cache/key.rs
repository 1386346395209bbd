//! Deterministic cache fingerprints.

use sha2::{Digest, Sha256};

use crate::types::SearchParams;

/// Cache key derived from a normalised query and its parameter set.
///
/// The query is trimmed and lowercased. Parameters are hashed in key order
/// (`SearchParams` is a sorted map), so insertion order never matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    fingerprint: String,
}

impl CacheKey {
    pub fn new(query: &str, params: &SearchParams) -> Self {
        let canonical = serde_json::json!({
            "query": normalise_query(query),
            "params": params,
        });
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        let fingerprint = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self { fingerprint }
    }

    /// Hex-encoded SHA-256 fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Fingerprint with a backend namespace prefix.
    pub fn prefixed(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.fingerprint)
    }
}

/// Lowercased, trimmed query used for keys and pattern matching.
pub fn normalise_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Case-insensitive substring match of `pattern` against a stored query.
pub(crate) fn matches_pattern(stored_query: &str, pattern: &str) -> bool {
    normalise_query(stored_query).contains(&normalise_query(pattern))
}
