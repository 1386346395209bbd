//! Search orchestrator: priority-ordered tool walk with a confidence gate.
//!
//! This module tries available tools one at a time in ascending priority,
//! records every attempt in the execution ledger, publishes fallback
//! transitions, and returns the first accepted result.

pub mod fallback;
pub mod query;

pub use fallback::{FallbackEngine, FallbackOutcome, rejection_error};
