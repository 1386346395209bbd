//! Provider-independent confidence scoring.
//!
//! Every tool scores its payload with the same formula so results from
//! different fallback tiers compare fairly:
//!
//! ```text
//! confidence = 0.4 * min(result_count / 5, 1)
//!            + 0.4 * average_relevance
//!            + 0.2 * (1 if answer present else 0)
//! ```
//!
//! The sum is multiplied by a per-tool scale factor and clamped to `[0, 1]`.

use crate::types::SearchPayload;

/// Number of results at which the count factor saturates.
const SATURATING_RESULT_COUNT: f64 = 5.0;

const COUNT_WEIGHT: f64 = 0.4;
const RELEVANCE_WEIGHT: f64 = 0.4;
const ANSWER_WEIGHT: f64 = 0.2;

/// Calculate the confidence of a payload.
///
/// Returns 0.0 for a payload without hits, regardless of the answer.
/// `scale` lets a tool discount its own results (Jina uses 0.9).
pub fn calculate_confidence(payload: &SearchPayload, scale: f64) -> f64 {
    if payload.results.is_empty() {
        return 0.0;
    }

    let count = payload.results.len() as f64;
    let count_factor = (count / SATURATING_RESULT_COUNT).min(1.0) * COUNT_WEIGHT;

    let average_relevance =
        payload.results.iter().map(|r| r.score.clamp(0.0, 1.0)).sum::<f64>() / count;
    let relevance_factor = average_relevance * RELEVANCE_WEIGHT;

    let answer_factor = if payload.answer.trim().is_empty() {
        0.0
    } else {
        ANSWER_WEIGHT
    };

    ((count_factor + relevance_factor + answer_factor) * scale).clamp(0.0, 1.0)
}
