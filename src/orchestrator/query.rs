//! Query preprocessing and user-facing feedback messages.

use crate::types::{ToolResult, ToolStatus};

/// Leading command phrases stripped from conversational input.
const COMMAND_PHRASES: &[&str] = &[
    "tell me about ",
    "tell me the ",
    "find information on ",
    "search for ",
    "look up ",
    "get me ",
    "what is ",
    "who is ",
];

/// Queries shorter than this after stripping fall back to the raw input.
const MIN_QUERY_CHARS: usize = 3;

/// Turn conversational input into a search query.
///
/// Lowercases, removes at most one leading command phrase and trims. If
/// less than [`MIN_QUERY_CHARS`] characters remain, the trimmed input is
/// returned unchanged.
pub fn preprocess_query(input: &str) -> String {
    let lowered = input.to_lowercase();
    let stripped = COMMAND_PHRASES
        .iter()
        .find_map(|phrase| lowered.strip_prefix(phrase))
        .unwrap_or(&lowered)
        .trim();

    if stripped.chars().count() < MIN_QUERY_CHARS {
        input.trim().to_owned()
    } else {
        stripped.to_owned()
    }
}

/// Human-readable summary of a final result.
///
/// `fell_back` must describe the same call that produced `result`.
pub fn feedback(result: &ToolResult, fell_back: bool) -> String {
    match result.status {
        ToolStatus::Success => {
            let source = result.source().unwrap_or("unknown source");
            if fell_back {
                format!(
                    "Results retrieved from {source}. The primary source was unavailable, so a fallback was used."
                )
            } else {
                format!("Results retrieved from {source}.")
            }
        }
        ToolStatus::Timeout => {
            "Request timed out. Please try again or check your connection.".to_owned()
        }
        ToolStatus::NotFound => {
            "No search tools are available. Please configure API keys.".to_owned()
        }
        ToolStatus::Failure => format!(
            "Unable to retrieve results. {}",
            result.error.as_deref().unwrap_or("All sources failed.")
        ),
    }
}
