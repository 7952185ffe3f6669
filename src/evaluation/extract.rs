//! Locate and decode the JSON array of evaluation records in LLM output.
//!
//! The model is asked to answer with a bare JSON array, but in practice it
//! wraps the answer in prose and often in a fenced code block. Extraction
//! tries, in order:
//!
//! 1. A ```` ```json ```` fence whose body is an array
//! 2. The first (shortest) `[ { ... } ]` region anywhere in the text
//!
//! Whatever is found must be valid JSON. Nothing beyond JSON syntax is
//! checked: record fields with missing or unexpected values are read
//! leniently (see [`EvaluationRecord`]) and array elements that are not
//! objects are skipped.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

use crate::models::EvaluationRecord;

static FENCED_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(\[.*?\])\s*```").expect("Invalid regex"));

static BARE_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\s*\{.*?\}\s*\]").expect("Invalid regex"));

/// Errors that can occur while extracting records from raw text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Neither a fenced nor a bare JSON array was found
    #[error("no JSON array located in response")]
    Parse,

    /// A candidate was found but is not a valid JSON array
    #[error("failed to decode JSON array: {message}")]
    Decode {
        /// Decoder diagnostic
        message: String,
        /// The text that failed to decode
        candidate: String,
    },
}

impl ExtractError {
    /// The candidate text that failed to decode, if any.
    pub fn candidate(&self) -> Option<&str> {
        match self {
            ExtractError::Parse => None,
            ExtractError::Decode { candidate, .. } => Some(candidate),
        }
    }
}

/// Find the JSON array payload in `raw_text` without decoding it.
pub fn locate_json_array(raw_text: &str) -> Option<&str> {
    if let Some(captures) = FENCED_ARRAY.captures(raw_text) {
        return captures.get(1).map(|m| m.as_str().trim());
    }
    BARE_ARRAY.find(raw_text).map(|m| m.as_str())
}

/// Extract evaluation records from free-form tool output.
pub fn extract_records(raw_text: &str) -> Result<Vec<EvaluationRecord>, ExtractError> {
    let candidate = locate_json_array(raw_text).ok_or(ExtractError::Parse)?;

    let elements: Vec<Value> =
        serde_json::from_str(candidate).map_err(|e| ExtractError::Decode {
            message: e.to_string(),
            candidate: candidate.to_string(),
        })?;

    Ok(elements
        .into_iter()
        .enumerate()
        .filter_map(|(index, element)| {
            if !element.is_object() {
                tracing::warn!(index, %element, "skipping non-object evaluation entry");
                return None;
            }
            match serde_json::from_value(element) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping unreadable evaluation entry");
                    None
                }
            }
        })
        .collect())
}
