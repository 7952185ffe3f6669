//! Backlog Lens - INVEST evaluation and effort estimation for sprint backlogs.
//!
//! This library provides the core functionality for the `blens` CLI tool:
//! fetching work items from Azure DevOps, asking an LLM command-line tool to
//! score them, estimating effort in days, and publishing the result.

pub mod cli;
pub mod commands;
pub mod config;
pub mod evaluation;
pub mod models;
pub mod progress;
pub mod report;
pub mod storage;
pub mod tracker;
pub mod web;

/// Library-level error type for Backlog Lens operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tracker error: {0}")]
    Tracker(#[from] tracker::TrackerError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] evaluation::EvaluationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No stories could be evaluated; no snapshot was written")]
    EmptyEvaluation,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Backlog Lens operations.
pub type Result<T> = std::result::Result<T, Error>;
