//! Error taxonomy surfaced to the CLI.
//!
//! Lower-level helpers return `anyhow::Result` with context attached; the
//! stage that calls them classifies the failure into one [`MergeError`]
//! variant. Every variant is terminal for the invocation.

use thiserror::Error;

use crate::exit_codes;

/// Convenient alias for results returned by merge stages.
pub type Result<T> = std::result::Result<T, MergeError>;

#[derive(Debug, Error)]
pub enum MergeError {
    /// Configuration file missing, malformed, or inconsistent.
    #[error("config error: {0:#}")]
    Config(anyhow::Error),

    /// Query execution failed (network failure or store error response).
    #[error("query error: {0:#}")]
    Query(anyhow::Error),

    /// Template or column expression evaluation failed.
    #[error("render error: {0:#}")]
    Render(anyhow::Error),

    /// A write-back key matched several rows of the target table.
    #[error("ambiguous key error: {column}={key} matches {matches} rows in table {table}")]
    AmbiguousKey {
        table: String,
        column: String,
        key: String,
        matches: usize,
    },

    /// Two source rows produced the same write-back key.
    #[error(
        "duplicate key error: rows {first_row} and {row} both have {column}={key} for table {table}"
    )]
    DuplicateKey {
        table: String,
        column: String,
        key: String,
        first_row: usize,
        row: usize,
    },

    /// An insert or update was rejected. Entries applied before it stay applied.
    #[error("write error: {action} of key {key} in table {table} failed: {cause:#}")]
    Write {
        table: String,
        key: String,
        action: &'static str,
        cause: anyhow::Error,
    },

    /// Rendered output could not be written to its destination.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

impl MergeError {
    pub fn config(err: impl Into<anyhow::Error>) -> Self {
        Self::Config(err.into())
    }

    pub fn query(err: impl Into<anyhow::Error>) -> Self {
        Self::Query(err.into())
    }

    pub fn render(err: impl Into<anyhow::Error>) -> Self {
        Self::Render(err.into())
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => exit_codes::CONFIG,
            Self::Query(_) => exit_codes::QUERY,
            Self::Render(_) => exit_codes::RENDER,
            Self::AmbiguousKey { .. } | Self::DuplicateKey { .. } => exit_codes::AMBIGUOUS_KEY,
            Self::Write { .. } => exit_codes::WRITE,
            Self::Output(_) => exit_codes::FAILURE,
        }
    }
}
