//! Error type for the definition-loading pipeline.

use thiserror::Error;

/// Errors produced while loading and building a DAG definition.
///
/// Fail-fast and non-aggregating: the first error encountered aborts the
/// load and no partial `Dag` is returned alongside it.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Source file could not be opened or read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed YAML, or a fixed-shape field that could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// Semantically invalid content. The message is the user-facing text;
    /// the step-validation messages are stable and matched on by callers.
    #[error("{0}")]
    Validation(String),

    /// A substituted shell command failed to launch, exited non-zero, or
    /// timed out.
    #[error("{0}")]
    Eval(String),
}
