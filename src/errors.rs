use std::ops::Range;

use thiserror::Error; // Import the `Error` derive macro from the `thiserror` crate

// Every failure the engine can surface, from compile time to view refreshes.
#[derive(Debug, Error)]
pub enum PathError {
    // Malformed expression text; raised by `compile` only.
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
        span: Range<usize>,
    },

    // A construct that is fine for reading but cannot drive structure creation.
    #[error("`{construct}` is not supported for writing")]
    UnsupportedForWriting { construct: String },

    // More than one node matched a step while writing.
    #[error("step `{step}` matches {count} nodes; add a predicate to select one for writing")]
    AmbiguousPath { step: String, count: usize },

    // Bulk deletion stopped making progress.
    #[error("deleting `{path}` made no progress ({remaining} nodes still match)")]
    InfiniteDeletionLoop { path: String, remaining: usize },

    #[error("variable `${0}` could not be resolved")]
    VariableResolution(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    // Renderer or type converter rejected a value.
    #[error("conversion error: {0}")]
    Conversion(String),

    #[error("xml error: {0}")]
    Xml(#[from] roxmltree::Error),
}

impl PathError {
    pub(crate) fn eval(msg: impl Into<String>) -> Self {
        PathError::Evaluation(msg.into())
    }

    pub(crate) fn unsupported(construct: impl Into<String>) -> Self {
        PathError::UnsupportedForWriting {
            construct: construct.into(),
        }
    }
}

// Type alias for results that use `PathError` as the error type
pub type Result<T> = std::result::Result<T, PathError>;
