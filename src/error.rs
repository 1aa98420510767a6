//! Error type shared by every stage of the evaluation pipeline.
//!
//! Length mismatches between the sentence boundaries and the token sequences and unknown
//! predicted tags are *not* errors: they are recorded in the reports (see
//! [`LengthMismatch`](crate::LengthMismatch) and [`CorpusReport`](crate::CorpusReport)).

use ndarray_stats::errors::MultiInputError;
use thiserror::Error;

/// Result type used throughout `tageval`.
pub type Result<T> = std::result::Result<T, EvalError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// A boundary text, token sequence or batch without any content. Aborts the file being
    /// processed, never a whole batch.
    #[error("Received an empty input: {0}")]
    EmptyInput(String),

    /// Confusion matrices that cannot be summed, or a count grid that does not match its labels.
    #[error("Shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error(transparent)]
    Statistics(#[from] MultiInputError),

    #[error("Similarity threshold must lie between 0 and 1, received {0}")]
    InvalidThreshold(f64),

    /// A string that could not be turned into one of the option enums.
    #[error("Could not parse `{value}` into a {what}")]
    Parse { what: &'static str, value: String },
}

impl EvalError {
    pub(crate) fn empty(what: impl Into<String>) -> Self {
        EvalError::EmptyInput(what.into())
    }

    pub(crate) fn parse(what: &'static str, value: &str) -> Self {
        EvalError::Parse {
            what,
            value: String::from(value),
        }
    }
}
