//! Fatal pipeline errors.
//!
//! Only two conditions abort a run: an input that cannot be read and a
//! required column that is absent. Both are raised before any output file
//! is written. Data-quality problems (excluded horses, dropped rows) are
//! counted in the validation summary instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// An input file could not be opened or parsed.
    #[error("failed to read {path}: {reason}")]
    SourceRead { path: PathBuf, reason: String },

    /// An input source is missing a required column.
    #[error("{path}: missing required column '{column}'")]
    Schema { path: PathBuf, column: String },
}

impl PipelineError {
    pub fn source_read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SourceRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn schema(path: impl Into<PathBuf>, column: impl ToString) -> Self {
        Self::Schema {
            path: path.into(),
            column: column.to_string(),
        }
    }
}
