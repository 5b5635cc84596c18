//! Win-probability models trained on the assembled dataset.

pub mod data;
pub mod gbt;
pub mod logistic;
pub mod metrics;

use thiserror::Error;

/// Errors shared by the model implementations.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model has not been fitted yet")]
    NotFitted,

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("training data is empty")]
    EmptyData,
}
