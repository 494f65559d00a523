//! Forecast evaluation metrics.
//!
//! - Mean over rows of the per-row, across-horizon MSE (headline metric)
//! - Per-horizon MSE
//! - RMSE, MAE, dispersion of row errors

pub mod evaluator;

pub use evaluator::{evaluate, EvaluationError, EvaluationReport, Evaluator, RowError};
