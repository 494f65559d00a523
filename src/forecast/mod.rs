//! Horizon pivot and reconciliation.
//!
//! Each origin's long-format predictions are pivoted into `step_pred_{h}`
//! columns, then folded into a single table where, for every
//! `(time_id, entity_id, horizon)` cell, the earliest anchor's value wins.

pub mod pivot;
pub mod reconcile;
pub mod types;

pub use pivot::pivot;
pub use reconcile::{MergeStats, ReconciledTable, Reconciler};
pub use types::{
    step_column_name, EvaluationRow, ForecastError, HorizonRow, PredictionEntry, WideTable,
};
