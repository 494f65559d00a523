//! Multi-horizon forecast evaluation.
//!
//! Scores every evaluation row against its target at all horizons and
//! aggregates into a single mean-of-row-MSE metric.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

use crate::data::PanelKey;
use crate::forecast::EvaluationRow;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Row {key} has no prediction for step_pred_{horizon}")]
    MissingHorizon { key: PanelKey, horizon: usize },

    #[error("Row {key} has {found} horizons, expected {expected}")]
    StepsMismatch {
        key: PanelKey,
        expected: usize,
        found: usize,
    },

    #[error("Nothing to evaluate: no rows with both predictions and targets")]
    Empty,

    #[error("Actuals were not combined with the reconciled table")]
    NotJoined,

    #[error("Invalid steps: {0} (must be >= 1)")]
    Steps(usize),
}

/// Error of a single evaluation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub key: PanelKey,
    pub target: f64,
    /// Mean over horizons of the squared error.
    pub mse: f64,
    /// Mean over horizons of the absolute error.
    pub mae: f64,
}

/// Aggregate evaluation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub steps: usize,
    pub rows: usize,
    /// Mean over rows of the per-row MSE. The headline metric.
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Standard deviation of per-row MSE (NaN with fewer than two rows).
    pub mse_std: f64,
    /// MSE at each horizon, index 0 being `step_pred_1`.
    pub horizon_mse: Vec<f64>,
    #[serde(skip)]
    pub per_row: Vec<RowError>,
}

impl EvaluationReport {
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Evaluation Summary\n\
             ==================\n\
             \n\
             Rows: {}\n\
             Steps: {}\n\
             MSE: {:.6}\n\
             RMSE: {:.6}\n\
             MAE: {:.6}\n\
             Row MSE std: {:.6}\n\
             \n\
             Per-horizon MSE:\n",
            self.rows, self.steps, self.mse, self.rmse, self.mae, self.mse_std
        );
        for (idx, mse) in self.horizon_mse.iter().enumerate() {
            out.push_str(&format!("  step_pred_{:<3} {:.6}\n", idx + 1, mse));
        }
        out
    }
}

/// Evaluator for reconciled multi-horizon predictions.
pub struct Evaluator;

impl Evaluator {
    /// Score `rows` at horizons `1..=steps`.
    ///
    /// Every row must be complete: an unset horizon means scheduling or
    /// reconciliation went wrong upstream, so it is reported, not skipped.
    pub fn evaluate(
        rows: &[EvaluationRow],
        steps: usize,
    ) -> Result<EvaluationReport, EvaluationError> {
        if steps < 1 {
            return Err(EvaluationError::Steps(steps));
        }
        if rows.is_empty() {
            return Err(EvaluationError::Empty);
        }

        let mut per_row = Vec::with_capacity(rows.len());
        let mut horizon_sse = vec![0.0; steps];

        for row in rows {
            if row.predictions.steps() != steps {
                return Err(EvaluationError::StepsMismatch {
                    key: row.key,
                    expected: steps,
                    found: row.predictions.steps(),
                });
            }

            if let Some(horizon) = row.predictions.first_missing() {
                return Err(EvaluationError::MissingHorizon {
                    key: row.key,
                    horizon,
                });
            }

            let mut sse = 0.0;
            let mut sae = 0.0;
            for (h, pred) in row.predictions.cells().iter().flatten().enumerate() {
                let err = row.target - pred;
                sse += err * err;
                sae += err.abs();
                horizon_sse[h] += err * err;
            }

            per_row.push(RowError {
                key: row.key,
                target: row.target,
                mse: sse / steps as f64,
                mae: sae / steps as f64,
            });
        }

        let n = per_row.len() as f64;
        let mse = per_row.iter().map(|r| r.mse).sum::<f64>() / n;
        let mae = per_row.iter().map(|r| r.mae).sum::<f64>() / n;
        let mse_std = per_row.iter().map(|r| r.mse).collect::<Vec<_>>().std_dev();

        Ok(EvaluationReport {
            steps,
            rows: per_row.len(),
            mse,
            rmse: mse.sqrt(),
            mae,
            mse_std,
            horizon_mse: horizon_sse.into_iter().map(|s| s / n).collect(),
            per_row,
        })
    }
}

/// Shorthand for [`Evaluator::evaluate`].
pub fn evaluate(
    rows: &[EvaluationRow],
    steps: usize,
) -> Result<EvaluationReport, EvaluationError> {
    Evaluator::evaluate(rows, steps)
}
