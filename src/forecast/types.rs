//! Prediction tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::PanelKey;

/// Column name for a horizon: `step_pred_{h}`.
pub fn step_column_name(horizon: usize) -> String {
    format!("step_pred_{}", horizon)
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("Prediction for {key} has horizon {horizon} outside [1, {steps}] (anchor {anchor})")]
    HorizonOutOfRange {
        key: PanelKey,
        anchor: i64,
        horizon: i64,
        steps: usize,
    },

    #[error("Prediction for {key} was made at anchor {found}, expected {expected}")]
    AnchorMismatch {
        key: PanelKey,
        expected: i64,
        found: i64,
    },

    #[error("Duplicate prediction for {key} at anchor {anchor}")]
    DuplicatePrediction { key: PanelKey, anchor: i64 },

    #[error("Anchor {anchor} merged after anchor {previous}; anchors must strictly increase")]
    OutOfOrder { previous: i64, anchor: i64 },

    #[error("Table has {found} horizon columns, reconciler was built for {expected}")]
    StepsMismatch { expected: usize, found: usize },
}

/// One model output in long format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionEntry {
    /// Last period the producing model was trained on.
    pub anchor: i64,
    pub key: PanelKey,
    pub value: f64,
}

impl PredictionEntry {
    pub fn new(anchor: i64, time_id: i64, entity_id: i64, value: f64) -> Self {
        Self {
            anchor,
            key: PanelKey::new(time_id, entity_id),
            value,
        }
    }

    /// Periods between the anchor and the predicted period.
    pub fn horizon(&self) -> i64 {
        self.key.time_id - self.anchor
    }
}

/// Wide table produced from one anchor's predictions.
///
/// `horizons` lists the distinct horizons observed, ascending; every row has
/// one cell per listed horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub anchor: i64,
    pub horizons: Vec<usize>,
    pub rows: BTreeMap<PanelKey, Vec<Option<f64>>>,
}

impl WideTable {
    pub fn empty(anchor: i64) -> Self {
        Self {
            anchor,
            horizons: Vec::new(),
            rows: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at `(key, horizon)`, if that column exists and the cell is set.
    pub fn get(&self, key: PanelKey, horizon: usize) -> Option<f64> {
        let col = self.horizons.iter().position(|&h| h == horizon)?;
        self.rows.get(&key).and_then(|cells| cells[col])
    }

    /// Iterate over set cells as `(key, horizon, value)`.
    pub fn cells(&self) -> impl Iterator<Item = (PanelKey, usize, f64)> + '_ {
        self.rows.iter().flat_map(move |(key, cells)| {
            self.horizons
                .iter()
                .zip(cells)
                .filter_map(move |(&h, cell)| cell.map(|v| (*key, h, v)))
        })
    }
}

/// Fixed-width row of horizon cells, `step_pred_1..=step_pred_steps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonRow {
    cells: Vec<Option<f64>>,
}

impl HorizonRow {
    pub fn unset(steps: usize) -> Self {
        Self {
            cells: vec![None; steps],
        }
    }

    pub fn from_cells(cells: Vec<Option<f64>>) -> Self {
        Self { cells }
    }

    pub fn steps(&self) -> usize {
        self.cells.len()
    }

    /// Value at 1-based `horizon`.
    pub fn get(&self, horizon: usize) -> Option<f64> {
        horizon
            .checked_sub(1)
            .and_then(|idx| self.cells.get(idx))
            .copied()
            .flatten()
    }

    /// Set the cell if it is still unset. Returns whether it was written.
    pub fn fill(&mut self, horizon: usize, value: f64) -> bool {
        match horizon.checked_sub(1).and_then(|idx| self.cells.get_mut(idx)) {
            Some(cell) if cell.is_none() => {
                *cell = Some(value);
                true
            }
            _ => false,
        }
    }

    pub fn cells(&self) -> &[Option<f64>] {
        &self.cells
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// First unset horizon (1-based).
    pub fn first_missing(&self) -> Option<usize> {
        self.cells.iter().position(Option::is_none).map(|idx| idx + 1)
    }
}

/// Ground truth joined with reconciled predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub key: PanelKey,
    pub target: f64,
    pub predictions: HorizonRow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_column_name() {
        assert_eq!(step_column_name(1), "step_pred_1");
        assert_eq!(step_column_name(36), "step_pred_36");
    }

    #[test]
    fn test_entry_horizon() {
        let entry = PredictionEntry::new(5, 7, 1, 0.3);
        assert_eq!(entry.horizon(), 2);
    }

    #[test]
    fn test_horizon_row_fill_once() {
        let mut row = HorizonRow::unset(3);
        assert!(row.fill(2, 1.5));
        assert!(!row.fill(2, 9.0));
        assert_eq!(row.get(2), Some(1.5));
        assert_eq!(row.get(1), None);
        assert_eq!(row.first_missing(), Some(1));
        assert!(!row.is_complete());
    }

    #[test]
    fn test_horizon_row_out_of_bounds() {
        let mut row = HorizonRow::unset(2);
        assert!(!row.fill(0, 1.0));
        assert!(!row.fill(3, 1.0));
        assert_eq!(row.get(0), None);
        assert_eq!(row.get(3), None);
    }
}
