//! Cell-level reconciliation of overlapping forecasts.
//!
//! The same (time_id, entity_id) is predicted by up to `steps` anchors, once
//! per horizon. Each `(key, horizon)` cell keeps the value from the first
//! anchor that wrote it; later anchors only fill cells that are still unset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::{PanelKey, PanelSlice};

use super::types::{EvaluationRow, ForecastError, HorizonRow, WideTable};

/// Outcome of merging one wide table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Cells that were unset and took the incoming value.
    pub filled: usize,
    /// Cells that were already set and kept their value.
    pub kept: usize,
    /// Rows seen for the first time.
    pub new_rows: usize,
}

/// Running reconciled table, fed wide tables in increasing anchor order.
#[derive(Debug, Clone)]
pub struct Reconciler {
    steps: usize,
    last_anchor: Option<i64>,
    rows: BTreeMap<PanelKey, HorizonRow>,
}

impl Reconciler {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            last_anchor: None,
            rows: BTreeMap::new(),
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Fold one anchor's wide table into the running table.
    pub fn merge(&mut self, table: &WideTable) -> Result<MergeStats, ForecastError> {
        if let Some(previous) = self.last_anchor {
            if table.anchor <= previous {
                return Err(ForecastError::OutOfOrder {
                    previous,
                    anchor: table.anchor,
                });
            }
        }
        if let Some(&widest) = table.horizons.last() {
            if widest > self.steps {
                return Err(ForecastError::StepsMismatch {
                    expected: self.steps,
                    found: widest,
                });
            }
        }

        let mut stats = MergeStats::default();
        for (key, h, value) in table.cells() {
            let steps = self.steps;
            let row = self.rows.entry(key).or_insert_with(|| {
                stats.new_rows += 1;
                HorizonRow::unset(steps)
            });
            if row.fill(h, value) {
                stats.filled += 1;
            } else {
                stats.kept += 1;
            }
        }

        self.last_anchor = Some(table.anchor);
        Ok(stats)
    }

    /// Merge a sequence of tables in order, returning the summed stats.
    pub fn merge_all<'a, I>(&mut self, tables: I) -> Result<MergeStats, ForecastError>
    where
        I: IntoIterator<Item = &'a WideTable>,
    {
        let mut total = MergeStats::default();
        for table in tables {
            let stats = self.merge(table)?;
            total.filled += stats.filled;
            total.kept += stats.kept;
            total.new_rows += stats.new_rows;
        }
        Ok(total)
    }

    pub fn finish(self) -> ReconciledTable {
        ReconciledTable {
            steps: self.steps,
            rows: self.rows,
        }
    }
}

/// Final `(time_id, entity_id) -> step_pred_1..steps` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledTable {
    steps: usize,
    rows: BTreeMap<PanelKey, HorizonRow>,
}

impl ReconciledTable {
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn rows(&self) -> &BTreeMap<PanelKey, HorizonRow> {
        &self.rows
    }

    pub fn get(&self, key: PanelKey) -> Option<&HorizonRow> {
        self.rows.get(&key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of set cells per horizon, index 0 being `step_pred_1`.
    pub fn coverage(&self) -> Vec<usize> {
        let mut counts = vec![0; self.steps];
        for row in self.rows.values() {
            for (count, cell) in counts.iter_mut().zip(row.cells()) {
                if cell.is_some() {
                    *count += 1;
                }
            }
        }
        counts
    }

    /// Inner join with the target column of `actuals`.
    ///
    /// Rows outside the slice or without a target (future periods,
    /// unobserved entities) are dropped.
    pub fn combine_actuals(&self, actuals: &PanelSlice<'_>) -> Vec<EvaluationRow> {
        self.rows
            .range(PanelKey::new(actuals.range().start, i64::MIN)..)
            .take_while(|(key, _)| key.time_id < actuals.range().end)
            .filter_map(|(key, predictions)| {
                actuals.target(*key).map(|target| EvaluationRow {
                    key: *key,
                    target,
                    predictions: predictions.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PanelColumns, PanelDataset, PanelRow};
    use crate::forecast::pivot::pivot;
    use crate::forecast::PredictionEntry;
    use crate::walkforward::TimeRange;
    use proptest::prelude::*;

    #[test]
    fn test_reconcile_at_cell_granularity() {
        // steps = 2. Anchor 5 predicts t=6 (h1) and t=7 (h2); anchor 6 predicts
        // t=7 (h1) and t=8 (h2).
        let a5 = pivot(
            5,
            2,
            &[
                PredictionEntry::new(5, 6, 1, 61.0),
                PredictionEntry::new(5, 7, 1, 72.0),
                PredictionEntry::new(5, 6, 2, 610.0),
                PredictionEntry::new(5, 7, 2, 720.0),
            ],
        )
        .unwrap();
        let a6 = pivot(
            6,
            2,
            &[
                PredictionEntry::new(6, 7, 1, 71.0),
                PredictionEntry::new(6, 8, 1, 82.0),
                PredictionEntry::new(6, 7, 2, 710.0),
                PredictionEntry::new(6, 8, 2, 820.0),
            ],
        )
        .unwrap();

        let mut reconciler = Reconciler::new(2);
        reconciler.merge(&a5).unwrap();
        reconciler.merge(&a6).unwrap();
        let table = reconciler.finish();

        let row = table.get(PanelKey::new(7, 1)).unwrap();
        assert_eq!(row.get(2), Some(72.0));
        assert_eq!(row.get(1), Some(71.0));
        assert!(row.is_complete());

        let early = table.get(PanelKey::new(6, 1)).unwrap();
        assert_eq!(early.get(1), Some(61.0));
        assert_eq!(early.get(2), None);
        assert_eq!(table.coverage(), vec![4, 4]);
    }

    #[test]
    fn test_first_writer_wins() {
        let first = WideTable {
            anchor: 3,
            horizons: vec![2],
            rows: [(PanelKey::new(5, 1), vec![Some(1.0)])].into_iter().collect(),
        };
        let second = WideTable {
            anchor: 4,
            horizons: vec![2],
            rows: [(PanelKey::new(5, 1), vec![Some(2.0)])].into_iter().collect(),
        };

        let mut reconciler = Reconciler::new(3);
        let s1 = reconciler.merge(&first).unwrap();
        let s2 = reconciler.merge(&second).unwrap();

        assert_eq!(s1, MergeStats { filled: 1, kept: 0, new_rows: 1 });
        assert_eq!(s2, MergeStats { filled: 0, kept: 1, new_rows: 0 });
        assert_eq!(reconciler.finish().get(PanelKey::new(5, 1)).unwrap().get(2), Some(1.0));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut reconciler = Reconciler::new(2);
        reconciler.merge(&WideTable::empty(5)).unwrap();
        let err = reconciler.merge(&WideTable::empty(5)).unwrap_err();
        assert_eq!(err, ForecastError::OutOfOrder { previous: 5, anchor: 5 });
        let err = reconciler.merge(&WideTable::empty(2)).unwrap_err();
        assert_eq!(err, ForecastError::OutOfOrder { previous: 5, anchor: 2 });
    }

    #[test]
    fn test_wider_table_rejected() {
        let table = WideTable {
            anchor: 1,
            horizons: vec![3],
            rows: BTreeMap::new(),
        };
        let err = Reconciler::new(2).merge(&table).unwrap_err();
        assert_eq!(err, ForecastError::StepsMismatch { expected: 2, found: 3 });
    }

    #[test]
    fn test_combine_actuals_drops_missing_targets() {
        let columns = PanelColumns {
            time: "t".to_string(),
            entity: "e".to_string(),
            target: "y".to_string(),
            features: vec![],
        };
        let dataset = PanelDataset::new(
            columns,
            vec![PanelRow::new(6, 1, Some(1.0)), PanelRow::new(7, 1, None)],
        )
        .unwrap();

        let table = pivot(
            5,
            3,
            &[
                PredictionEntry::new(5, 6, 1, 0.9),
                PredictionEntry::new(5, 7, 1, 0.8),
                PredictionEntry::new(5, 8, 1, 0.7),
            ],
        )
        .unwrap();
        let mut reconciler = Reconciler::new(3);
        reconciler.merge(&table).unwrap();

        let table = reconciler.finish();
        let rows = table.combine_actuals(&dataset.slice(TimeRange::new(0, 100)));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, PanelKey::new(6, 1));
        assert_eq!(rows[0].target, 1.0);
        assert_eq!(rows[0].predictions.get(1), Some(0.9));

        // Restricting the actuals restricts the join.
        assert!(table.combine_actuals(&dataset.slice(TimeRange::new(7, 9))).is_empty());
    }

    fn tables_strategy() -> impl Strategy<Value = Vec<WideTable>> {
        let steps = 3usize;
        prop::collection::vec(
            prop::collection::vec((0i64..3, -5.0f64..5.0), steps),
            1..8,
        )
        .prop_map(move |batches| {
            batches
                .into_iter()
                .enumerate()
                .map(|(i, values)| {
                    let anchor = i as i64;
                    let entries: Vec<PredictionEntry> = values
                        .into_iter()
                        .enumerate()
                        .map(|(h, (entity, v))| {
                            PredictionEntry::new(anchor, anchor + h as i64 + 1, entity, v)
                        })
                        .collect();
                    pivot(anchor, steps, &entries).unwrap()
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_result(tables in tables_strategy(), split in 0usize..8) {
            let mut whole = Reconciler::new(3);
            whole.merge_all(&tables).unwrap();

            let split = split.min(tables.len());
            let mut chunked = Reconciler::new(3);
            chunked.merge_all(&tables[..split]).unwrap();
            chunked.merge_all(&tables[split..]).unwrap();

            prop_assert_eq!(whole.finish(), chunked.finish());
        }

        #[test]
        fn earliest_anchor_value_survives(tables in tables_strategy()) {
            let mut reconciler = Reconciler::new(3);
            reconciler.merge_all(&tables).unwrap();
            let result = reconciler.finish();

            for (key, row) in result.rows() {
                for h in 1..=3 {
                    let earliest = tables
                        .iter()
                        .find_map(|t| t.get(*key, h));
                    prop_assert_eq!(row.get(h), earliest);
                }
            }
        }
    }
}
