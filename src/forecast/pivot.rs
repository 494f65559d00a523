//! Long-to-wide horizon pivot.

use std::collections::{BTreeMap, BTreeSet};

use super::types::{ForecastError, PredictionEntry, WideTable};

/// Reshape one anchor's long-format predictions into `step_pred_{h}` columns.
///
/// Every entry must carry `anchor` and satisfy `1 <= time_id - anchor <= steps`,
/// and each key may appear once. Violations are model adapter bugs and are
/// reported rather than repaired. Absent horizons stay absent.
pub fn pivot(
    anchor: i64,
    steps: usize,
    entries: &[PredictionEntry],
) -> Result<WideTable, ForecastError> {
    let mut by_key: BTreeMap<_, (usize, f64)> = BTreeMap::new();
    let mut horizons = BTreeSet::new();

    for entry in entries {
        if entry.anchor != anchor {
            return Err(ForecastError::AnchorMismatch {
                key: entry.key,
                expected: anchor,
                found: entry.anchor,
            });
        }

        let h = entry.horizon();
        if h < 1 || h > steps as i64 {
            return Err(ForecastError::HorizonOutOfRange {
                key: entry.key,
                anchor,
                horizon: h,
                steps,
            });
        }
        let h = h as usize;

        if by_key.insert(entry.key, (h, entry.value)).is_some() {
            return Err(ForecastError::DuplicatePrediction {
                key: entry.key,
                anchor,
            });
        }
        horizons.insert(h);
    }

    let horizons: Vec<usize> = horizons.into_iter().collect();
    let rows = by_key
        .into_iter()
        .map(|(key, (h, value))| {
            let cells = horizons
                .iter()
                .map(|&col| (col == h).then_some(value))
                .collect();
            (key, cells)
        })
        .collect();

    Ok(WideTable {
        anchor,
        horizons,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PanelKey;
    use proptest::prelude::*;

    #[test]
    fn test_pivot_two_horizons() {
        let entries = vec![
            PredictionEntry::new(5, 6, 1, 0.1),
            PredictionEntry::new(5, 7, 1, 0.2),
            PredictionEntry::new(5, 6, 2, 1.1),
            PredictionEntry::new(5, 7, 2, 1.2),
        ];
        let wide = pivot(5, 3, &entries).unwrap();

        assert_eq!(wide.horizons, vec![1, 2]);
        assert_eq!(wide.len(), 4);
        assert_eq!(wide.get(PanelKey::new(6, 1), 1), Some(0.1));
        assert_eq!(wide.get(PanelKey::new(6, 1), 2), None);
        assert_eq!(wide.get(PanelKey::new(7, 2), 2), Some(1.2));
        // No step_pred_3 column: nothing was predicted that far out.
        assert_eq!(wide.get(PanelKey::new(7, 2), 3), None);
        assert_eq!(wide.cells().count(), 4);
    }

    #[test]
    fn test_pivot_empty() {
        let wide = pivot(3, 2, &[]).unwrap();
        assert!(wide.is_empty());
        assert!(wide.horizons.is_empty());
    }

    #[test]
    fn test_horizon_zero_rejected() {
        let err = pivot(5, 3, &[PredictionEntry::new(5, 5, 1, 0.0)]).unwrap_err();
        assert!(matches!(err, ForecastError::HorizonOutOfRange { horizon: 0, .. }));
    }

    #[test]
    fn test_horizon_beyond_steps_rejected() {
        let err = pivot(5, 2, &[PredictionEntry::new(5, 8, 1, 0.0)]).unwrap_err();
        assert!(matches!(err, ForecastError::HorizonOutOfRange { horizon: 3, steps: 2, .. }));
    }

    #[test]
    fn test_duplicate_rejected() {
        let entries = vec![
            PredictionEntry::new(5, 6, 1, 0.1),
            PredictionEntry::new(5, 6, 1, 0.2),
        ];
        let err = pivot(5, 2, &entries).unwrap_err();
        assert!(matches!(err, ForecastError::DuplicatePrediction { anchor: 5, .. }));
    }

    #[test]
    fn test_foreign_anchor_rejected() {
        let err = pivot(5, 2, &[PredictionEntry::new(4, 6, 1, 0.1)]).unwrap_err();
        assert!(matches!(err, ForecastError::AnchorMismatch { expected: 5, found: 4, .. }));
    }

    proptest! {
        #[test]
        fn pivot_is_idempotent(
            anchor in -20i64..20,
            steps in 1usize..8,
            cells in prop::collection::btree_map((1usize..8, 0i64..5), -10.0f64..10.0, 0..30),
        ) {
            let entries: Vec<PredictionEntry> = cells
                .iter()
                .filter(|((h, _), _)| *h <= steps)
                .map(|(&(h, e), &v)| PredictionEntry::new(anchor, anchor + h as i64, e, v))
                .collect();

            let first = pivot(anchor, steps, &entries).unwrap();
            let second = pivot(anchor, steps, &entries).unwrap();
            prop_assert_eq!(&first, &second);

            for (key, h, _) in first.cells() {
                prop_assert!(h >= 1 && h <= steps);
                prop_assert_eq!(key.time_id - anchor, h as i64);
            }
            prop_assert_eq!(first.cells().count(), entries.len());
        }
    }
}
