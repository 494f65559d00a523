//! Per-entity baseline models.
//!
//! Each baseline reduces an entity's observed target history to a small
//! summary during fit (in parallel across entities) and extrapolates it
//! over the horizon during predict.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::PanelSlice;
use crate::forecast::PredictionEntry;

use super::{ForecastModel, ModelError};

/// Baseline selection, as written in the run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    LastValue,
    EntityMean {
        /// Trailing number of periods to average over. All history when unset.
        #[serde(default)]
        window: Option<usize>,
    },
    Drift,
}

impl Default for ModelKind {
    fn default() -> Self {
        Self::LastValue
    }
}

impl ModelKind {
    /// Build an untrained model.
    pub fn build(&self) -> Baseline {
        match self {
            Self::LastValue => Baseline::LastValue(LastValue::default()),
            Self::EntityMean { window } => Baseline::EntityMean(EntityMean::new(*window)),
            Self::Drift => Baseline::Drift(Drift::default()),
        }
    }
}

/// Observed `(time_id, target)` pairs per entity, ascending in time.
type Histories = BTreeMap<i64, Vec<(i64, f64)>>;

/// Group observed targets by entity. Fails when nothing is observed.
fn entity_histories(train: &PanelSlice<'_>) -> Result<(i64, Histories), ModelError> {
    let anchor = train.range().last().filter(|_| !train.is_empty()).ok_or_else(|| {
        ModelError::Fit(format!(
            "empty training slice [{}, {})",
            train.range().start,
            train.range().end
        ))
    })?;

    let mut histories = Histories::new();
    for row in train.rows() {
        if let Some(y) = row.target {
            histories.entry(row.entity_id()).or_default().push((row.time_id(), y));
        }
    }

    if histories.is_empty() {
        return Err(ModelError::Fit(format!(
            "no observed '{}' values before {}",
            train.columns().target,
            train.range().end
        )));
    }
    Ok((anchor, histories))
}

/// Produce one entry per feature row within `max_horizon` of `anchor`,
/// skipping entities without a fitted summary.
fn extrapolate<S, F>(
    anchor: Option<i64>,
    summaries: &BTreeMap<i64, S>,
    max_horizon: usize,
    features: &PanelSlice<'_>,
    value: F,
) -> Result<Vec<PredictionEntry>, ModelError>
where
    F: Fn(&S, i64) -> f64,
{
    let anchor =
        anchor.ok_or_else(|| ModelError::Predict("model has not been fitted".to_string()))?;

    let mut skipped = 0usize;
    let entries: Vec<PredictionEntry> = features
        .rows()
        .iter()
        .filter_map(|row| {
            let h = row.time_id() - anchor;
            if h < 1 || h > max_horizon as i64 {
                return None;
            }
            match summaries.get(&row.entity_id()) {
                Some(summary) => Some(PredictionEntry::new(
                    anchor,
                    row.time_id(),
                    row.entity_id(),
                    value(summary, h),
                )),
                None => {
                    skipped += 1;
                    None
                }
            }
        })
        .collect();

    if skipped > 0 {
        debug!(anchor, skipped, "Skipped rows for entities unseen during fit");
    }
    Ok(entries)
}

/// Either baseline, selected at runtime.
#[derive(Debug, Clone)]
pub enum Baseline {
    LastValue(LastValue),
    EntityMean(EntityMean),
    Drift(Drift),
}

impl ForecastModel for Baseline {
    fn name(&self) -> &str {
        match self {
            Self::LastValue(m) => m.name(),
            Self::EntityMean(m) => m.name(),
            Self::Drift(m) => m.name(),
        }
    }

    fn fit(&mut self, train: &PanelSlice<'_>) -> Result<(), ModelError> {
        match self {
            Self::LastValue(m) => m.fit(train),
            Self::EntityMean(m) => m.fit(train),
            Self::Drift(m) => m.fit(train),
        }
    }

    fn predict(
        &self,
        max_horizon: usize,
        features: &PanelSlice<'_>,
    ) -> Result<Vec<PredictionEntry>, ModelError> {
        match self {
            Self::LastValue(m) => m.predict(max_horizon, features),
            Self::EntityMean(m) => m.predict(max_horizon, features),
            Self::Drift(m) => m.predict(max_horizon, features),
        }
    }
}

/// Naive forecast: the entity's last observed target at every horizon.
#[derive(Debug, Clone, Default)]
pub struct LastValue {
    anchor: Option<i64>,
    last: BTreeMap<i64, f64>,
}

impl ForecastModel for LastValue {
    fn name(&self) -> &str {
        "last_value"
    }

    fn fit(&mut self, train: &PanelSlice<'_>) -> Result<(), ModelError> {
        let (anchor, histories) = entity_histories(train)?;
        self.last = histories
            .into_par_iter()
            .filter_map(|(entity, history)| history.last().map(|&(_, y)| (entity, y)))
            .collect();
        self.anchor = Some(anchor);
        Ok(())
    }

    fn predict(
        &self,
        max_horizon: usize,
        features: &PanelSlice<'_>,
    ) -> Result<Vec<PredictionEntry>, ModelError> {
        extrapolate(self.anchor, &self.last, max_horizon, features, |&y, _| y)
    }
}

/// Entity mean over all history, or over a trailing window of periods.
#[derive(Debug, Clone, Default)]
pub struct EntityMean {
    window: Option<usize>,
    anchor: Option<i64>,
    means: BTreeMap<i64, f64>,
}

impl EntityMean {
    pub fn new(window: Option<usize>) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }
}

impl ForecastModel for EntityMean {
    fn name(&self) -> &str {
        "entity_mean"
    }

    fn fit(&mut self, train: &PanelSlice<'_>) -> Result<(), ModelError> {
        if self.window == Some(0) {
            return Err(ModelError::Fit("entity_mean window must be >= 1".to_string()));
        }
        let (anchor, histories) = entity_histories(train)?;
        let cutoff = self
            .window
            .map(|w| anchor - w as i64)
            .unwrap_or(i64::MIN);

        self.means = histories
            .into_par_iter()
            .filter_map(|(entity, history)| {
                let recent: Vec<f64> = history
                    .iter()
                    .filter(|(t, _)| *t > cutoff)
                    .map(|&(_, y)| y)
                    .collect();
                (!recent.is_empty())
                    .then(|| (entity, recent.iter().sum::<f64>() / recent.len() as f64))
            })
            .collect();
        self.anchor = Some(anchor);
        Ok(())
    }

    fn predict(
        &self,
        max_horizon: usize,
        features: &PanelSlice<'_>,
    ) -> Result<Vec<PredictionEntry>, ModelError> {
        extrapolate(self.anchor, &self.means, max_horizon, features, |&m, _| m)
    }
}

#[derive(Debug, Clone, Copy)]
struct DriftFit {
    last_time: i64,
    last_value: f64,
    slope: f64,
}

/// Random walk with drift: last value plus the average per-period change.
#[derive(Debug, Clone, Default)]
pub struct Drift {
    anchor: Option<i64>,
    fits: BTreeMap<i64, DriftFit>,
}

impl ForecastModel for Drift {
    fn name(&self) -> &str {
        "drift"
    }

    fn fit(&mut self, train: &PanelSlice<'_>) -> Result<(), ModelError> {
        let (anchor, histories) = entity_histories(train)?;
        self.fits = histories
            .into_par_iter()
            .filter_map(|(entity, history)| {
                let &(first_time, first_value) = history.first()?;
                let &(last_time, last_value) = history.last()?;
                let slope = if last_time > first_time {
                    (last_value - first_value) / (last_time - first_time) as f64
                } else {
                    0.0
                };
                Some((
                    entity,
                    DriftFit {
                        last_time,
                        last_value,
                        slope,
                    },
                ))
            })
            .collect();
        self.anchor = Some(anchor);
        Ok(())
    }

    fn predict(
        &self,
        max_horizon: usize,
        features: &PanelSlice<'_>,
    ) -> Result<Vec<PredictionEntry>, ModelError> {
        let anchor = self.anchor;
        extrapolate(anchor, &self.fits, max_horizon, features, |fit, h| {
            // Entities may have stopped reporting before the anchor.
            let steps_ahead = anchor.map_or(h, |a| a + h - fit.last_time);
            fit.last_value + fit.slope * steps_ahead as f64
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PanelColumns, PanelDataset, PanelRow};
    use crate::walkforward::TimeRange;
    use approx::assert_relative_eq;

    fn dataset() -> PanelDataset {
        let mut rows = Vec::new();
        for t in 1..=6 {
            rows.push(PanelRow::new(t, 1, Some(t as f64)));
            rows.push(PanelRow::new(t, 2, Some(10.0)));
        }
        // Entity 3 only appears in the prediction range.
        rows.push(PanelRow::new(5, 3, Some(0.0)));
        PanelDataset::new(
            PanelColumns {
                time: "t".to_string(),
                entity: "e".to_string(),
                target: "y".to_string(),
                features: vec![],
            },
            rows,
        )
        .unwrap()
    }

    fn value_at(entries: &[PredictionEntry], t: i64, e: i64) -> Option<f64> {
        entries
            .iter()
            .find(|p| p.key.time_id == t && p.key.entity_id == e)
            .map(|p| p.value)
    }

    #[test]
    fn test_last_value() {
        let ds = dataset();
        let mut model = ModelKind::LastValue.build();
        model.fit(&ds.slice(TimeRange::new(1, 5))).unwrap();
        let preds = model.predict(2, &ds.slice(TimeRange::new(5, 7))).unwrap();

        assert_eq!(preds.len(), 4);
        assert!(preds.iter().all(|p| p.anchor == 4));
        assert_eq!(value_at(&preds, 5, 1), Some(4.0));
        assert_eq!(value_at(&preds, 6, 1), Some(4.0));
        assert_eq!(value_at(&preds, 6, 2), Some(10.0));
        assert_eq!(value_at(&preds, 5, 3), None);
    }

    #[test]
    fn test_max_horizon_limits_output() {
        let ds = dataset();
        let mut model = ModelKind::LastValue.build();
        model.fit(&ds.slice(TimeRange::new(1, 5))).unwrap();
        let preds = model.predict(1, &ds.slice(TimeRange::new(5, 7))).unwrap();
        assert!(preds.iter().all(|p| p.horizon() == 1));
        assert_eq!(preds.len(), 2);
    }

    #[test]
    fn test_entity_mean_window() {
        let ds = dataset();
        let mut all = ModelKind::EntityMean { window: None }.build();
        all.fit(&ds.slice(TimeRange::new(1, 5))).unwrap();
        let preds = all.predict(1, &ds.slice(TimeRange::new(5, 6))).unwrap();
        assert_relative_eq!(value_at(&preds, 5, 1).unwrap(), 2.5);

        let mut recent = ModelKind::EntityMean { window: Some(2) }.build();
        recent.fit(&ds.slice(TimeRange::new(1, 5))).unwrap();
        let preds = recent.predict(1, &ds.slice(TimeRange::new(5, 6))).unwrap();
        assert_relative_eq!(value_at(&preds, 5, 1).unwrap(), 3.5);
    }

    #[test]
    fn test_drift_extrapolates_trend() {
        let ds = dataset();
        let mut model = ModelKind::Drift.build();
        model.fit(&ds.slice(TimeRange::new(1, 5))).unwrap();
        let preds = model.predict(2, &ds.slice(TimeRange::new(5, 7))).unwrap();
        assert_relative_eq!(value_at(&preds, 5, 1).unwrap(), 5.0);
        assert_relative_eq!(value_at(&preds, 6, 1).unwrap(), 6.0);
        assert_relative_eq!(value_at(&preds, 6, 2).unwrap(), 10.0);
    }

    #[test]
    fn test_empty_training_slice_is_fit_error() {
        let ds = dataset();
        let mut model = ModelKind::LastValue.build();
        let err = model.fit(&ds.slice(TimeRange::new(-3, 1))).unwrap_err();
        assert!(matches!(err, ModelError::Fit(_)));
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let ds = dataset();
        let model = ModelKind::Drift.build();
        let err = model.predict(1, &ds.slice(TimeRange::new(5, 6))).unwrap_err();
        assert!(matches!(err, ModelError::Predict(_)));
    }

    #[test]
    fn test_model_kind_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            model: ModelKind,
        }
        let parsed: Wrapper =
            toml::from_str("[model]\nkind = \"entity_mean\"\nwindow = 12\n").unwrap();
        assert_eq!(parsed.model, ModelKind::EntityMean { window: Some(12) });
        assert_eq!(ModelKind::Drift.build().name(), "drift");
    }
}
