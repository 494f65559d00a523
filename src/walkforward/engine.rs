//! Walk-forward forecasting loop.
//!
//! For each origin, in increasing order:
//! 1. Slice the training range (every period before the origin)
//! 2. Build a fresh model and fit it
//! 3. Predict the origin's prediction range
//! 4. Pivot the predictions into horizon columns
//! 5. Fold them into the reconciled table (earliest anchor wins)
//!
//! After the last origin the table is optionally joined with the actuals of
//! the test range.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::data::PanelDataset;
use crate::forecast::{pivot, EvaluationRow, ForecastError, ReconciledTable, Reconciler};
use crate::metrics::{EvaluationError, EvaluationReport, Evaluator};
use crate::model::{ForecastModel, ModelError, ModelFactory};

use super::periods::{Partition, PartitionError, TimeRange, WindowSchedule};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error("Model failed at origin {origin}: {source}")]
    Model { origin: i64, source: ModelError },

    #[error("Invalid predictions at origin {origin}: {source}")]
    Forecast { origin: i64, source: ForecastError },
}

/// What to do with origins whose training range holds no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTrainPolicy {
    /// Hand the empty slice to the model and let it fail.
    #[default]
    Fail,
    /// Skip the origin without calling the model.
    Skip,
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum horizon.
    pub steps: usize,
    #[serde(default)]
    pub empty_train: EmptyTrainPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            steps: 36,
            empty_train: EmptyTrainPolicy::default(),
        }
    }
}

/// Per-origin bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginSummary {
    pub origin: i64,
    pub anchor: i64,
    pub train_rows: usize,
    pub predict_rows: usize,
    pub predictions: usize,
    pub filled: usize,
    pub kept: usize,
    pub skipped: bool,
}

/// Result of a walk-forward run.
#[derive(Debug, Clone)]
pub struct ForecastRun {
    pub steps: usize,
    pub table: ReconciledTable,
    /// Present when the run was asked to combine actuals.
    pub evaluation_rows: Option<Vec<EvaluationRow>>,
    pub origins: Vec<OriginSummary>,
}

impl ForecastRun {
    /// Score the joined rows. Fails with `NotJoined` when actuals were not combined.
    pub fn evaluate(&self) -> Result<EvaluationReport, EvaluationError> {
        match &self.evaluation_rows {
            Some(rows) => Evaluator::evaluate(rows, self.steps),
            None => Err(EvaluationError::NotJoined),
        }
    }

    pub fn skipped_origins(&self) -> usize {
        self.origins.iter().filter(|o| o.skipped).count()
    }
}

/// Expanding-window, multi-horizon forecasting engine.
///
/// Owns no run state: every call to [`WalkForwardEngine::run`] starts a new
/// schedule and a new reconciler.
pub struct WalkForwardEngine {
    config: EngineConfig,
}

impl WalkForwardEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Engine with default settings and the given horizon.
    pub fn with_steps(steps: usize) -> Self {
        Self::new(EngineConfig {
            steps,
            ..EngineConfig::default()
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the walk-forward loop over `partition`.
    ///
    /// Aborts on the first model failure; a partially reconciled table is
    /// never returned.
    pub fn run<F>(
        &self,
        dataset: &PanelDataset,
        partition: &Partition,
        factory: &F,
        combine_actuals: bool,
    ) -> Result<ForecastRun, EngineError>
    where
        F: ModelFactory,
    {
        let steps = self.config.steps;
        let schedule = WindowSchedule::new(*partition, steps)?;

        info!(
            "Walk-forward: {} origins ({} to {}), steps = {}, {} rows",
            schedule.len(),
            schedule.first_origin(),
            schedule.last_origin(),
            steps,
            dataset.len()
        );

        let mut reconciler = Reconciler::new(steps);
        let mut origins = Vec::with_capacity(schedule.len());
        let mut last_skipped = None;

        for window in schedule.iter() {
            let train = dataset.slice(window.train_range());
            let features = dataset.slice(window.predict_range());

            if train.is_empty() && self.config.empty_train == EmptyTrainPolicy::Skip {
                warn!(
                    "Skipping origin {} ({}/{}): no training rows before it",
                    window.origin,
                    window.period_num,
                    schedule.len()
                );
                origins.push(OriginSummary {
                    origin: window.origin,
                    anchor: window.anchor(),
                    train_rows: 0,
                    predict_rows: features.len(),
                    predictions: 0,
                    filled: 0,
                    kept: 0,
                    skipped: true,
                });
                last_skipped = Some(window.origin);
                continue;
            }

            info!(
                "Processing origin {}/{}: origin {}, train {} to {}, predict {} to {}",
                window.period_num,
                schedule.len(),
                window.origin,
                window.train_range().start,
                window.anchor(),
                window.predict_range().start,
                window.predict_range().end - 1
            );

            let mut model = factory.build();
            model.fit(&train).map_err(|source| {
                error!(origin = window.origin, model = model.name(), "Fit failed: {}", source);
                EngineError::Model {
                    origin: window.origin,
                    source,
                }
            })?;

            let entries = model
                .predict(window.max_horizon(), &features)
                .map_err(|source| {
                    error!(
                        origin = window.origin,
                        model = model.name(),
                        "Predict failed: {}",
                        source
                    );
                    EngineError::Model {
                        origin: window.origin,
                        source,
                    }
                })?;

            let stats = pivot(window.anchor(), steps, &entries)
                .and_then(|wide| reconciler.merge(&wide))
                .map_err(|source| {
                    error!(origin = window.origin, "Rejected predictions: {}", source);
                    EngineError::Forecast {
                        origin: window.origin,
                        source,
                    }
                })?;

            debug!(
                origin = window.origin,
                predictions = entries.len(),
                filled = stats.filled,
                kept = stats.kept,
                new_rows = stats.new_rows,
                "Merged origin"
            );

            origins.push(OriginSummary {
                origin: window.origin,
                anchor: window.anchor(),
                train_rows: train.len(),
                predict_rows: features.len(),
                predictions: entries.len(),
                filled: stats.filled,
                kept: stats.kept,
                skipped: false,
            });
        }

        let table = reconciler.finish();
        info!(
            "Reconciled {} rows, coverage per horizon: {:?}",
            table.len(),
            table.coverage()
        );

        let evaluation_rows = combine_actuals.then(|| {
            // Periods a skipped origin would have predicted lack that horizon.
            let start = last_skipped
                .map_or(partition.test_start, |o| partition.test_start.max(o + steps as i64));
            let actuals = TimeRange::new(start, partition.test_end + 1);
            if start > partition.test_start {
                let excluded = dataset.slice(TimeRange::new(partition.test_start, start)).len();
                warn!(
                    "Excluding {} rows in periods {} to {} covered by skipped origins",
                    excluded,
                    partition.test_start,
                    start - 1
                );
            }

            let rows = table.combine_actuals(&dataset.slice(actuals));
            info!(
                "Joined {} of {} reconciled rows with actuals",
                rows.len(),
                table.len()
            );
            rows
        });

        Ok(ForecastRun {
            steps,
            table,
            evaluation_rows,
            origins,
        })
    }
}
