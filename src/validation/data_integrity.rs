//! Panel integrity checks run before a backtest.
//!
//! Validates:
//! - Period coverage (no missing months between train_start and test_end)
//! - Training history before the first origin
//! - Observed targets in the test range
//! - Balanced panel (same entities in every period)
//! - Feature completeness (no nulls in feature columns)
//! - Finite targets

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::data::{PanelDataset, PanelSlice};
use crate::walkforward::{Partition, PartitionError, TimeRange, WindowSchedule};

/// Details list at most this many offenders.
const MAX_LISTED: usize = 10;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error(transparent)]
    Partition(#[from] PartitionError),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result of a single validation check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn fail(name: &str, message: &str, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.to_string(),
            details,
        }
    }
}

/// Complete integrity report for one dataset and partition.
#[derive(Debug)]
pub struct DataIntegrityReport {
    pub partition: Partition,
    pub row_count: usize,
    pub entity_count: usize,
    pub periods: usize,
    pub checks: Vec<CheckResult>,
}

impl DataIntegrityReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn summary(&self) -> String {
        let passed = self.checks.iter().filter(|c| c.passed).count();
        let total = self.checks.len();
        format!(
            "[{}, {}] ({} rows, {} entities, {} periods): {}/{} checks passed",
            self.partition.train_start,
            self.partition.test_end,
            self.row_count,
            self.entity_count,
            self.periods,
            passed,
            total
        )
    }
}

/// Validator for a panel against the partition it will be backtested on.
pub struct PanelIntegrityValidator {
    schedule: WindowSchedule,
}

impl PanelIntegrityValidator {
    pub fn new(partition: Partition, steps: usize) -> ValidationResult<Self> {
        Ok(Self {
            schedule: WindowSchedule::new(partition, steps)?,
        })
    }

    /// Run all validation checks.
    pub fn validate(&self, dataset: &PanelDataset) -> DataIntegrityReport {
        let partition = *self.schedule.partition();
        let full = dataset.slice(partition.full_range());
        let periods = period_entities(&full);

        let checks = vec![
            self.check_coverage(&periods, partition.full_range()),
            self.check_training_history(dataset),
            self.check_test_targets(&dataset.slice(partition.test_range())),
            self.check_balanced(&periods),
            self.check_features(&full),
            self.check_finite_targets(&full),
        ];

        DataIntegrityReport {
            partition,
            row_count: full.len(),
            entity_count: full.entities().len(),
            periods: periods.len(),
            checks,
        }
    }

    /// Every period of the partition has at least one row.
    fn check_coverage(
        &self,
        periods: &BTreeMap<i64, BTreeSet<i64>>,
        range: TimeRange,
    ) -> CheckResult {
        let missing: Vec<i64> = (range.start..range.end)
            .filter(|t| !periods.contains_key(t))
            .collect();

        if missing.is_empty() {
            CheckResult::pass(
                "period_coverage",
                &format!("All {} periods present", range.len()),
            )
        } else {
            CheckResult::fail(
                "period_coverage",
                &format!("{} of {} periods missing", missing.len(), range.len()),
                Some(list(&missing)),
            )
        }
    }

    /// The earliest origin needs data before it to train on.
    fn check_training_history(&self, dataset: &PanelDataset) -> CheckResult {
        let partition = self.schedule.partition();
        let first = self.schedule.first_origin();
        let history = dataset.slice(TimeRange::new(partition.train_start, first));

        if history.is_empty() {
            CheckResult::fail(
                "training_history",
                &format!("No rows before first origin {}", first),
                Some(format!(
                    "train_start={}, steps={}; empty training fails unless empty_train = \"skip\"",
                    partition.train_start,
                    self.schedule.steps()
                )),
            )
        } else {
            CheckResult::pass(
                "training_history",
                &format!("{} rows before first origin {}", history.len(), first),
            )
        }
    }

    /// Evaluation needs observed targets in the test range.
    fn check_test_targets(&self, test: &PanelSlice<'_>) -> CheckResult {
        let observed = test.rows().iter().filter(|r| r.target.is_some()).count();
        let missing = test.len() - observed;

        if observed == 0 {
            CheckResult::fail(
                "test_targets",
                "No observed targets in test range",
                Some(format!("{} rows without target", missing)),
            )
        } else if missing > 0 {
            // Unobserved periods are dropped from evaluation, not an error.
            CheckResult {
                details: Some(format!("{} rows without target are not evaluated", missing)),
                ..CheckResult::pass("test_targets", &format!("{} observed targets", observed))
            }
        } else {
            CheckResult::pass("test_targets", &format!("{} observed targets", observed))
        }
    }

    /// Every period carries the same entity set as the first one.
    fn check_balanced(&self, periods: &BTreeMap<i64, BTreeSet<i64>>) -> CheckResult {
        let Some((_, reference)) = periods.iter().next() else {
            return CheckResult::fail("balanced_panel", "No periods to compare", None);
        };

        let unbalanced: Vec<String> = periods
            .iter()
            .filter(|(_, entities)| *entities != reference)
            .map(|(t, entities)| format!("t={} ({} entities)", t, entities.len()))
            .collect();

        if unbalanced.is_empty() {
            CheckResult::pass(
                "balanced_panel",
                &format!("{} entities in every period", reference.len()),
            )
        } else {
            CheckResult::fail(
                "balanced_panel",
                &format!(
                    "{} periods differ from the first period's {} entities",
                    unbalanced.len(),
                    reference.len()
                ),
                Some(list(&unbalanced)),
            )
        }
    }

    fn check_features(&self, slice: &PanelSlice<'_>) -> CheckResult {
        let names = &slice.columns().features;
        if names.is_empty() {
            return CheckResult::pass("feature_completeness", "No feature columns configured");
        }

        let mut nulls = vec![0usize; names.len()];
        for row in slice.rows() {
            for (count, value) in nulls.iter_mut().zip(&row.features) {
                if value.is_none() {
                    *count += 1;
                }
            }
        }

        let issues: Vec<String> = names
            .iter()
            .zip(&nulls)
            .filter(|(_, n)| **n > 0)
            .map(|(name, n)| format!("{}: {} nulls", name, n))
            .collect();

        if issues.is_empty() {
            CheckResult::pass(
                "feature_completeness",
                &format!("All {} feature columns complete", names.len()),
            )
        } else {
            CheckResult::fail(
                "feature_completeness",
                &format!("{} feature columns with nulls", issues.len()),
                Some(issues.join("; ")),
            )
        }
    }

    fn check_finite_targets(&self, slice: &PanelSlice<'_>) -> CheckResult {
        let infinite: Vec<String> = slice
            .rows()
            .iter()
            .filter(|r| r.target.is_some_and(f64::is_infinite))
            .map(|r| r.key.to_string())
            .collect();

        if infinite.is_empty() {
            CheckResult::pass("finite_targets", "All observed targets finite")
        } else {
            CheckResult::fail(
                "finite_targets",
                &format!("{} infinite targets", infinite.len()),
                Some(list(&infinite)),
            )
        }
    }
}

/// Entity set per period.
fn period_entities(slice: &PanelSlice<'_>) -> BTreeMap<i64, BTreeSet<i64>> {
    let mut periods: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
    for row in slice.rows() {
        periods.entry(row.time_id()).or_default().insert(row.entity_id());
    }
    periods
}

fn list<T: ToString>(items: &[T]) -> String {
    let mut out: Vec<String> = items.iter().take(MAX_LISTED).map(T::to_string).collect();
    if items.len() > MAX_LISTED {
        out.push(format!("... {} more", items.len() - MAX_LISTED));
    }
    out.join(", ")
}
