//! Core panel data types.
//!
//! A panel is a set of observations indexed jointly by a time period and a
//! cross-sectional entity (a country, a grid cell). Every row carries the
//! same feature columns and one optional target value.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::walkforward::TimeRange;

/// Composite row key. Orders by time first, then entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PanelKey {
    pub time_id: i64,
    pub entity_id: i64,
}

impl PanelKey {
    pub fn new(time_id: i64, entity_id: i64) -> Self {
        Self { time_id, entity_id }
    }
}

impl fmt::Display for PanelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(t={}, e={})", self.time_id, self.entity_id)
    }
}

/// Column names the caller uses for a given dataset.
///
/// The entity column differs by granularity (`country_id` for country-month
/// data, `priogrid_gid` for grid-month data), so nothing here is hardcoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PanelColumns {
    /// Time column (integer period index, or a date column).
    pub time: String,
    /// Entity identifier column.
    pub entity: String,
    /// Target column.
    pub target: String,
    /// Feature columns, in a fixed order.
    #[serde(default)]
    pub features: Vec<String>,
}

impl Default for PanelColumns {
    fn default() -> Self {
        Self {
            time: "month_id".to_string(),
            entity: "country_id".to_string(),
            target: "ln_ged_sb_dep".to_string(),
            features: Vec::new(),
        }
    }
}

impl PanelColumns {
    /// All column names in load order: time, entity, target, features.
    pub fn all(&self) -> Vec<&str> {
        let mut names = vec![self.time.as_str(), self.entity.as_str(), self.target.as_str()];
        names.extend(self.features.iter().map(String::as_str));
        names
    }
}

/// A single (time, entity) observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub key: PanelKey,
    /// Ground truth; `None` when not (yet) observed.
    pub target: Option<f64>,
    pub features: Vec<Option<f64>>,
}

impl PanelRow {
    pub fn new(time_id: i64, entity_id: i64, target: Option<f64>) -> Self {
        Self {
            key: PanelKey::new(time_id, entity_id),
            target,
            features: Vec::new(),
        }
    }

    pub fn with_features(mut self, features: Vec<Option<f64>>) -> Self {
        self.features = features;
        self
    }

    pub fn time_id(&self) -> i64 {
        self.key.time_id
    }

    pub fn entity_id(&self) -> i64 {
        self.key.entity_id
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum PanelError {
    #[error("Duplicate panel key {0}")]
    DuplicateKey(PanelKey),

    #[error("Row {key} has {found} features, expected {expected}")]
    FeatureArity {
        key: PanelKey,
        expected: usize,
        found: usize,
    },
}

/// In-memory panel, sorted by key and read-only once built.
#[derive(Debug, Clone)]
pub struct PanelDataset {
    columns: PanelColumns,
    rows: Vec<PanelRow>,
}

impl PanelDataset {
    /// Build a dataset, sorting rows and rejecting duplicate keys.
    pub fn new(columns: PanelColumns, mut rows: Vec<PanelRow>) -> Result<Self, PanelError> {
        let expected = columns.features.len();
        if let Some(row) = rows.iter().find(|r| r.features.len() != expected) {
            return Err(PanelError::FeatureArity {
                key: row.key,
                expected,
                found: row.features.len(),
            });
        }

        rows.sort_by_key(|r| r.key);
        if let Some(pair) = rows.windows(2).find(|w| w[0].key == w[1].key) {
            return Err(PanelError::DuplicateKey(pair[0].key));
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &PanelColumns {
        &self.columns
    }

    pub fn rows(&self) -> &[PanelRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Earliest and latest time_id present.
    pub fn time_bounds(&self) -> Option<(i64, i64)> {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => Some((first.time_id(), last.time_id())),
            _ => None,
        }
    }

    /// Distinct entity ids, ascending.
    pub fn entities(&self) -> BTreeSet<i64> {
        self.rows.iter().map(PanelRow::entity_id).collect()
    }

    pub fn get(&self, key: PanelKey) -> Option<&PanelRow> {
        self.rows
            .binary_search_by_key(&key, |r| r.key)
            .ok()
            .map(|idx| &self.rows[idx])
    }

    /// Observed target for a key. Missing rows and missing targets both yield `None`.
    pub fn target(&self, key: PanelKey) -> Option<f64> {
        self.get(key).and_then(|r| r.target)
    }

    /// Borrow the rows whose time_id falls in `range`.
    pub fn slice(&self, range: TimeRange) -> PanelSlice<'_> {
        let lo = self.rows.partition_point(|r| r.time_id() < range.start);
        let hi = self.rows.partition_point(|r| r.time_id() < range.end);
        let hi = hi.max(lo);
        PanelSlice {
            columns: &self.columns,
            range,
            rows: &self.rows[lo..hi],
        }
    }
}

/// Borrowed view of a dataset restricted to a half-open time range.
#[derive(Debug, Clone, Copy)]
pub struct PanelSlice<'a> {
    columns: &'a PanelColumns,
    range: TimeRange,
    rows: &'a [PanelRow],
}

impl<'a> PanelSlice<'a> {
    pub fn columns(&self) -> &'a PanelColumns {
        self.columns
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn rows(&self) -> &'a [PanelRow] {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn entities(&self) -> BTreeSet<i64> {
        self.rows.iter().map(PanelRow::entity_id).collect()
    }

    pub fn get(&self, key: PanelKey) -> Option<&'a PanelRow> {
        let rows = self.rows;
        rows.binary_search_by_key(&key, |r| r.key)
            .ok()
            .map(|idx| &rows[idx])
    }

    pub fn target(&self, key: PanelKey) -> Option<f64> {
        self.get(key).and_then(|r| r.target)
    }
}
