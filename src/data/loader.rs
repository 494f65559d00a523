//! Panel loader and writer.
//!
//! Reads a Parquet or CSV panel into a [`PanelDataset`] and turns prediction
//! tables back into polars frames for writing. The expected layout is one
//! row per (time, entity) with the columns named in [`PanelColumns`]:
//! - time: integer month id, or a date column (requires a calendar)
//! - entity: integer id
//! - target: float, null or NaN when unobserved
//! - features: floats

use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use thiserror::Error;

use crate::forecast::{step_column_name, EvaluationRow, ReconciledTable};
use crate::metrics::RowError;

use super::calendar::{date_from_days, MonthCalendar};
use super::types::{PanelColumns, PanelDataset, PanelError, PanelKey, PanelRow};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format: {0} (expected .parquet or .csv)")]
    UnsupportedFormat(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Panel error: {0}")]
    Panel(#[from] PanelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Parquet,
    Csv,
}

impl FileFormat {
    fn from_path(path: &Path) -> Result<Self, LoaderError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("parquet") => Ok(Self::Parquet),
            Some("csv") => Ok(Self::Csv),
            _ => Err(LoaderError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Loads panel files with a fixed column mapping.
pub struct PanelLoader {
    columns: PanelColumns,
    calendar: Option<MonthCalendar>,
}

impl PanelLoader {
    pub fn new(columns: PanelColumns) -> Self {
        Self {
            columns,
            calendar: None,
        }
    }

    /// Convert date-typed time columns to month ids with `calendar`.
    pub fn with_calendar(mut self, calendar: MonthCalendar) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn columns(&self) -> &PanelColumns {
        &self.columns
    }

    /// Lazily scan a panel file, selecting only the configured columns.
    pub fn scan(&self, path: &Path) -> Result<LazyFrame, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::FileNotFound(path.display().to_string()));
        }

        let lf = match FileFormat::from_path(path)? {
            FileFormat::Parquet => LazyFrame::scan_parquet(path, ScanArgsParquet::default())?,
            FileFormat::Csv => LazyCsvReader::new(path).with_has_header(true).finish()?,
        };

        let selection: Vec<Expr> = self.columns.all().into_iter().map(col).collect();
        Ok(lf.select(selection))
    }

    /// Load a panel file into memory.
    pub fn load(&self, path: &Path) -> Result<PanelDataset, LoaderError> {
        let df = self.scan(path)?.collect()?;
        self.build_dataset(&df)
    }

    /// Convert a frame holding the configured columns into a dataset.
    pub fn build_dataset(&self, df: &DataFrame) -> Result<PanelDataset, LoaderError> {
        let times = self.time_ids(df)?;
        let entities = int_column(df, &self.columns.entity)?;
        let targets = float_column(df, &self.columns.target)?;
        let features = self
            .columns
            .features
            .iter()
            .map(|name| float_column(df, name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let time_id = times[idx].ok_or_else(|| {
                LoaderError::InvalidData(format!("null '{}' at row {}", self.columns.time, idx))
            })?;
            let entity_id = entities[idx].ok_or_else(|| {
                LoaderError::InvalidData(format!("null '{}' at row {}", self.columns.entity, idx))
            })?;

            rows.push(
                PanelRow::new(time_id, entity_id, targets[idx])
                    .with_features(features.iter().map(|values| values[idx]).collect()),
            );
        }

        Ok(PanelDataset::new(self.columns.clone(), rows)?)
    }

    fn time_ids(&self, df: &DataFrame) -> Result<Vec<Option<i64>>, LoaderError> {
        let name = self.columns.time.as_str();
        if df.column(name)?.dtype() != &DataType::Date {
            return int_column(df, name);
        }

        let calendar = self.calendar.ok_or_else(|| {
            LoaderError::InvalidData(format!(
                "'{}' is a date column; configure a month calendar to convert it",
                name
            ))
        })?;
        let days = df.column(name)?.cast(&DataType::Int32)?;
        days.i32()?
            .into_iter()
            .map(|d| match d {
                None => Ok(None),
                Some(d) => date_from_days(d)
                    .map(|date| Some(calendar.month_id(date)))
                    .ok_or_else(|| {
                        LoaderError::InvalidData(format!(
                            "'{}' holds out-of-range date ({} days from epoch)",
                            name, d
                        ))
                    }),
            })
            .collect()
    }
}

fn int_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, LoaderError> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

/// Float column with NaN folded into null.
fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, LoaderError> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Wide frame: time, entity, then `step_pred_1..=steps`.
pub fn reconciled_to_dataframe(
    table: &ReconciledTable,
    columns: &PanelColumns,
) -> Result<DataFrame, LoaderError> {
    let mut frame = key_columns(table.rows().keys(), columns);
    for h in 1..=table.steps() {
        let cells: Vec<Option<f64>> = table.rows().values().map(|row| row.get(h)).collect();
        frame.push(Column::new(step_column_name(h).into(), cells));
    }
    Ok(DataFrame::new(frame)?)
}

/// Evaluation rows as a frame: time, entity, target, then `step_pred_1..=steps`.
pub fn evaluation_to_dataframe(
    rows: &[EvaluationRow],
    steps: usize,
    columns: &PanelColumns,
) -> Result<DataFrame, LoaderError> {
    let targets: Vec<f64> = rows.iter().map(|r| r.target).collect();
    let mut frame = key_columns(rows.iter().map(|r| &r.key), columns);
    frame.push(Column::new(columns.target.as_str().into(), targets));
    for h in 1..=steps {
        let cells: Vec<Option<f64>> = rows.iter().map(|r| r.predictions.get(h)).collect();
        frame.push(Column::new(step_column_name(h).into(), cells));
    }
    Ok(DataFrame::new(frame)?)
}

/// Per-row metrics as a frame: time, entity, target, mse, mae.
pub fn row_errors_to_dataframe(
    errors: &[RowError],
    columns: &PanelColumns,
) -> Result<DataFrame, LoaderError> {
    let targets: Vec<f64> = errors.iter().map(|r| r.target).collect();
    let mse: Vec<f64> = errors.iter().map(|r| r.mse).collect();
    let mae: Vec<f64> = errors.iter().map(|r| r.mae).collect();

    let mut frame = key_columns(errors.iter().map(|r| &r.key), columns);
    frame.push(Column::new(columns.target.as_str().into(), targets));
    frame.push(Column::new("mse".into(), mse));
    frame.push(Column::new("mae".into(), mae));
    Ok(DataFrame::new(frame)?)
}

/// Time and entity columns for `keys`, in order.
fn key_columns<'a>(
    keys: impl Iterator<Item = &'a PanelKey>,
    columns: &PanelColumns,
) -> Vec<Column> {
    let (times, entities): (Vec<i64>, Vec<i64>) = keys.map(|k| (k.time_id, k.entity_id)).unzip();
    vec![
        Column::new(columns.time.as_str().into(), times),
        Column::new(columns.entity.as_str().into(), entities),
    ]
}

/// Write a frame as Parquet or CSV, chosen by the path's extension.
pub fn write_dataframe(df: &mut DataFrame, path: &Path) -> Result<(), LoaderError> {
    let format = FileFormat::from_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(path)?;
    match format {
        FileFormat::Parquet => {
            ParquetWriter::new(&mut file).finish(df)?;
        }
        FileFormat::Csv => {
            CsvWriter::new(&mut file).include_header(true).finish(df)?;
        }
    }
    Ok(())
}
