//! Run configuration, read from TOML.
//!
//! Only the partition is required. Everything else falls back to the
//! country-month defaults.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{MonthCalendar, PanelColumns};
use crate::model::ModelKind;
use crate::walkforward::{EngineConfig, Partition, WindowSchedule};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// File format of run outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Parquet,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory the run writes into, unless overridden on the command line.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: OutputFormat::default(),
        }
    }
}

impl OutputConfig {
    /// `<dir>/<stem>.<ext>`.
    pub fn file(&self, dir: &Path, stem: &str) -> PathBuf {
        dir.join(format!("{}.{}", stem, self.format.extension()))
    }
}

/// Everything a walk-forward run needs besides the data file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub partition: Partition,
    #[serde(default)]
    pub columns: PanelColumns,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub model: ModelKind,
    #[serde(default)]
    pub output: OutputConfig,
    /// Calendar month of month id 1. Enables date labels and date time columns.
    #[serde(default)]
    pub month_origin: Option<NaiveDate>,
}

impl RunConfig {
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            columns: PanelColumns::default(),
            engine: EngineConfig::default(),
            model: ModelKind::default(),
            output: OutputConfig::default(),
            month_origin: None,
        }
    }

    /// Read and validate a config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn calendar(&self) -> Option<MonthCalendar> {
        self.month_origin.map(MonthCalendar::new)
    }

    /// Window schedule for the configured partition and steps.
    pub fn schedule(&self) -> Result<WindowSchedule, ConfigError> {
        WindowSchedule::new(self.partition, self.engine.steps).map_err(|e| {
            ConfigError::InvalidValue {
                field: "partition",
                reason: e.to_string(),
            }
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("columns.time", &self.columns.time),
            ("columns.entity", &self.columns.entity),
            ("columns.target", &self.columns.target),
        ];
        for (field, name) in names {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.columns.all().into_iter().find(|name| !seen.insert(*name)) {
            return Err(ConfigError::InvalidValue {
                field: "columns",
                reason: format!("column '{}' is used more than once", dup),
            });
        }

        if self.engine.steps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.steps",
                reason: "must be >= 1".to_string(),
            });
        }

        if let ModelKind::EntityMean { window: Some(0) } = self.model {
            return Err(ConfigError::InvalidValue {
                field: "model.window",
                reason: "must be >= 1".to_string(),
            });
        }

        if self.output.dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "output.dir",
                reason: "must not be empty".to_string(),
            });
        }

        self.schedule().map(|_| ())
    }
}
