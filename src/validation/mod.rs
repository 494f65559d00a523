//! Pre-run validation of panel data.

pub mod data_integrity;

pub use data_integrity::{
    CheckResult, DataIntegrityReport, PanelIntegrityValidator, ValidationError, ValidationResult,
};
