pub mod config;
pub mod data;
pub mod forecast;
pub mod metrics;
pub mod model;
pub mod validation;
pub mod walkforward;

// Re-export commonly used types
pub use config::{ConfigError, RunConfig};
pub use data::{PanelColumns, PanelDataset, PanelKey, PanelLoader, PanelRow, PanelSlice};
pub use forecast::{pivot, EvaluationRow, PredictionEntry, ReconciledTable, Reconciler, WideTable};
pub use metrics::{evaluate, EvaluationReport, Evaluator};
pub use model::{ForecastModel, ModelError, ModelFactory, ModelKind};
pub use validation::{DataIntegrityReport, PanelIntegrityValidator};
pub use walkforward::{EngineConfig, ForecastRun, Partition, WalkForwardEngine, WindowSchedule};
