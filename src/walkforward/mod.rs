//! Walk-forward forecasting.
//!
//! Expanding-window retraining over a test range:
//! - One origin per period from `test_start - steps + 1` to `test_end`
//! - Train: every period before the origin
//! - Predict: up to `steps` periods from the origin, clipped at `test_end`
//! - Reconcile: earliest anchor wins per (period, entity, horizon)

pub mod engine;
pub mod periods;

pub use engine::{
    EmptyTrainPolicy, EngineConfig, EngineError, ForecastRun, OriginSummary, WalkForwardEngine,
};
pub use periods::{Partition, PartitionError, TimeRange, Window, WindowSchedule, Windows};
