//! Model adapter.
//!
//! The engine only needs something it can fit on a training slice and ask
//! for predictions. A fresh model is built for every origin, so a model
//! never carries state from one origin into the next.

pub mod baseline;

use thiserror::Error;

use crate::data::PanelSlice;
use crate::forecast::PredictionEntry;

pub use baseline::{Baseline, Drift, EntityMean, LastValue, ModelKind};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Fit failed: {0}")]
    Fit(String),

    #[error("Predict failed: {0}")]
    Predict(String),
}

/// A fittable, predictable forecasting model.
pub trait ForecastModel {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Train in place on `train`, which holds every period before the origin.
    fn fit(&mut self, train: &PanelSlice<'_>) -> Result<(), ModelError>;

    /// Predict the rows of `features` that lie at most `max_horizon` periods
    /// after the latest period seen during fit.
    ///
    /// Entries carry that latest period as their anchor.
    fn predict(
        &self,
        max_horizon: usize,
        features: &PanelSlice<'_>,
    ) -> Result<Vec<PredictionEntry>, ModelError>;
}

/// Builds an untrained model for each origin.
pub trait ModelFactory {
    type Model: ForecastModel;

    fn build(&self) -> Self::Model;
}

impl<F, M> ModelFactory for F
where
    F: Fn() -> M,
    M: ForecastModel,
{
    type Model = M;

    fn build(&self) -> M {
        self()
    }
}
