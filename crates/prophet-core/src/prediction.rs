use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::{compute_features, FeatureRow, FEATURE_COLUMNS};
use crate::{PredictionResult, PriceSeries, Ticker, ValidationError};

/// Series shorter than this carry too little history to populate the
/// indicator windows reliably; prediction refuses them outright.
pub const MIN_HISTORY_BARS: usize = 50;

/// Per-ticker prediction failure. Always batch-partial, never fatal.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("insufficient history: {len} bars, {min} required")]
    InsufficientHistory { len: usize, min: usize },

    #[error("no feature rows survived indicator windowing")]
    NoFeaturesAvailable,

    #[error("model rejected input: {0}")]
    Model(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Opaque regression boundary. The concrete artifact is trained and
/// versioned outside this crate.
pub trait Predictor: Send + Sync {
    fn predict(&self, row: &FeatureRow) -> Result<f64, PredictError>;
}

/// Failure while deserializing a model artifact. Fatal to the run.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to read model file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("model file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model was trained on columns {actual:?}, expected {expected:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("model has {actual} weights for {expected} columns")]
    WeightCountMismatch { expected: usize, actual: usize },
}

/// Linear regression artifact serialized as JSON.
///
/// The column list is stored with the weights and must match the feature
/// column constant exactly; a model trained on a different layout must
/// never be silently applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    columns: Vec<String>,
    weights: Vec<f64>,
    intercept: f64,
}

impl LinearModel {
    pub fn new(weights: Vec<f64>, intercept: f64) -> Result<Self, ModelLoadError> {
        let model = Self {
            columns: FEATURE_COLUMNS.iter().map(|c| (*c).to_owned()).collect(),
            weights,
            intercept,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let model: Self = serde_json::from_str(&raw)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelLoadError> {
        if self.columns != FEATURE_COLUMNS {
            return Err(ModelLoadError::ColumnMismatch {
                expected: FEATURE_COLUMNS.iter().map(|c| (*c).to_owned()).collect(),
                actual: self.columns.clone(),
            });
        }
        if self.weights.len() != FEATURE_COLUMNS.len() {
            return Err(ModelLoadError::WeightCountMismatch {
                expected: FEATURE_COLUMNS.len(),
                actual: self.weights.len(),
            });
        }
        Ok(())
    }
}

impl Predictor for LinearModel {
    fn predict(&self, row: &FeatureRow) -> Result<f64, PredictError> {
        let vector = row.feature_vector();
        let dot: f64 = vector
            .iter()
            .zip(&self.weights)
            .map(|(value, weight)| value * weight)
            .sum();
        Ok(dot + self.intercept)
    }
}

/// Runs the model over the latest feature row of a collected series.
#[derive(Clone)]
pub struct PredictionEngine {
    model: Arc<dyn Predictor>,
}

impl PredictionEngine {
    pub fn new(model: Arc<dyn Predictor>) -> Self {
        Self { model }
    }

    /// Predict the next close for one ticker.
    ///
    /// The history-length gate runs before any feature work, so a short
    /// series never touches the model.
    pub fn predict_for_ticker(
        &self,
        ticker: &Ticker,
        name: Option<String>,
        series: &PriceSeries,
    ) -> Result<PredictionResult, PredictError> {
        if series.len() < MIN_HISTORY_BARS {
            return Err(PredictError::InsufficientHistory {
                len: series.len(),
                min: MIN_HISTORY_BARS,
            });
        }

        let rows = compute_features(series, false);
        let last_row = rows.last().ok_or(PredictError::NoFeaturesAvailable)?;

        let predicted_price = self.model.predict(last_row)?;
        let result = PredictionResult::new(
            ticker.clone(),
            name,
            last_row.close,
            predicted_price,
            last_row.date,
        )?;

        Ok(result)
    }
}
