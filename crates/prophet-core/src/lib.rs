//! Core pipeline for the prophet forecaster.
//!
//! This crate contains:
//! - Canonical domain models and validation
//! - Dual-strategy price history acquisition with fallback
//! - Deterministic technical-indicator feature engineering
//! - Prediction orchestration, ranking, and run persistence

pub mod adapters;
pub mod collector;
pub mod domain;
pub mod error;
pub mod features;
pub mod http_client;
pub mod notify;
pub mod pipeline;
pub mod prediction;
pub mod price_source;
pub mod report;
pub mod resource;
pub mod source;

pub use adapters::{BrowserClient, BrowserSource, FastSource, HttpBrowserClient, NoopBrowserClient};
pub use collector::{BatchOutcome, CollectionFailure, CollectionResult, FallbackCollector};
pub use domain::{Bar, PredictionResult, PriceSeries, Ticker, TradingDay, UtcDateTime};
pub use error::ValidationError;
pub use features::{compute_features, FeatureRow, FEATURE_COLUMNS};
pub use http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};
pub use notify::{NoopNotifier, Notifier, NotifyError, WebhookNotifier};
pub use pipeline::{Instrument, Pipeline, PipelineError, RunSummary};
pub use prediction::{
    LinearModel, ModelLoadError, PredictError, PredictionEngine, Predictor, MIN_HISTORY_BARS,
};
pub use price_source::{PriceSource, SourceError, SourceErrorKind};
pub use prophet_warehouse::{bar_table_name, BarRecord, HistoryStore, PredictionRecord, StoreError};
pub use report::{Report, ReportBuilder, DEFAULT_RANK_DEPTH};
pub use resource::{
    sample_host, ResourceError, ResourceGuard, ResourceSnapshot, ResourceThresholds,
};
pub use source::SourceId;
