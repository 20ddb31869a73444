use serde::{Deserialize, Serialize};

/// Flattened OHLCV row as stored in a per-ticker bar table.
///
/// Dates are ISO-8601 (`YYYY-MM-DD`) strings; the domain layer owns parsing
/// and validation, the store persists what it is handed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRecord {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: Option<f64>,
    pub volume: u64,
}

/// One persisted prediction outcome, keyed by `(ticker, run_at)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub ticker: String,
    pub name: Option<String>,
    pub current_price: f64,
    pub predicted_price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub as_of_date: String,
    /// Run timestamp, RFC3339 UTC. All records of one run share this value.
    pub run_at: String,
}
