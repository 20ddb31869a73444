use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use prophet_core::{Instrument, Ticker, ValidationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config must list at least one ticker")]
    NoTickers,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// One configured instrument: either a bare ticker string or an object with
/// a display name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TickerEntry {
    Plain(String),
    Named { symbol: String, name: Option<String> },
}

/// Run configuration loaded from a JSON file; CLI flags may override the
/// path-valued fields.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub tickers: Vec<TickerEntry>,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,
    #[serde(default = "default_rank_depth")]
    pub rank_depth: usize,
    #[serde(default = "default_min_available_memory_mb")]
    pub min_available_memory_mb: u64,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    pub model_path: PathBuf,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_lookback_days() -> usize {
    90
}

fn default_rank_depth() -> usize {
    3
}

fn default_min_available_memory_mb() -> u64 {
    500
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        if config.tickers.is_empty() {
            return Err(ConfigError::NoTickers);
        }
        Ok(config)
    }

    /// Validate and normalize the configured tickers, preserving order.
    pub fn instruments(&self) -> Result<Vec<Instrument>, ConfigError> {
        self.tickers
            .iter()
            .map(|entry| {
                let (symbol, name) = match entry {
                    TickerEntry::Plain(symbol) => (symbol.as_str(), None),
                    TickerEntry::Named { symbol, name } => (symbol.as_str(), name.clone()),
                };
                let ticker = Ticker::parse(symbol)?;
                Ok(Instrument::new(ticker, name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(raw: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(raw.as_bytes()).expect("write");
        file
    }

    #[test]
    fn parses_mixed_ticker_entries() {
        let file = write_config(
            r#"{
                "tickers": [
                    "AAPL",
                    {"symbol": "7203.T", "name": "Toyota"}
                ],
                "model_path": "model.json"
            }"#,
        );

        let config = RunConfig::load(file.path()).expect("config");
        assert_eq!(config.lookback_days, 90);
        assert_eq!(config.rank_depth, 3);
        assert_eq!(config.min_available_memory_mb, 500);

        let instruments = config.instruments().expect("instruments");
        assert_eq!(instruments.len(), 2);
        assert_eq!(instruments[0].ticker.as_str(), "AAPL");
        assert_eq!(instruments[0].name, None);
        assert_eq!(instruments[1].ticker.as_str(), "7203.T");
        assert_eq!(instruments[1].name.as_deref(), Some("Toyota"));
    }

    #[test]
    fn rejects_empty_ticker_list() {
        let file = write_config(r#"{"tickers": [], "model_path": "model.json"}"#);
        let err = RunConfig::load(file.path()).expect_err("must fail");
        assert!(matches!(err, ConfigError::NoTickers));
    }

    #[test]
    fn invalid_symbol_fails_validation() {
        let file = write_config(r#"{"tickers": ["AA PL"], "model_path": "model.json"}"#);
        let config = RunConfig::load(file.path()).expect("config");
        let err = config.instruments().expect_err("must fail");
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
