use serde::{Deserialize, Serialize};

use crate::{Ticker, TradingDay, ValidationError};

/// OHLCV record for one trading period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: TradingDay,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: Option<f64>,
    pub volume: u64,
}

impl Bar {
    pub fn new(
        date: TradingDay,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        adj_close: Option<f64>,
        volume: u64,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("close", close)?;
        if let Some(adj) = adj_close {
            validate_non_negative("adj_close", adj)?;
        }

        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }

        if open < low || open > high || close < low || close > high {
            return Err(ValidationError::InvalidBarBounds);
        }

        Ok(Self {
            date,
            open,
            high,
            low,
            close,
            adj_close,
            volume,
        })
    }
}

/// Ordered daily price history for one ticker.
///
/// Invariant: bars are strictly increasing by date with no duplicates.
/// Calendar gaps are fine; missing days are simply absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: Ticker,
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Build a series from bars already in strictly increasing date order.
    pub fn new(ticker: Ticker, bars: Vec<Bar>) -> Result<Self, ValidationError> {
        for (index, pair) in bars.windows(2).enumerate() {
            if pair[1].date <= pair[0].date {
                return Err(ValidationError::UnorderedSeries { index: index + 1 });
            }
        }
        Ok(Self { ticker, bars })
    }

    /// Build a series from bars in arbitrary order, sorting ascending by date
    /// and keeping the first occurrence of a duplicated date.
    pub fn from_unordered(ticker: Ticker, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|bar| bar.date);
        bars.dedup_by_key(|bar| bar.date);
        Self { ticker, bars }
    }

    pub fn empty(ticker: Ticker) -> Self {
        Self {
            ticker,
            bars: Vec::new(),
        }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }
}

/// Outcome of one per-ticker prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub ticker: Ticker,
    pub name: Option<String>,
    pub current_price: f64,
    pub predicted_price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub as_of: TradingDay,
}

impl PredictionResult {
    /// Derive change fields from current and predicted price.
    ///
    /// Fails when the current price is zero: the percent change is undefined
    /// and must not be computed.
    pub fn new(
        ticker: Ticker,
        name: Option<String>,
        current_price: f64,
        predicted_price: f64,
        as_of: TradingDay,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("current_price", current_price)?;
        validate_non_negative("predicted_price", predicted_price)?;
        if current_price == 0.0 {
            return Err(ValidationError::ZeroCurrentPrice);
        }

        let change = predicted_price - current_price;
        let change_percent = change / current_price * 100.0;

        Ok(Self {
            ticker,
            name,
            current_price,
            predicted_price,
            change,
            change_percent,
            as_of,
        })
    }

    /// Display label: configured name when present, otherwise the ticker.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.ticker.as_str())
    }
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
