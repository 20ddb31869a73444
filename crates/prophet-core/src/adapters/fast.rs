use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use time::macros::date;
use time::Duration;

use crate::http_client::{HttpClient, HttpRequest, NoopHttpClient};
use crate::price_source::{PriceSource, SourceError};
use crate::{Bar, PriceSeries, SourceId, Ticker, TradingDay};

const CHART_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const CHART_TIMEOUT_MS: u64 = 15_000;

/// Primary source: the structured chart JSON API.
///
/// An upstream answer with no rows is returned as an empty `Ok` series, not
/// an error; the collector decides whether to fall back.
#[derive(Clone)]
pub struct FastSource {
    http_client: Arc<dyn HttpClient>,
}

impl Default for FastSource {
    fn default() -> Self {
        Self {
            http_client: Arc::new(NoopHttpClient),
        }
    }
}

impl FastSource {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }

    fn chart_url(ticker: &Ticker, lookback: usize) -> String {
        // Six months comfortably covers the default 90-bar lookback; widen
        // for larger requests.
        let range = if lookback <= 90 { "6mo" } else { "2y" };
        format!(
            "{CHART_BASE_URL}/{}?range={range}&interval=1d",
            urlencoding::encode(ticker.as_str())
        )
    }
}

impl PriceSource for FastSource {
    fn id(&self) -> SourceId {
        SourceId::Fast
    }

    fn fetch<'a>(
        &'a self,
        ticker: &'a Ticker,
        lookback: usize,
    ) -> Pin<Box<dyn Future<Output = Result<PriceSeries, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            if self.http_client.is_mock() {
                return Ok(synthetic_series(ticker, lookback));
            }

            let request = HttpRequest::get(Self::chart_url(ticker, lookback))
                .with_timeout_ms(CHART_TIMEOUT_MS);

            let response = self.http_client.execute(request).await.map_err(|error| {
                if error.timed_out() {
                    SourceError::timeout(format!("chart request timed out: {error}"))
                } else {
                    SourceError::network(format!("chart transport error: {error}"))
                }
            })?;

            if response.status == 404 {
                // Unknown symbols come back as 404; treat like an empty answer
                // so the slower source gets its chance.
                return Ok(PriceSeries::empty(ticker.clone()));
            }
            if !response.is_success() {
                return Err(SourceError::network(format!(
                    "chart upstream returned status {}",
                    response.status
                )));
            }

            parse_chart_payload(ticker, &response.body, lookback)
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartOuter,
}

#[derive(Debug, Deserialize)]
struct ChartOuter {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
    #[serde(default)]
    adjclose: Vec<ChartAdjClose>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct ChartAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn parse_chart_payload(
    ticker: &Ticker,
    body: &str,
    lookback: usize,
) -> Result<PriceSeries, SourceError> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|error| SourceError::parse(format!("chart payload is not valid JSON: {error}")))?;

    if let Some(error) = envelope.chart.error {
        if !error.is_null() {
            return Err(SourceError::network(format!(
                "chart upstream reported error: {error}"
            )));
        }
    }

    let Some(result) = envelope
        .chart
        .result
        .and_then(|mut results| (!results.is_empty()).then(|| results.remove(0)))
    else {
        return Ok(PriceSeries::empty(ticker.clone()));
    };

    let Some(quote) = result.indicators.quote.first() else {
        return Ok(PriceSeries::empty(ticker.clone()));
    };
    let adjclose = result.indicators.adjclose.first();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (index, seconds) in result.timestamp.iter().enumerate() {
        let (Some(open), Some(high), Some(low), Some(close)) = (
            value_at(&quote.open, index),
            value_at(&quote.high, index),
            value_at(&quote.low, index),
            value_at(&quote.close, index),
        ) else {
            // Null candles show up on half-session days; skip them.
            continue;
        };
        let volume = value_at(&quote.volume, index).unwrap_or(0);
        let adj = adjclose.and_then(|series| value_at(&series.adjclose, index));

        let Ok(date) = TradingDay::from_unix_timestamp(*seconds) else {
            tracing::debug!(ticker = %ticker, seconds, "skipping chart row with bad timestamp");
            continue;
        };

        match Bar::new(date, open, high, low, close, adj, volume) {
            Ok(bar) => bars.push(bar),
            Err(error) => {
                tracing::debug!(ticker = %ticker, %date, %error, "skipping inconsistent chart row");
            }
        }
    }

    let mut series = PriceSeries::from_unordered(ticker.clone(), bars);
    if series.len() > lookback {
        let excess = series.len() - lookback;
        series = PriceSeries::from_unordered(ticker.clone(), series.bars()[excess..].to_vec());
    }
    Ok(series)
}

fn value_at<T: Copy>(values: &[Option<T>], index: usize) -> Option<T> {
    values.get(index).copied().flatten()
}

/// Deterministic offline series used when the transport is a mock.
fn synthetic_series(ticker: &Ticker, lookback: usize) -> PriceSeries {
    let seed: u64 = ticker.as_str().bytes().map(u64::from).sum();
    let anchor = date!(2025 - 01 - 02);

    let mut bars = Vec::with_capacity(lookback);
    for index in 0..lookback {
        let base = 80.0 + ((seed + index as u64 * 7) % 400) as f64 / 10.0;
        let date = TradingDay::from(anchor + Duration::days(index as i64));
        let bar = Bar::new(
            date,
            base,
            base + 1.25,
            base - 0.85,
            base + 0.40,
            Some(base + 0.40),
            25_000 + (index as u64) * 50,
        )
        .expect("synthetic bar values are always consistent");
        bars.push(bar);
    }

    PriceSeries::from_unordered(ticker.clone(), bars)
}
