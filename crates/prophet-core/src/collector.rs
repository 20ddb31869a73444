use std::sync::Arc;

use crate::price_source::PriceSource;
use crate::{PriceSeries, SourceId, Ticker};

/// Successful acquisition for one ticker.
#[derive(Debug, Clone)]
pub struct CollectionResult {
    pub ticker: Ticker,
    pub series: PriceSeries,
    pub source: SourceId,
}

/// Acquisition failure after every source was tried.
#[derive(Debug, Clone)]
pub struct CollectionFailure {
    pub ticker: Ticker,
    pub reason: String,
}

/// Batch acquisition outcome; successes and failures both preserve the
/// input ticker order.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub results: Vec<CollectionResult>,
    pub failures: Vec<CollectionFailure>,
}

/// Tries each source in priority order until one yields a non-empty series.
///
/// An `Ok` but empty answer from a source counts as a miss and triggers the
/// next source; a later source is never contacted once an earlier one has
/// delivered rows.
pub struct FallbackCollector {
    sources: Vec<Arc<dyn PriceSource>>,
    lookback: usize,
}

impl FallbackCollector {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, lookback: usize) -> Self {
        Self { sources, lookback }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub async fn collect(&self, ticker: &Ticker) -> Result<CollectionResult, CollectionFailure> {
        let mut attempts: Vec<String> = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            match source.fetch(ticker, self.lookback).await {
                Ok(series) if !series.is_empty() => {
                    if !attempts.is_empty() {
                        tracing::info!(
                            ticker = %ticker,
                            source = %source.id(),
                            failed_attempts = attempts.len(),
                            "fallback source delivered history"
                        );
                    }
                    return Ok(CollectionResult {
                        ticker: ticker.clone(),
                        series,
                        source: source.id(),
                    });
                }
                Ok(_) => {
                    tracing::warn!(ticker = %ticker, source = %source.id(), "source returned no rows");
                    attempts.push(format!("{}: returned no rows", source.id()));
                }
                Err(error) => {
                    tracing::warn!(ticker = %ticker, source = %source.id(), %error, "source attempt failed");
                    attempts.push(format!("{}: {error}", source.id()));
                }
            }
        }

        Err(CollectionFailure {
            ticker: ticker.clone(),
            reason: failure_reason(&attempts),
        })
    }

    /// Collect every ticker in order, then release all source sessions.
    ///
    /// Sessions are closed even when every ticker fails; a browser session
    /// must never outlive the batch that opened it.
    pub async fn collect_all(&self, tickers: &[Ticker]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for ticker in tickers {
            match self.collect(ticker).await {
                Ok(result) => outcome.results.push(result),
                Err(failure) => outcome.failures.push(failure),
            }
        }

        for source in &self.sources {
            source.close().await;
        }

        outcome
    }
}

fn failure_reason(attempts: &[String]) -> String {
    if attempts.is_empty() {
        return String::from("no sources configured");
    }
    format!("all sources exhausted ({})", attempts.join("; "))
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::price_source::{SourceError, SourceErrorKind};
    use crate::{Bar, TradingDay};

    struct StubSource {
        id: SourceId,
        bars: usize,
        error: Option<SourceErrorKind>,
        calls: AtomicUsize,
        closes: AtomicUsize,
    }

    impl StubSource {
        fn ok(id: SourceId, bars: usize) -> Self {
            Self {
                id,
                bars,
                error: None,
                calls: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }
        }

        fn failing(id: SourceId, kind: SourceErrorKind) -> Self {
            Self {
                id,
                bars: 0,
                error: Some(kind),
                calls: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }
        }

        fn series(&self, ticker: &Ticker) -> PriceSeries {
            let anchor = time::macros::date!(2025 - 01 - 02);
            let bars = (0..self.bars)
                .map(|i| {
                    let date = TradingDay::from(anchor + time::Duration::days(i as i64));
                    Bar::new(date, 10.0, 11.0, 9.0, 10.5, None, 100).expect("bar")
                })
                .collect();
            PriceSeries::from_unordered(ticker.clone(), bars)
        }
    }

    impl PriceSource for StubSource {
        fn id(&self) -> SourceId {
            self.id
        }

        fn fetch<'a>(
            &'a self,
            ticker: &'a Ticker,
            _lookback: usize,
        ) -> Pin<Box<dyn Future<Output = Result<PriceSeries, SourceError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = match self.error {
                Some(kind) => Err(SourceError::new(kind, "stub failure")),
                None => Ok(self.series(ticker)),
            };
            Box::pin(async move { answer })
        }

        fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }
    }

    fn ticker(s: &str) -> Ticker {
        Ticker::parse(s).expect("ticker")
    }

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
            .block_on(future)
    }

    #[test]
    fn first_source_success_skips_fallback() {
        let fast = Arc::new(StubSource::ok(SourceId::Fast, 5));
        let browser = Arc::new(StubSource::ok(SourceId::Browser, 5));
        let collector =
            FallbackCollector::new(vec![fast.clone() as Arc<dyn PriceSource>, browser.clone()], 90);

        let result = block_on(collector.collect(&ticker("AAPL"))).expect("collect");

        assert_eq!(result.source, SourceId::Fast);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_series_triggers_fallback() {
        let fast = Arc::new(StubSource::ok(SourceId::Fast, 0));
        let browser = Arc::new(StubSource::ok(SourceId::Browser, 3));
        let collector =
            FallbackCollector::new(vec![fast as Arc<dyn PriceSource>, browser], 90);

        let result = block_on(collector.collect(&ticker("AAPL"))).expect("collect");

        assert_eq!(result.source, SourceId::Browser);
        assert_eq!(result.series.len(), 3);
    }

    #[test]
    fn exhausted_sources_report_every_attempt() {
        let fast = Arc::new(StubSource::failing(SourceId::Fast, SourceErrorKind::Timeout));
        let browser = Arc::new(StubSource::failing(SourceId::Browser, SourceErrorKind::Network));
        let collector =
            FallbackCollector::new(vec![fast as Arc<dyn PriceSource>, browser], 90);

        let failure = block_on(collector.collect(&ticker("AAPL"))).expect_err("must fail");

        assert!(failure.reason.contains("all sources exhausted"));
        assert!(failure.reason.contains("fast: timeout"));
        assert!(failure.reason.contains("browser: network"));
    }

    #[test]
    fn batch_preserves_order_and_closes_sources() {
        let fast = Arc::new(StubSource::ok(SourceId::Fast, 5));
        let browser = Arc::new(StubSource::ok(SourceId::Browser, 5));
        let collector = FallbackCollector::new(
            vec![fast.clone() as Arc<dyn PriceSource>, browser.clone()],
            90,
        );

        let tickers = vec![ticker("MSFT"), ticker("AAPL"), ticker("7203.T")];
        let outcome = block_on(collector.collect_all(&tickers));

        let order: Vec<&str> = outcome
            .results
            .iter()
            .map(|r| r.ticker.as_str())
            .collect();
        assert_eq!(order, vec!["MSFT", "AAPL", "7203.T"]);
        assert_eq!(fast.closes.load(Ordering::SeqCst), 1);
        assert_eq!(browser.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sessions_close_even_when_all_tickers_fail() {
        let fast = Arc::new(StubSource::failing(SourceId::Fast, SourceErrorKind::Network));
        let collector = FallbackCollector::new(vec![fast.clone() as Arc<dyn PriceSource>], 90);

        let outcome = block_on(collector.collect_all(&[ticker("AAPL")]));

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(fast.closes.load(Ordering::SeqCst), 1);
    }
}
