use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use prophet_warehouse::{BarRecord, HistoryStore, PredictionRecord};

use crate::collector::FallbackCollector;
use crate::notify::Notifier;
use crate::prediction::PredictionEngine;
use crate::report::{Report, ReportBuilder};
use crate::resource::{ResourceError, ResourceGuard, ResourceSnapshot};
use crate::{Bar, PredictionResult, PriceSeries, Ticker, UtcDateTime};

/// One configured instrument: the ticker plus an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub ticker: Ticker,
    pub name: Option<String>,
}

impl Instrument {
    pub fn new(ticker: Ticker, name: Option<String>) -> Self {
        Self { ticker, name }
    }
}

/// Fatal run failure. Everything per-ticker is absorbed into the summary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resources(#[from] ResourceError),

    #[error("no predictions succeeded across {attempted} tickers")]
    NoPredictions { attempted: usize },
}

/// What one run did, for logs and the CLI.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: Report,
    pub collected: usize,
    pub collection_failures: Vec<String>,
    pub prediction_failures: Vec<String>,
    pub resource_warnings: Vec<String>,
}

/// Sequential orchestration of one prediction run.
///
/// Stages: resource gate, batch collection, per-ticker bar persistence,
/// per-ticker prediction, ranking, history append, notification. Only the
/// resource gate is fatal up front; a run with zero surviving predictions
/// fails at the end, after the empty report has been logged.
pub struct Pipeline {
    guard: ResourceGuard,
    collector: FallbackCollector,
    engine: PredictionEngine,
    report_builder: ReportBuilder,
    notifier: Arc<dyn Notifier>,
    store: Option<HistoryStore>,
}

impl Pipeline {
    pub fn new(
        guard: ResourceGuard,
        collector: FallbackCollector,
        engine: PredictionEngine,
        report_builder: ReportBuilder,
        notifier: Arc<dyn Notifier>,
        store: Option<HistoryStore>,
    ) -> Self {
        Self {
            guard,
            collector,
            engine,
            report_builder,
            notifier,
            store,
        }
    }

    pub async fn run(
        &self,
        instruments: &[Instrument],
        snapshot: &ResourceSnapshot,
    ) -> Result<RunSummary, PipelineError> {
        self.guard.check(snapshot)?;

        let resource_warnings = self.guard.usage_warnings(snapshot);
        for warning in &resource_warnings {
            warn!("{warning}");
        }

        let tickers: Vec<Ticker> = instruments.iter().map(|i| i.ticker.clone()).collect();
        let outcome = self.collector.collect_all(&tickers).await;

        let collection_failures: Vec<String> = outcome
            .failures
            .iter()
            .map(|failure| format!("{}: {}", failure.ticker, failure.reason))
            .collect();

        let run_at = UtcDateTime::now();
        let mut predictions = Vec::with_capacity(outcome.results.len());
        let mut prediction_failures = Vec::new();

        for result in &outcome.results {
            self.persist_bars(&result.ticker, &result.series);

            let name = instruments
                .iter()
                .find(|i| i.ticker == result.ticker)
                .and_then(|i| i.name.clone());

            match self
                .engine
                .predict_for_ticker(&result.ticker, name, &result.series)
            {
                Ok(prediction) => {
                    info!(
                        ticker = %prediction.ticker,
                        source = %result.source,
                        change_percent = prediction.change_percent,
                        "prediction complete"
                    );
                    predictions.push(prediction);
                }
                Err(error) => {
                    warn!(ticker = %result.ticker, %error, "prediction skipped");
                    prediction_failures.push(format!("{}: {error}", result.ticker));
                }
            }
        }

        let report = self.report_builder.build(predictions, run_at);
        info!("{}", report.summary_text());

        if report.is_empty() {
            return Err(PipelineError::NoPredictions {
                attempted: instruments.len(),
            });
        }

        self.persist_predictions(&report, run_at);

        if let Err(error) = self.notifier.notify(&report).await {
            warn!(%error, "notification delivery failed");
        }

        Ok(RunSummary {
            collected: outcome.results.len(),
            report,
            collection_failures,
            prediction_failures,
            resource_warnings,
        })
    }

    fn persist_bars(&self, ticker: &Ticker, series: &PriceSeries) {
        let Some(store) = &self.store else {
            return;
        };

        let records: Vec<BarRecord> = series.bars().iter().map(bar_record).collect();
        if let Err(error) = store.replace_bars(ticker.as_str(), &records) {
            warn!(ticker = %ticker, %error, "failed to persist bars");
        }
    }

    fn persist_predictions(&self, report: &Report, run_at: UtcDateTime) {
        let Some(store) = &self.store else {
            return;
        };

        let records: Vec<PredictionRecord> = report
            .entries
            .iter()
            .map(|entry| prediction_record(entry, run_at))
            .collect();
        if let Err(error) = store.append_predictions(&records) {
            warn!(%error, "failed to append prediction history");
        }
    }
}

fn bar_record(bar: &Bar) -> BarRecord {
    BarRecord {
        date: bar.date.format_iso(),
        open: bar.open,
        high: bar.high,
        low: bar.low,
        close: bar.close,
        adj_close: bar.adj_close,
        volume: bar.volume,
    }
}

fn prediction_record(entry: &PredictionResult, run_at: UtcDateTime) -> PredictionRecord {
    PredictionRecord {
        ticker: entry.ticker.as_str().to_owned(),
        name: entry.name.clone(),
        current_price: entry.current_price,
        predicted_price: entry.predicted_price,
        change: entry.change,
        change_percent: entry.change_percent,
        as_of_date: entry.as_of.format_iso(),
        run_at: run_at.format_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use time::macros::date;
    use time::Duration;

    use super::*;
    use crate::features::FeatureRow;
    use crate::notify::NotifyError;
    use crate::prediction::{PredictError, Predictor};
    use crate::price_source::{PriceSource, SourceError};
    use crate::{SourceId, TradingDay};

    struct StubSource {
        fail_for: Option<&'static str>,
        bars: usize,
        calls: AtomicUsize,
        closes: AtomicUsize,
    }

    impl StubSource {
        fn new(bars: usize) -> Self {
            Self {
                fail_for: None,
                bars,
                calls: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }
        }

        fn failing_for(ticker: &'static str, bars: usize) -> Self {
            Self {
                fail_for: Some(ticker),
                ..Self::new(bars)
            }
        }
    }

    impl PriceSource for StubSource {
        fn id(&self) -> SourceId {
            SourceId::Fast
        }

        fn fetch<'a>(
            &'a self,
            ticker: &'a Ticker,
            _lookback: usize,
        ) -> Pin<Box<dyn Future<Output = Result<PriceSeries, SourceError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = if self.fail_for == Some(ticker.as_str()) {
                Err(SourceError::network("stub outage"))
            } else {
                let anchor = date!(2025 - 01 - 02);
                let bars = (0..self.bars)
                    .map(|i| {
                        let close = 100.0 + i as f64;
                        let day = TradingDay::from(anchor + Duration::days(i as i64));
                        Bar::new(day, close, close + 1.0, close - 1.0, close, None, 1_000)
                            .expect("bar")
                    })
                    .collect();
                Ok(PriceSeries::from_unordered(ticker.clone(), bars))
            };
            Box::pin(async move { answer })
        }

        fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }
    }

    struct StubPredictor;

    impl Predictor for StubPredictor {
        fn predict(&self, row: &FeatureRow) -> Result<f64, PredictError> {
            Ok(row.close * 1.01)
        }
    }

    struct CountingNotifier {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Notifier for CountingNotifier {
        fn notify<'a>(
            &'a self,
            _report: &'a Report,
        ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(NotifyError::Transport(String::from("stub down")))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn instruments(tickers: &[&str]) -> Vec<Instrument> {
        tickers
            .iter()
            .map(|t| Instrument::new(Ticker::parse(t).expect("ticker"), None))
            .collect()
    }

    fn healthy_snapshot() -> ResourceSnapshot {
        ResourceSnapshot {
            total_memory_bytes: 16 * 1024 * 1024 * 1024,
            available_memory_bytes: 8 * 1024 * 1024 * 1024,
            cpu_percent: 10.0,
        }
    }

    fn pipeline_with(
        source: Arc<StubSource>,
        notifier: Arc<CountingNotifier>,
        store: Option<HistoryStore>,
    ) -> Pipeline {
        Pipeline::new(
            ResourceGuard::default(),
            FallbackCollector::new(vec![source as Arc<dyn PriceSource>], 90),
            PredictionEngine::new(Arc::new(StubPredictor)),
            ReportBuilder::default(),
            notifier as Arc<dyn Notifier>,
            store,
        )
    }

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
            .block_on(future)
    }

    #[test]
    fn resource_gate_blocks_before_any_collection() {
        let source = Arc::new(StubSource::new(90));
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let pipeline = pipeline_with(source.clone(), notifier, None);

        let starved = ResourceSnapshot {
            total_memory_bytes: 16 * 1024 * 1024 * 1024,
            available_memory_bytes: 100 * 1024 * 1024,
            cpu_percent: 10.0,
        };
        let err = block_on(pipeline.run(&instruments(&["AAPL"]), &starved))
            .expect_err("must be gated");

        assert!(matches!(err, PipelineError::Resources(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn one_failing_ticker_does_not_abort_the_batch() {
        let source = Arc::new(StubSource::failing_for("MSFT", 90));
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let pipeline = pipeline_with(source.clone(), notifier.clone(), None);

        let summary = block_on(
            pipeline.run(&instruments(&["AAPL", "MSFT", "7203.T"]), &healthy_snapshot()),
        )
        .expect("run");

        assert_eq!(summary.collected, 2);
        assert_eq!(summary.report.entries.len(), 2);
        assert_eq!(summary.collection_failures.len(), 1);
        assert!(summary.collection_failures[0].starts_with("MSFT:"));
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn short_history_is_skipped_not_fatal() {
        let source = Arc::new(StubSource::new(30));
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let pipeline = pipeline_with(source, notifier, None);

        let err = block_on(pipeline.run(&instruments(&["AAPL"]), &healthy_snapshot()))
            .expect_err("zero predictions");

        assert!(matches!(err, PipelineError::NoPredictions { attempted: 1 }));
    }

    #[test]
    fn notifier_failure_is_swallowed() {
        let source = Arc::new(StubSource::new(90));
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let pipeline = pipeline_with(source, notifier.clone(), None);

        let summary = block_on(pipeline.run(&instruments(&["AAPL"]), &healthy_snapshot()))
            .expect("run survives notifier outage");

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.report.entries.len(), 1);
    }

    #[test]
    fn persists_bars_and_prediction_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = HistoryStore::open(dir.path().join("prophet.duckdb")).expect("store");

        let source = Arc::new(StubSource::new(90));
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let pipeline = pipeline_with(source, notifier, Some(store));

        let summary = block_on(pipeline.run(&instruments(&["7203.T"]), &healthy_snapshot()))
            .expect("run");
        assert_eq!(summary.report.entries.len(), 1);

        let store = HistoryStore::open(dir.path().join("prophet.duckdb")).expect("store");
        assert_eq!(store.bar_count("7203.T").expect("count"), 90);
        let history = store.prediction_history("7203.T").expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].ticker, "7203.T");
    }
}
