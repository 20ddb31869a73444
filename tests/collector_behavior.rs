//! Behavior tests for the dual-source fallback collector.
//!
//! These verify the user-visible acquisition contract: the fast source wins
//! whenever it delivers, the browser only works when needed, and one bad
//! ticker never takes down the batch.

use std::sync::Arc;

use prophet_core::{BrowserSource, FallbackCollector, PriceSource, SourceId};
use prophet_tests::{rising_series, ticker, ScriptedSource};

// =============================================================================
// Fallback short-circuit
// =============================================================================

#[tokio::test]
async fn when_fast_source_delivers_browser_is_never_contacted() {
    // Given: both sources would answer
    let fast = Arc::new(ScriptedSource::delivering(SourceId::Fast, 90));
    let browser = Arc::new(ScriptedSource::delivering(SourceId::Browser, 90));
    let collector = FallbackCollector::new(
        vec![fast.clone() as Arc<dyn PriceSource>, browser.clone()],
        90,
    );

    // When: a ticker is collected
    let result = collector.collect(&ticker("AAPL")).await.expect("collect");

    // Then: the fast source won and the browser stayed idle
    assert_eq!(result.source, SourceId::Fast);
    assert_eq!(fast.call_count(), 1);
    assert_eq!(browser.call_count(), 0);
}

#[tokio::test]
async fn when_fast_source_is_empty_browser_provides_history() {
    let fast = Arc::new(ScriptedSource::empty(SourceId::Fast));
    let browser = Arc::new(ScriptedSource::delivering(SourceId::Browser, 60));
    let collector = FallbackCollector::new(
        vec![fast as Arc<dyn PriceSource>, browser.clone()],
        90,
    );

    let result = collector.collect(&ticker("AAPL")).await.expect("collect");

    assert_eq!(result.source, SourceId::Browser);
    assert_eq!(result.series.len(), 60);
    assert_eq!(browser.call_count(), 1);
}

// =============================================================================
// Batch tolerance
// =============================================================================

#[tokio::test]
async fn when_one_ticker_fails_everywhere_the_batch_still_completes() {
    // Given: MSFT fails on both sources
    let fast = Arc::new(ScriptedSource::delivering(SourceId::Fast, 90).failing_for("MSFT"));
    let browser = Arc::new(ScriptedSource::delivering(SourceId::Browser, 90).failing_for("MSFT"));
    let collector = FallbackCollector::new(
        vec![fast as Arc<dyn PriceSource>, browser],
        90,
    );

    let tickers = vec![ticker("AAPL"), ticker("MSFT"), ticker("7203.T")];
    let outcome = collector.collect_all(&tickers).await;

    // Then: N-1 successes and one failure marker, input order preserved
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].ticker.as_str(), "MSFT");
    assert!(outcome.failures[0].reason.contains("all sources exhausted"));
    let order: Vec<&str> = outcome.results.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(order, vec!["AAPL", "7203.T"]);
}

#[tokio::test]
async fn browser_session_is_released_after_the_batch() {
    let fast = Arc::new(ScriptedSource::delivering(SourceId::Fast, 90));
    let browser = Arc::new(ScriptedSource::empty(SourceId::Browser));
    let collector = FallbackCollector::new(
        vec![fast.clone() as Arc<dyn PriceSource>, browser.clone()],
        90,
    );

    collector.collect_all(&[ticker("AAPL"), ticker("MSFT")]).await;

    assert_eq!(fast.close_count(), 1);
    assert_eq!(browser.close_count(), 1);
}

#[tokio::test]
async fn session_release_happens_even_when_every_ticker_fails() {
    let fast = Arc::new(
        ScriptedSource::delivering(SourceId::Fast, 90)
            .failing_for("AAPL")
            .failing_for("MSFT"),
    );
    let collector = FallbackCollector::new(vec![fast.clone() as Arc<dyn PriceSource>], 90);

    let outcome = collector.collect_all(&[ticker("AAPL"), ticker("MSFT")]).await;

    assert!(outcome.results.is_empty());
    assert_eq!(outcome.failures.len(), 2);
    assert_eq!(fast.close_count(), 1);
}

// =============================================================================
// Scraped-page parsing through the real browser source
// =============================================================================

#[tokio::test]
async fn scraped_page_rows_become_an_ascending_series() {
    // The default browser source renders a fixed offline history page with
    // newest-first rows and one dividend row.
    let source = BrowserSource::default();
    let series = source.fetch(&ticker("AAPL"), 90).await.expect("series");

    assert_eq!(series.len(), 4);
    let dates: Vec<String> = series.bars().iter().map(|b| b.date.format_iso()).collect();
    let mut sorted = dates.clone();
    sorted.sort();
    assert_eq!(dates, sorted);
}

#[tokio::test]
async fn collected_series_matches_fixture_shape() {
    let series = rising_series("AAPL", 90);
    assert_eq!(series.len(), 90);
    assert_eq!(series.last().expect("bar").close, 189.0);
}
