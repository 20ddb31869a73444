use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::http_client::HttpError;
use crate::price_source::{PriceSource, SourceError};
use crate::{Bar, PriceSeries, SourceId, Ticker, TradingDay};

const HISTORY_BASE_URL: &str = "https://finance.yahoo.com/quote";
const PAGE_TIMEOUT: Duration = Duration::from_secs(45);

/// Minimum delay between page loads within one browser session.
const PAGE_DELAY: Duration = Duration::from_secs(1);

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rendered-page transport held open across a batch of tickers.
///
/// Implementations keep whatever session state they need (cookies, a live
/// browser process) between `render` calls; `shutdown` releases it.
pub trait BrowserClient: Send + Sync {
    fn render<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, HttpError>> + Send + 'a>>;

    fn shutdown<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }

    fn is_mock(&self) -> bool {
        false
    }
}

/// Offline browser that renders a small fixed history page.
#[derive(Debug, Default)]
pub struct NoopBrowserClient;

const NOOP_HISTORY_PAGE: &str = r#"<table>
<tr><th>Date</th><th>Open</th><th>High</th><th>Low</th><th>Close</th><th>Adj Close</th><th>Volume</th></tr>
<tr><td>Jan 8, 2025</td><td>103.20</td><td>104.10</td><td>102.50</td><td>103.80</td><td>103.80</td><td>1,250,000</td></tr>
<tr><td>Jan 7, 2025</td><td>102.00</td><td>103.60</td><td>101.70</td><td>103.10</td><td>103.10</td><td>1,180,000</td></tr>
<tr><td>Jan 6, 2025</td><td colspan="6">0.25 Dividend</td></tr>
<tr><td>Jan 3, 2025</td><td>101.40</td><td>102.40</td><td>100.90</td><td>102.10</td><td>102.10</td><td>990,000</td></tr>
<tr><td>Jan 2, 2025</td><td>100.00</td><td>101.80</td><td>99.60</td><td>101.30</td><td>101.30</td><td>1,020,000</td></tr>
</table>"#;

impl BrowserClient for NoopBrowserClient {
    fn render<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, HttpError>> + Send + 'a>> {
        let _ = url;
        Box::pin(async move { Ok(NOOP_HISTORY_PAGE.to_owned()) })
    }

    fn is_mock(&self) -> bool {
        true
    }
}

/// Production browser client: fetches the history page over HTTP with a
/// desktop browser user agent and a persistent cookie session.
#[derive(Debug, Clone)]
pub struct HttpBrowserClient {
    client: Arc<reqwest::Client>,
}

impl HttpBrowserClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(
                        "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
                    )
                    .cookie_store(true)
                    .timeout(PAGE_TIMEOUT)
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }
}

impl Default for HttpBrowserClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserClient for HttpBrowserClient {
    fn render<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self.client.get(url).send().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::timeout(format!("page load timed out: {e}"))
                } else {
                    HttpError::new(format!("page load failed: {e}"))
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(HttpError::new(format!(
                    "history page returned status {status}"
                )));
            }

            response
                .text()
                .await
                .map_err(|e| HttpError::new(format!("failed to read page body: {e}")))
        })
    }
}

/// Fallback source: scrapes the rendered history table.
///
/// Page loads within a batch are paced so the session stays below upstream
/// rate limits. Failing to parse any row is an error here, unlike the fast
/// source, because this is the last line of defense.
#[derive(Clone)]
pub struct BrowserSource {
    browser: Arc<dyn BrowserClient>,
    limiter: Arc<DirectRateLimiter>,
}

impl Default for BrowserSource {
    fn default() -> Self {
        Self::new(Arc::new(NoopBrowserClient))
    }
}

impl BrowserSource {
    pub fn new(browser: Arc<dyn BrowserClient>) -> Self {
        let quota = Quota::with_period(PAGE_DELAY)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Self {
            browser,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    fn history_url(ticker: &Ticker) -> String {
        let encoded = urlencoding::encode(ticker.as_str());
        format!("{HISTORY_BASE_URL}/{encoded}/history?p={encoded}")
    }
}

impl PriceSource for BrowserSource {
    fn id(&self) -> SourceId {
        SourceId::Browser
    }

    fn fetch<'a>(
        &'a self,
        ticker: &'a Ticker,
        lookback: usize,
    ) -> Pin<Box<dyn Future<Output = Result<PriceSeries, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            self.limiter.until_ready().await;

            let url = Self::history_url(ticker);
            let html = self.browser.render(&url).await.map_err(|error| {
                if error.timed_out() {
                    SourceError::timeout(format!("history page timed out: {error}"))
                } else {
                    SourceError::network(format!("history page failed: {error}"))
                }
            })?;

            let bars = parse_history_table(ticker, &html, lookback)?;
            if bars.is_empty() {
                return Err(SourceError::empty("history page had no parseable rows"));
            }

            Ok(PriceSeries::from_unordered(ticker.clone(), bars))
        })
    }

    fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.browser.shutdown().await;
        })
    }
}

/// Extract OHLCV rows from the rendered history table.
///
/// Rows are listed newest first; we keep at most `lookback` data rows from
/// the top, skipping corporate-action rows (Dividend, Stock Split) and rows
/// whose price cells hold the `-` placeholder.
fn parse_history_table(
    ticker: &Ticker,
    html: &str,
    lookback: usize,
) -> Result<Vec<Bar>, SourceError> {
    let mut bars = Vec::new();

    for row in table_rows(html) {
        if bars.len() >= lookback {
            break;
        }

        let cells = row_cells(row);
        if cells.len() < 7 {
            // Header rows and corporate-action rows never span 7 cells.
            continue;
        }
        if cells.iter().any(|c| c.contains("Dividend") || c.contains("Split")) {
            continue;
        }

        let Ok(date) = TradingDay::parse_scraped(&cells[0]) else {
            tracing::debug!(ticker = %ticker, cell = %cells[0], "skipping row with unparseable date");
            continue;
        };

        let (Some(open), Some(high), Some(low), Some(close)) = (
            parse_price_cell(&cells[1]),
            parse_price_cell(&cells[2]),
            parse_price_cell(&cells[3]),
            parse_price_cell(&cells[4]),
        ) else {
            // A `-` in any price cell means the row carries no usable candle.
            continue;
        };
        let adj_close = parse_price_cell(&cells[5]);
        let volume = parse_volume_cell(&cells[6]);

        match Bar::new(date, open, high, low, close, adj_close, volume) {
            Ok(bar) => bars.push(bar),
            Err(error) => {
                tracing::debug!(ticker = %ticker, %date, %error, "skipping inconsistent scraped row");
            }
        }
    }

    Ok(bars)
}

/// Iterate over the inner HTML of each `<tr>` element.
fn table_rows(html: &str) -> impl Iterator<Item = &str> {
    html.split("<tr").skip(1).filter_map(|chunk| {
        let body = chunk.split_once('>')?.1;
        Some(body.split("</tr>").next().unwrap_or(body))
    })
}

/// Extract the text content of each `<td>` cell within a row.
fn row_cells(row: &str) -> Vec<String> {
    row.split("<td")
        .skip(1)
        .filter_map(|chunk| {
            let body = chunk.split_once('>')?.1;
            let inner = body.split("</td>").next().unwrap_or(body);
            Some(strip_tags(inner))
        })
        .collect()
}

/// Drop nested markup, keeping only text content.
fn strip_tags(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.trim().to_owned()
}

/// Parse a price cell; `-` marks a missing value, thousands separators are
/// rendered as commas.
fn parse_price_cell(cell: &str) -> Option<f64> {
    let cleaned = cell.trim().replace(',', "");
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.parse().ok()
}

/// Volume cells use `-` for zero-volume sessions.
fn parse_volume_cell(cell: &str) -> u64 {
    let cleaned = cell.trim().replace(',', "");
    if cleaned.is_empty() || cleaned == "-" {
        return 0;
    }
    cleaned.parse().unwrap_or(0)
}
