use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::{PriceSeries, SourceId, Ticker};

/// Failure category reported by a price source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// The source did not answer within its deadline.
    Timeout,
    /// The source answered but returned no usable rows.
    Empty,
    /// The payload could not be decoded into bars.
    Parse,
    /// Transport-level failure (connect, DNS, non-success status).
    Network,
}

impl SourceErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Empty => "empty",
            Self::Parse => "parse",
            Self::Network => "network",
        }
    }
}

/// Error raised by a single source attempt for one ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Timeout, message)
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Empty, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Parse, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Network, message)
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for SourceError {}

type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Contract implemented by every price history source.
///
/// `fetch` returns up to `lookback` daily bars in ascending date order. An
/// `Ok` series may legitimately be shorter than `lookback` when the listing
/// is young; callers decide whether that is enough.
pub trait PriceSource: Send + Sync {
    fn id(&self) -> SourceId;

    fn fetch<'a>(&'a self, ticker: &'a Ticker, lookback: usize) -> SourceFuture<'a, PriceSeries>;

    /// Release any session state held across a batch. Default is a no-op for
    /// stateless sources.
    fn close<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}
