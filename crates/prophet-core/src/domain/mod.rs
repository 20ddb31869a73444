mod date;
mod models;
mod ticker;

pub use date::{TradingDay, UtcDateTime};
pub use models::{Bar, PredictionResult, PriceSeries};
pub use ticker::Ticker;
