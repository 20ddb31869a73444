//! DuckDB-backed storage for prophet prediction runs.
//!
//! Two kinds of tables live in one database file:
//!
//! - one bar table per ticker (name derived by [`bar_table_name`]), replaced
//!   with the latest collection window on every run;
//! - the append-only `predictions_history` table, one row per
//!   `(ticker, run timestamp)`.
//!
//! Connections are opened and closed around each operation so a failure for
//! one ticker never holds a transaction open across the batch.

mod error;
mod models;
mod repository;

pub use error::StoreError;
pub use models::{BarRecord, PredictionRecord};
pub use repository::{bar_table_name, HistoryStore};
