use std::path::{Path, PathBuf};

use duckdb::{params, Connection, Statement};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{BarRecord, PredictionRecord};

/// Map a ticker to its bar table name: every non-alphanumeric character
/// becomes `_`.
///
/// The mapping is pure and total but not injective: `A.B` and `A-B` both
/// sanitize to `A_B`. When two configured tickers collide, the later one
/// overwrites the earlier one's bar table; callers that need uniqueness must
/// enforce it on the ticker list itself.
pub fn bar_table_name(ticker: &str) -> String {
    ticker
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// Keyed table store for collected price history and prediction runs.
///
/// A fresh connection is opened and closed around each operation; no
/// transaction spans more than one call, so a failure persisting one ticker
/// never poisons the next.
pub struct HistoryStore {
    db_path: PathBuf,
}

impl HistoryStore {
    /// Open the store, creating the database file and the
    /// `predictions_history` table if they do not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { db_path: path.into() };
        let conn = store.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS predictions_history (
                ticker TEXT NOT NULL,
                name TEXT,
                current_price DOUBLE NOT NULL,
                predicted_price DOUBLE NOT NULL,
                change DOUBLE NOT NULL,
                change_percent DOUBLE NOT NULL,
                as_of_date TEXT NOT NULL,
                run_at TEXT NOT NULL
            );",
        )?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        self.db_path.as_path()
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Connection::open(self.db_path.as_path())
            .map_err(|error| StoreError::Connection(error.to_string()))
    }

    /// Replace the bar table for one ticker with a freshly collected series.
    ///
    /// Bar tables hold only the latest collection window; prediction history
    /// is the append-only record, bars are working data.
    pub fn replace_bars(&self, ticker: &str, bars: &[BarRecord]) -> Result<usize, StoreError> {
        let table = bar_table_name(ticker);
        let conn = self.connect()?;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                date TEXT NOT NULL,
                open DOUBLE NOT NULL,
                high DOUBLE NOT NULL,
                low DOUBLE NOT NULL,
                close DOUBLE NOT NULL,
                adj_close DOUBLE,
                volume BIGINT NOT NULL
            );
            DELETE FROM \"{table}\";"
        ))?;

        let mut stmt = conn.prepare(&format!(
            "INSERT INTO \"{table}\" (date, open, high, low, close, adj_close, volume)
             VALUES (?, ?, ?, ?, ?, ?, ?)"
        ))?;
        for bar in bars {
            stmt.execute(params![
                bar.date,
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.adj_close,
                bar.volume as i64,
            ])?;
        }

        debug!(ticker, table, rows = bars.len(), "bar table replaced");
        Ok(bars.len())
    }

    /// Append one run's prediction records. Never touches prior runs.
    ///
    /// Records are appended one at a time; a record that fails validation or
    /// insertion is logged and skipped so the rest of the run's history still
    /// lands. Returns the number of rows actually appended.
    pub fn append_predictions(
        &self,
        records: &[PredictionRecord],
    ) -> Result<usize, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "INSERT INTO predictions_history
                 (ticker, name, current_price, predicted_price,
                  change, change_percent, as_of_date, run_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )?;

        let mut appended = 0;
        for record in records {
            if let Err(error) = append_prediction(&mut stmt, record) {
                warn!(ticker = %record.ticker, %error, "skipping prediction record");
                continue;
            }
            appended += 1;
        }

        debug!(
            rows = appended,
            skipped = records.len() - appended,
            "prediction history appended"
        );
        Ok(appended)
    }

    /// All persisted predictions for one ticker, oldest run first.
    pub fn prediction_history(&self, ticker: &str) -> Result<Vec<PredictionRecord>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT ticker, name, current_price, predicted_price,
                    change, change_percent, as_of_date, run_at
             FROM predictions_history
             WHERE ticker = ?
             ORDER BY run_at ASC",
        )?;

        let rows = stmt.query_map(params![ticker], |row| {
            Ok(PredictionRecord {
                ticker: row.get(0)?,
                name: row.get(1)?,
                current_price: row.get(2)?,
                predicted_price: row.get(3)?,
                change: row.get(4)?,
                change_percent: row.get(5)?,
                as_of_date: row.get(6)?,
                run_at: row.get(7)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Stored bar count for one ticker; zero when the table does not exist.
    pub fn bar_count(&self, ticker: &str) -> Result<usize, StoreError> {
        let table = bar_table_name(ticker);
        let conn = self.connect()?;

        let exists: usize = conn.query_row(
            "SELECT count(*) FROM information_schema.tables WHERE table_name = ?",
            params![table],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Ok(0);
        }

        let count: usize = conn.query_row(
            &format!("SELECT count(*) FROM \"{table}\""),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn append_prediction(
    stmt: &mut Statement<'_>,
    record: &PredictionRecord,
) -> Result<(), StoreError> {
    let prices = [
        record.current_price,
        record.predicted_price,
        record.change,
        record.change_percent,
    ];
    if prices.iter().any(|value| !value.is_finite()) {
        return Err(StoreError::InvalidData(format!(
            "non-finite price field for '{}'",
            record.ticker
        )));
    }

    stmt.execute(params![
        record.ticker,
        record.name,
        record.current_price,
        record.predicted_price,
        record.change,
        record.change_percent,
        record.as_of_date,
        record.run_at,
    ])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar(date: &str, close: f64) -> BarRecord {
        BarRecord {
            date: date.to_owned(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            adj_close: Some(close),
            volume: 1_000,
        }
    }

    fn sample_prediction(ticker: &str, run_at: &str) -> PredictionRecord {
        PredictionRecord {
            ticker: ticker.to_owned(),
            name: None,
            current_price: 100.0,
            predicted_price: 105.0,
            change: 5.0,
            change_percent: 5.0,
            as_of_date: "2025-08-01".to_owned(),
            run_at: run_at.to_owned(),
        }
    }

    #[test]
    fn sanitizes_ticker_to_table_name() {
        assert_eq!(bar_table_name("7203.T"), "7203_T");
        assert_eq!(bar_table_name("BRK-B"), "BRK_B");
        assert_eq!(bar_table_name("AAPL"), "AAPL");
    }

    #[test]
    fn replace_bars_overwrites_previous_window() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = HistoryStore::open(dir.path().join("history.db")).expect("open store");

        let first = vec![sample_bar("2025-08-01", 100.0), sample_bar("2025-08-02", 101.0)];
        store.replace_bars("7203.T", &first).expect("first write");
        assert_eq!(store.bar_count("7203.T").expect("count"), 2);

        let second = vec![sample_bar("2025-08-03", 102.0)];
        store.replace_bars("7203.T", &second).expect("second write");
        assert_eq!(store.bar_count("7203.T").expect("count"), 1);
    }

    #[test]
    fn append_predictions_keeps_prior_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = HistoryStore::open(dir.path().join("history.db")).expect("open store");

        store
            .append_predictions(&[sample_prediction("AAPL", "2025-08-01T07:00:00Z")])
            .expect("first run");
        store
            .append_predictions(&[sample_prediction("AAPL", "2025-08-02T07:00:00Z")])
            .expect("second run");

        let history = store.prediction_history("AAPL").expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].run_at, "2025-08-01T07:00:00Z");
        assert_eq!(history[1].run_at, "2025-08-02T07:00:00Z");
    }

    #[test]
    fn bad_record_is_skipped_and_the_rest_of_the_run_lands() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = HistoryStore::open(dir.path().join("history.db")).expect("open store");

        let mut poisoned = sample_prediction("MSFT", "2025-08-01T07:00:00Z");
        poisoned.predicted_price = f64::NAN;

        let appended = store
            .append_predictions(&[
                sample_prediction("AAPL", "2025-08-01T07:00:00Z"),
                poisoned,
                sample_prediction("GOOG", "2025-08-01T07:00:00Z"),
            ])
            .expect("append");

        assert_eq!(appended, 2);
        assert_eq!(store.prediction_history("AAPL").expect("history").len(), 1);
        assert_eq!(store.prediction_history("GOOG").expect("history").len(), 1);
        assert!(store.prediction_history("MSFT").expect("history").is_empty());
    }

    #[test]
    fn bar_count_is_zero_for_unknown_ticker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = HistoryStore::open(dir.path().join("history.db")).expect("open store");
        assert_eq!(store.bar_count("MSFT").expect("count"), 0);
    }
}
