use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::{PredictionResult, UtcDateTime};

pub const DEFAULT_RANK_DEPTH: usize = 3;

/// Ranked outcome of one run.
///
/// Entries are sorted descending by percent change; the sort is stable so
/// ties keep their original ticker order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_at: UtcDateTime,
    pub entries: Vec<PredictionResult>,
    pub rank_depth: usize,
    pub mean_change_percent: Option<f64>,
}

impl Report {
    /// Highest-ranked predictions, best first.
    pub fn top(&self) -> &[PredictionResult] {
        let n = self.rank_depth.min(self.entries.len());
        &self.entries[..n]
    }

    /// Lowest-ranked predictions, worst first.
    pub fn bottom(&self) -> Vec<&PredictionResult> {
        let n = self.rank_depth.min(self.entries.len());
        self.entries.iter().rev().take(n).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Human-readable summary used for logs and notification payloads.
    pub fn summary_text(&self) -> String {
        if self.entries.is_empty() {
            return format!("Prediction run {}: no successful predictions", self.run_at);
        }

        let mut text = format!(
            "Prediction run {} ({} tickers)\n",
            self.run_at,
            self.entries.len()
        );

        text.push_str("Top:\n");
        for entry in self.top() {
            let _ = writeln!(
                text,
                "  {} {:+.2}% ({:.2} -> {:.2})",
                entry.label(),
                entry.change_percent,
                entry.current_price,
                entry.predicted_price
            );
        }

        text.push_str("Bottom:\n");
        for entry in self.bottom() {
            let _ = writeln!(
                text,
                "  {} {:+.2}% ({:.2} -> {:.2})",
                entry.label(),
                entry.change_percent,
                entry.current_price,
                entry.predicted_price
            );
        }

        if let Some(mean) = self.mean_change_percent {
            let _ = writeln!(text, "Mean change: {mean:+.2}%");
        }

        text
    }
}

/// Builds ranked reports from per-ticker prediction results.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    rank_depth: usize,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self {
            rank_depth: DEFAULT_RANK_DEPTH,
        }
    }
}

impl ReportBuilder {
    pub fn new(rank_depth: usize) -> Self {
        Self { rank_depth }
    }

    pub fn build(&self, mut predictions: Vec<PredictionResult>, run_at: UtcDateTime) -> Report {
        // Stable sort keeps input ticker order for equal percent changes.
        predictions.sort_by(|a, b| b.change_percent.total_cmp(&a.change_percent));

        let mean_change_percent = (!predictions.is_empty()).then(|| {
            predictions.iter().map(|p| p.change_percent).sum::<f64>() / predictions.len() as f64
        });

        Report {
            run_at,
            entries: predictions,
            rank_depth: self.rank_depth,
            mean_change_percent,
        }
    }
}
