use crate::{PriceSeries, TradingDay};

/// Model input columns, in the order the weight vector expects them.
pub const FEATURE_COLUMNS: [&str; 12] = [
    "Open",
    "High",
    "Low",
    "Close",
    "Volume",
    "SMA_5",
    "SMA_20",
    "RSI",
    "Return_1d",
    "Return_5d",
    "Volatility",
    "Volume_SMA",
];

const SMA_SHORT: usize = 5;
const SMA_LONG: usize = 20;
const RSI_PERIOD: usize = 14;
const RETURN_LONG: usize = 5;
const VOLATILITY_WINDOW: usize = 20;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const BOLLINGER_K: f64 = 2.0;

/// Earliest bar index with every rolling window populated. The volatility
/// window needs 20 one-day returns, which is the binding constraint.
const MIN_FEATURE_INDEX: usize = VOLATILITY_WINDOW;

/// One fully-populated indicator row for a single trading day.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: TradingDay,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub sma_5: f64,
    pub sma_20: f64,
    pub rsi: f64,
    pub return_1d: f64,
    pub return_5d: f64,
    pub volatility: f64,
    pub volume_sma: f64,
    pub macd: f64,
    pub bollinger_upper: f64,
    pub bollinger_lower: f64,
    /// Next day's close; present only on training rows.
    pub target: Option<f64>,
}

impl FeatureRow {
    /// Values in `FEATURE_COLUMNS` order.
    pub fn feature_vector(&self) -> [f64; 12] {
        [
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.sma_5,
            self.sma_20,
            self.rsi,
            self.return_1d,
            self.return_5d,
            self.volatility,
            self.volume_sma,
        ]
    }
}

/// Derive indicator rows from a price series.
///
/// Rows before every window is populated are dropped, as are rows whose RSI
/// is undefined (a flat 14-day stretch). With `for_training` each row gets
/// the next close as its target and the final bar is excluded because it
/// has no tomorrow yet.
pub fn compute_features(series: &PriceSeries, for_training: bool) -> Vec<FeatureRow> {
    let bars = series.bars();
    if bars.len() <= MIN_FEATURE_INDEX {
        return Vec::new();
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();

    let ema_fast = ema(&closes, MACD_FAST);
    let ema_slow = ema(&closes, MACD_SLOW);

    let last_index = if for_training {
        bars.len() - 1
    } else {
        bars.len()
    };

    let mut rows = Vec::with_capacity(last_index.saturating_sub(MIN_FEATURE_INDEX));
    for i in MIN_FEATURE_INDEX..last_index {
        let Some(rsi) = rsi_at(&closes, i) else {
            tracing::debug!(ticker = %series.ticker, index = i, "dropping row with undefined rsi");
            continue;
        };

        let sma_20 = mean(&closes[i + 1 - SMA_LONG..=i]);
        let band = BOLLINGER_K * sample_std(&closes[i + 1 - SMA_LONG..=i]);

        let returns: Vec<f64> = (i + 1 - VOLATILITY_WINDOW..=i)
            .map(|j| closes[j] / closes[j - 1] - 1.0)
            .collect();

        let bar = &bars[i];
        rows.push(FeatureRow {
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: volumes[i],
            sma_5: mean(&closes[i + 1 - SMA_SHORT..=i]),
            sma_20,
            rsi,
            return_1d: closes[i] / closes[i - 1] - 1.0,
            return_5d: closes[i] / closes[i - RETURN_LONG] - 1.0,
            volatility: sample_std(&returns),
            volume_sma: mean(&volumes[i + 1 - SMA_LONG..=i]),
            macd: ema_fast[i] - ema_slow[i],
            bollinger_upper: sma_20 + band,
            bollinger_lower: sma_20 - band,
            target: for_training.then(|| closes[i + 1]),
        });
    }

    rows
}

/// Rolling-mean RSI over the trailing 14 price changes.
///
/// Returns `None` when both average gain and average loss are zero; 100
/// when only losses are absent.
fn rsi_at(closes: &[f64], index: usize) -> Option<f64> {
    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for j in index + 1 - RSI_PERIOD..=index {
        let delta = closes[j] - closes[j - 1];
        if delta > 0.0 {
            gain_sum += delta;
        } else {
            loss_sum -= delta;
        }
    }

    let avg_gain = gain_sum / RSI_PERIOD as f64;
    let avg_loss = loss_sum / RSI_PERIOD as f64;

    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return None;
        }
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Exponential moving average seeded from the first value,
/// alpha = 2 / (span + 1).
fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut output = Vec::with_capacity(values.len());
    let mut current = match values.first() {
        Some(first) => *first,
        None => return output,
    };
    output.push(current);
    for value in &values[1..] {
        current = alpha * value + (1.0 - alpha) * current;
        output.push(current);
    }
    output
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values
        .iter()
        .map(|v| (v - avg) * (v - avg))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}
