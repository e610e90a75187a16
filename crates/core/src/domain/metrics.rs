use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-ticker risk/return statistics as of a single date.
///
/// One row per (ticker, as_of_date, window_months); the whole set for a run
/// shares the dataset-maximum as_of_date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ticker: String,
    pub as_of_date: NaiveDate,
    pub window_months: i32,
    pub mean_daily_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub downside_deviation: f64,
    /// Worst peak-to-trough decline over the trailing window, as a
    /// negative fraction. Consumers wanting magnitude must take abs().
    pub max_drawdown: f64,
    pub momentum: f64,
    pub trading_days: i32,
}

/// Metric values for a single ticker, before the run stamps ticker,
/// as-of date, and window onto them.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerMetrics {
    pub mean_daily_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub downside_deviation: f64,
    pub max_drawdown: f64,
    pub momentum: f64,
    pub trading_days: usize,
}

/// Outcome of evaluating one ticker's history. Ineligible tickers are a
/// normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum TickerEvaluation {
    Eligible(TickerMetrics),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    InsufficientHistory { observed: usize, required: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InsufficientHistory { observed, required } => {
                write!(f, "insufficient history: {observed} of {required} trading days")
            }
        }
    }
}
