use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::metrics::{MetricsSnapshot, SkipReason, TickerEvaluation, TickerMetrics};
use crate::domain::price::PricePoint;
use crate::engine::config::EngineConfig;
use crate::engine::stats;

/// Computes the per-ticker metrics snapshot from daily close history.
///
/// Rolling aggregates (mean return, volatility, downside deviation) are
/// evaluated over the trailing `window_days()` daily returns; max drawdown
/// over the trailing window of prices; momentum over the full close series.
/// Tickers below the minimum-history threshold are skipped, not failed.
pub struct MetricsComputer {
    config: EngineConfig,
}

impl MetricsComputer {
    pub fn new(config: EngineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate one ticker's ascending-date close series.
    pub fn evaluate(&self, closes: &[f64]) -> TickerEvaluation {
        if closes.len() < self.config.min_trading_days {
            return TickerEvaluation::Skipped(SkipReason::InsufficientHistory {
                observed: closes.len(),
                required: self.config.min_trading_days,
            });
        }

        let window = self.config.window_days();
        let periods_per_year = f64::from(self.config.trading_days_per_year);

        let returns = stats::daily_returns(closes);
        // Histories between the minimum-history gate and the full window
        // truncate to the available observations.
        let window_returns = stats::trailing(&returns, window);

        // The gate guarantees at least one return; a single-return window
        // has no dispersion and reports zero.
        let mean_daily_return = stats::mean(window_returns).unwrap_or(0.0);
        let annualized_return =
            (1.0 + mean_daily_return).powi(self.config.trading_days_per_year as i32) - 1.0;
        let volatility = stats::sample_std(window_returns).unwrap_or(0.0) * periods_per_year.sqrt();

        // Downside deviation: clip every non-negative return to zero, then
        // take the (annualized) sample std of the clipped series.
        let clipped: Vec<f64> = window_returns.iter().map(|r| r.min(0.0)).collect();
        let downside_deviation =
            stats::sample_std(&clipped).unwrap_or(0.0) * periods_per_year.sqrt();

        // Drawdown runs over trailing *prices*; momentum over the full
        // unwindowed series.
        let max_drawdown = stats::max_drawdown(stats::trailing(closes, window));

        let momentum = self.config.momentum_short_weight
            * period_return(closes, self.config.momentum_short_days)
            + self.config.momentum_long_weight
                * period_return(closes, self.config.momentum_long_days);

        TickerEvaluation::Eligible(TickerMetrics {
            mean_daily_return,
            annualized_return,
            volatility,
            downside_deviation,
            max_drawdown,
            momentum,
            trading_days: closes.len(),
        })
    }

    /// Run the computer over every ticker and stamp eligible rows with the
    /// dataset-maximum as-of date. An empty result is a valid outcome.
    pub fn compute_all(
        &self,
        history: &BTreeMap<String, Vec<PricePoint>>,
    ) -> Vec<MetricsSnapshot> {
        let Some(as_of_date) = dataset_max_date(history) else {
            tracing::warn!("no price data available; nothing to compute");
            return Vec::new();
        };

        let mut rows = Vec::new();
        let mut skipped: Vec<String> = Vec::new();

        for (ticker, points) in history {
            let mut series: Vec<(NaiveDate, f64)> =
                points.iter().map(|p| (p.date, p.adj_close)).collect();
            series.sort_by_key(|(date, _)| *date);
            let closes: Vec<f64> = series.into_iter().map(|(_, close)| close).collect();

            match self.evaluate(&closes) {
                TickerEvaluation::Eligible(m) => rows.push(MetricsSnapshot {
                    ticker: ticker.clone(),
                    as_of_date,
                    window_months: self.config.window_months as i32,
                    mean_daily_return: m.mean_daily_return,
                    annualized_return: m.annualized_return,
                    volatility: m.volatility,
                    downside_deviation: m.downside_deviation,
                    max_drawdown: m.max_drawdown,
                    momentum: m.momentum,
                    trading_days: m.trading_days as i32,
                }),
                TickerEvaluation::Skipped(reason) => {
                    tracing::debug!(%ticker, %reason, "ticker skipped");
                    skipped.push(ticker.clone());
                }
            }
        }

        if !skipped.is_empty() {
            let preview = skipped
                .iter()
                .take(10)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            tracing::info!(
                skipped = skipped.len(),
                required = self.config.min_trading_days,
                tickers = %format!("{preview}{}", if skipped.len() > 10 { "..." } else { "" }),
                "skipped tickers below minimum history"
            );
        }

        tracing::info!(%as_of_date, computed = rows.len(), "computed metrics snapshots");
        rows
    }
}

/// Total return over the last `n_days` trading days: price[last] /
/// price[last - n_days] - 1. Contributes exactly 0 when fewer than
/// n_days + 1 observations exist, so the momentum blend degrades
/// gracefully on short histories.
fn period_return(closes: &[f64], n_days: usize) -> f64 {
    if closes.len() < n_days + 1 {
        return 0.0;
    }
    let last = closes.len() - 1;
    closes[last] / closes[last - n_days] - 1.0
}

fn dataset_max_date(history: &BTreeMap<String, Vec<PricePoint>>) -> Option<NaiveDate> {
    history
        .values()
        .flat_map(|points| points.iter().map(|p| p.date))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    fn small_config(min_trading_days: usize) -> EngineConfig {
        EngineConfig {
            min_trading_days,
            ..EngineConfig::default()
        }
    }

    fn history_of(ticker: &str, closes: &[f64]) -> BTreeMap<String, Vec<PricePoint>> {
        let mut out = BTreeMap::new();
        out.insert(ticker.to_string(), price_points(ticker, closes));
        out
    }

    fn price_points(ticker: &str, closes: &[f64]) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &adj_close)| PricePoint {
                ticker: ticker.to_string(),
                date: start + Duration::days(i as i64),
                adj_close,
                volume: Some(1_000),
            })
            .collect()
    }

    #[test]
    fn thin_history_is_skipped_not_failed() {
        let computer = MetricsComputer::new(EngineConfig::default()).unwrap();
        let closes = vec![100.0; 199];
        match computer.evaluate(&closes) {
            TickerEvaluation::Skipped(SkipReason::InsufficientHistory { observed, required }) => {
                assert_eq!(observed, 199);
                assert_eq!(required, 200);
            }
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn gate_boundary_is_inclusive() {
        let computer = MetricsComputer::new(EngineConfig::default()).unwrap();
        let closes = vec![100.0; 200];
        assert!(matches!(
            computer.evaluate(&closes),
            TickerEvaluation::Eligible(_)
        ));
    }

    #[test]
    fn annualized_return_round_trips_from_mean() {
        let computer = MetricsComputer::new(small_config(5)).unwrap();
        // Constant 1% daily growth: every daily return is exactly 0.01.
        let closes: Vec<f64> = (0..30).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
        let TickerEvaluation::Eligible(m) = computer.evaluate(&closes) else {
            panic!("expected eligible");
        };
        assert_close(m.mean_daily_return, 0.01);
        assert_close(m.annualized_return, 1.01_f64.powi(252) - 1.0);
    }

    #[test]
    fn annualized_return_is_monotonic_in_mean_daily() {
        let computer = MetricsComputer::new(small_config(5)).unwrap();
        let slow: Vec<f64> = (0..30).map(|i| 100.0 * 1.001_f64.powi(i)).collect();
        let fast: Vec<f64> = (0..30).map(|i| 100.0 * 1.002_f64.powi(i)).collect();
        let (TickerEvaluation::Eligible(a), TickerEvaluation::Eligible(b)) =
            (computer.evaluate(&slow), computer.evaluate(&fast))
        else {
            panic!("expected eligible");
        };
        assert!(b.mean_daily_return > a.mean_daily_return);
        assert!(b.annualized_return > a.annualized_return);
    }

    #[test]
    fn flat_series_has_zero_risk_terms() {
        let computer = MetricsComputer::new(small_config(5)).unwrap();
        let TickerEvaluation::Eligible(m) = computer.evaluate(&[50.0; 40]) else {
            panic!("expected eligible");
        };
        assert_eq!(m.mean_daily_return, 0.0);
        assert_eq!(m.annualized_return, 0.0);
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.downside_deviation, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.momentum, 0.0);
    }

    #[test]
    fn momentum_short_leg_zero_below_64_observations() {
        let computer = MetricsComputer::new(small_config(5)).unwrap();
        // 63 observations: both the 63-day and the 252-day legs lack
        // n + 1 observations, so the blend is exactly zero.
        let closes: Vec<f64> = (0..63).map(|i| 100.0 + i as f64).collect();
        let TickerEvaluation::Eligible(m) = computer.evaluate(&closes) else {
            panic!("expected eligible");
        };
        assert_eq!(m.momentum, 0.0);
    }

    #[test]
    fn momentum_long_leg_zero_below_253_observations() {
        let computer = MetricsComputer::new(small_config(5)).unwrap();
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        let TickerEvaluation::Eligible(m) = computer.evaluate(&closes) else {
            panic!("expected eligible");
        };
        let last = closes.len() - 1;
        let ret_3m = closes[last] / closes[last - 63] - 1.0;
        assert_close(m.momentum, 0.6 * ret_3m);
    }

    #[test]
    fn momentum_blends_both_legs_with_full_history() {
        let computer = MetricsComputer::new(small_config(5)).unwrap();
        let closes: Vec<f64> = (0..260).map(|i| 100.0 + (i as f64) * 0.5).collect();
        let TickerEvaluation::Eligible(m) = computer.evaluate(&closes) else {
            panic!("expected eligible");
        };
        let last = closes.len() - 1;
        let ret_3m = closes[last] / closes[last - 63] - 1.0;
        let ret_12m = closes[last] / closes[last - 252] - 1.0;
        assert_close(m.momentum, 0.6 * ret_3m + 0.4 * ret_12m);
    }

    #[test]
    fn window_truncates_when_history_shorter_than_window() {
        // 20 closes pass a min gate of 10 but fall short of the 252-day
        // window; aggregates must still come out finite, over all 19 returns.
        let computer = MetricsComputer::new(small_config(10)).unwrap();
        let closes: Vec<f64> = (0..20).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
        let TickerEvaluation::Eligible(m) = computer.evaluate(&closes) else {
            panic!("expected eligible");
        };
        assert!(m.mean_daily_return.is_finite());
        assert!(m.volatility.is_finite());
        assert_close(m.mean_daily_return, 0.01);
    }

    #[test]
    fn compute_all_skips_thin_tickers_and_stamps_max_date() {
        let computer = MetricsComputer::new(small_config(10)).unwrap();

        let mut history = history_of("LONG", &(0..30).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        history.insert("THIN".to_string(), price_points("THIN", &[100.0, 101.0]));
        // SHORTER ends earlier than LONG but passes the gate; it still gets
        // stamped with the dataset-maximum date.
        history.insert(
            "SHORTER".to_string(),
            price_points("SHORTER", &(0..15).map(|i| 50.0 + i as f64).collect::<Vec<_>>()),
        );

        let rows = computer.compute_all(&history);
        let tickers: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["LONG", "SHORTER"]);

        let expected_as_of = NaiveDate::from_ymd_opt(2024, 1, 30).unwrap();
        assert!(rows.iter().all(|r| r.as_of_date == expected_as_of));
        assert!(rows.iter().all(|r| r.window_months == 12));
        assert_eq!(rows[0].trading_days, 30);
        assert_eq!(rows[1].trading_days, 15);
    }

    #[test]
    fn recomputation_is_identical() {
        let computer = MetricsComputer::new(small_config(5)).unwrap();
        let history = history_of("AAA", &[100.0, 103.0, 101.0, 99.0, 104.0, 102.0, 108.0]);
        assert_eq!(computer.compute_all(&history), computer.compute_all(&history));
    }

    #[test]
    fn compute_all_on_empty_input_is_empty() {
        let computer = MetricsComputer::new(EngineConfig::default()).unwrap();
        assert!(computer.compute_all(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn compute_all_tolerates_unsorted_input() {
        let computer = MetricsComputer::new(small_config(3)).unwrap();
        let mut points = price_points("AAA", &[100.0, 102.0, 101.0, 105.0]);
        points.reverse();
        let mut history = BTreeMap::new();
        history.insert("AAA".to_string(), points);

        let rows = computer.compute_all(&history);
        assert_eq!(rows.len(), 1);
        // Returns computed on the date-ordered series, not input order.
        let expected_mean =
            (2.0 / 100.0 + (-1.0) / 102.0 + 4.0 / 101.0) / 3.0;
        assert_close(rows[0].mean_daily_return, expected_mean);
    }
}
