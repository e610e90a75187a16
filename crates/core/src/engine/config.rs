use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Penalty/bonus weights of one risk profile.
///
/// raw_score = annualized_return - alpha * volatility
///             - beta * |max_drawdown| - gamma * downside_deviation
///             + delta * momentum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileWeights {
    /// Volatility penalty.
    pub alpha: f64,
    /// Drawdown penalty.
    pub beta: f64,
    /// Downside-deviation penalty.
    pub gamma: f64,
    /// Momentum bonus.
    pub delta: f64,
}

/// All tunables of the metrics and scoring engine.
///
/// Passed explicitly into each component so alternate configurations can
/// run side by side; there is no process-wide state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rolling window, expressed in months (12/6/3 map to 252/126/63
    /// trading days; anything else falls back to 12).
    pub window_months: u32,
    /// Tickers with fewer observed trading days produce no snapshot.
    pub min_trading_days: usize,
    pub trading_days_per_year: u32,
    /// Momentum lookbacks in trading days and their blend weights.
    pub momentum_short_days: usize,
    pub momentum_long_days: usize,
    pub momentum_short_weight: f64,
    pub momentum_long_weight: f64,
    /// Named risk profiles; BTreeMap keeps profile iteration order stable.
    pub profiles: BTreeMap<String, ProfileWeights>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "low".to_string(),
            ProfileWeights { alpha: 2.0, beta: 2.0, gamma: 1.5, delta: 0.3 },
        );
        profiles.insert(
            "medium".to_string(),
            ProfileWeights { alpha: 1.0, beta: 1.0, gamma: 0.75, delta: 0.7 },
        );
        profiles.insert(
            "high".to_string(),
            ProfileWeights { alpha: 0.5, beta: 0.5, gamma: 0.3, delta: 1.5 },
        );

        Self {
            window_months: 12,
            min_trading_days: 200,
            trading_days_per_year: 252,
            momentum_short_days: 63,
            momentum_long_days: 252,
            momentum_short_weight: 0.6,
            momentum_long_weight: 0.4,
            profiles,
        }
    }
}

impl EngineConfig {
    pub fn with_window_months(window_months: u32) -> Self {
        Self {
            window_months,
            ..Self::default()
        }
    }

    /// Rolling window length in trading days.
    pub fn window_days(&self) -> usize {
        match self.window_months {
            3 => 63,
            6 => 126,
            12 => 252,
            _ => 252,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.min_trading_days >= 2,
            "min_trading_days must be >= 2 (got {})",
            self.min_trading_days
        );
        anyhow::ensure!(
            self.trading_days_per_year >= 1,
            "trading_days_per_year must be >= 1"
        );
        anyhow::ensure!(
            self.momentum_short_days >= 1 && self.momentum_long_days >= 1,
            "momentum lookbacks must be >= 1"
        );
        anyhow::ensure!(!self.profiles.is_empty(), "at least one risk profile is required");

        for (name, w) in &self.profiles {
            anyhow::ensure!(!name.trim().is_empty(), "profile name must be non-empty");
            anyhow::ensure!(
                w.alpha >= 0.0 && w.beta >= 0.0 && w.gamma >= 0.0 && w.delta >= 0.0,
                "profile '{name}' has a negative weight"
            );
        }

        Ok(())
    }
}
