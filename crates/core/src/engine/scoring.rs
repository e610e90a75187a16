use std::collections::BTreeMap;

use crate::domain::metrics::MetricsSnapshot;
use crate::domain::score::ScoreSnapshot;
use crate::engine::config::{EngineConfig, ProfileWeights};
use crate::engine::stats;

/// Scores the latest metrics cross-section under every configured risk
/// profile.
///
/// Each profile is scored independently over the full cross-section:
/// a linear weighted combination of the metric terms, an average-tie
/// percentile normalization, and a minimum-method competition rank.
pub struct RiskScorer {
    profiles: BTreeMap<String, ProfileWeights>,
}

impl RiskScorer {
    pub fn new(profiles: BTreeMap<String, ProfileWeights>) -> anyhow::Result<Self> {
        anyhow::ensure!(!profiles.is_empty(), "at least one risk profile is required");
        for (name, w) in &profiles {
            anyhow::ensure!(
                w.alpha >= 0.0 && w.beta >= 0.0 && w.gamma >= 0.0 && w.delta >= 0.0,
                "profile '{name}' has a negative weight"
            );
        }
        Ok(Self { profiles })
    }

    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        Self::new(config.profiles.clone())
    }

    pub fn profiles(&self) -> &BTreeMap<String, ProfileWeights> {
        &self.profiles
    }

    /// Score every ticker under every profile. The metrics set must already
    /// be the single-date cross-section; an empty set yields an empty
    /// result, which is a valid terminal state.
    pub fn score_all(&self, metrics: &[MetricsSnapshot]) -> Vec<ScoreSnapshot> {
        if metrics.is_empty() {
            tracing::warn!("no metrics available; nothing to score");
            return Vec::new();
        }

        let mut out = Vec::with_capacity(metrics.len() * self.profiles.len());
        for (name, weights) in &self.profiles {
            let scored = score_profile(name, *weights, metrics);

            let top = scored
                .iter()
                .min_by_key(|s| s.rank)
                .map(|s| s.ticker.as_str())
                .unwrap_or("n/a");
            tracing::info!(
                profile = %name,
                scored = scored.len(),
                top = %top,
                "scored risk profile"
            );

            out.extend(scored);
        }
        out
    }
}

fn score_profile(
    profile: &str,
    weights: ProfileWeights,
    metrics: &[MetricsSnapshot],
) -> Vec<ScoreSnapshot> {
    let raw: Vec<f64> = metrics
        .iter()
        .map(|m| {
            m.annualized_return - weights.alpha * m.volatility
                - weights.beta * m.max_drawdown.abs()
                - weights.gamma * m.downside_deviation
                + weights.delta * m.momentum
        })
        .collect();

    let normalized = stats::percentile_ranks(&raw);
    let ranks = stats::competition_ranks(&raw);

    metrics
        .iter()
        .enumerate()
        .map(|(i, m)| ScoreSnapshot {
            ticker: m.ticker.clone(),
            as_of_date: m.as_of_date,
            risk_profile: profile.to_string(),
            raw_score: raw[i],
            normalized_score: normalized[i],
            rank: ranks[i],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    fn flat_weights() -> ProfileWeights {
        ProfileWeights { alpha: 0.0, beta: 0.0, gamma: 0.0, delta: 0.0 }
    }

    fn snapshot(ticker: &str, annualized_return: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            ticker: ticker.to_string(),
            as_of_date: NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
            window_months: 12,
            mean_daily_return: 0.0,
            annualized_return,
            volatility: 0.0,
            downside_deviation: 0.0,
            max_drawdown: 0.0,
            momentum: 0.0,
            trading_days: 252,
        }
    }

    fn scorer_with(profiles: &[(&str, ProfileWeights)]) -> RiskScorer {
        let table = profiles
            .iter()
            .map(|(name, w)| (name.to_string(), *w))
            .collect();
        RiskScorer::new(table).unwrap()
    }

    #[test]
    fn raw_score_applies_profile_weights() {
        let mut m = snapshot("AAA", 0.20);
        m.volatility = 0.30;
        m.max_drawdown = -0.25;
        m.downside_deviation = 0.10;
        m.momentum = 0.15;

        let weights = ProfileWeights { alpha: 1.0, beta: 1.0, gamma: 0.75, delta: 0.7 };
        let scored = scorer_with(&[("medium", weights)]).score_all(&[m]);
        // 0.20 - 0.30 - 0.25 - 0.075 + 0.105
        assert_close(scored[0].raw_score, -0.32);
    }

    #[test]
    fn drawdown_penalty_uses_magnitude() {
        let mut negative_dd = snapshot("AAA", 0.0);
        negative_dd.max_drawdown = -0.4;

        let weights = ProfileWeights { alpha: 0.0, beta: 1.0, gamma: 0.0, delta: 0.0 };
        let scored = scorer_with(&[("p", weights)]).score_all(&[negative_dd]);
        assert_close(scored[0].raw_score, -0.4);
    }

    #[test]
    fn competition_ranks_share_minimum_and_skip() {
        let metrics = vec![
            snapshot("A", 10.0),
            snapshot("B", 8.0),
            snapshot("C", 8.0),
            snapshot("D", 5.0),
        ];
        let scored = scorer_with(&[("p", flat_weights())]).score_all(&metrics);
        let ranks: Vec<i32> = scored.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 2, 4]);
    }

    #[test]
    fn tied_group_gets_average_percentile() {
        // Raw scores descending 10, 8, 8, 5: ascending positions are
        // D=1, B/C=(2+3)/2, A=4.
        let metrics = vec![
            snapshot("A", 10.0),
            snapshot("B", 8.0),
            snapshot("C", 8.0),
            snapshot("D", 5.0),
        ];
        let scored = scorer_with(&[("p", flat_weights())]).score_all(&metrics);
        assert_close(scored[0].normalized_score, 1.0);
        assert_close(scored[1].normalized_score, 0.625);
        assert_close(scored[2].normalized_score, 0.625);
        assert_close(scored[3].normalized_score, 0.25);
    }

    #[test]
    fn exactly_one_best_without_ties() {
        let metrics = vec![snapshot("A", 0.1), snapshot("B", 0.3), snapshot("C", -0.2)];
        let scored = scorer_with(&[("p", flat_weights())]).score_all(&metrics);
        let best = scored.iter().filter(|s| s.normalized_score == 1.0).count();
        assert_eq!(best, 1);
        assert_eq!(scored.iter().find(|s| s.rank == 1).unwrap().ticker, "B");
    }

    #[test]
    fn single_ticker_cross_section_is_valid() {
        let scored = scorer_with(&[("p", flat_weights())]).score_all(&[snapshot("A", 0.1)]);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].rank, 1);
        assert_close(scored[0].normalized_score, 1.0);
    }

    #[test]
    fn empty_metrics_set_scores_nothing() {
        let scored = scorer_with(&[("p", flat_weights())]).score_all(&[]);
        assert!(scored.is_empty());
    }

    #[test]
    fn differing_weights_can_invert_ordering() {
        let mut steady = snapshot("STEADY", 0.10);
        steady.volatility = 0.05;
        let mut racy = snapshot("RACY", 0.14);
        racy.volatility = 0.60;

        let ignore_risk = ProfileWeights { alpha: 0.0, beta: 0.0, gamma: 0.0, delta: 0.0 };
        let punish_risk = ProfileWeights { alpha: 1.0, beta: 0.0, gamma: 0.0, delta: 0.0 };

        let scorer = scorer_with(&[("high", ignore_risk), ("low", punish_risk)]);
        let scored = scorer.score_all(&[steady, racy]);

        let rank_of = |profile: &str, ticker: &str| {
            scored
                .iter()
                .find(|s| s.risk_profile == profile && s.ticker == ticker)
                .unwrap()
                .rank
        };

        // Raw return favors RACY; the volatility penalty flips the order.
        assert_eq!(rank_of("high", "RACY"), 1);
        assert_eq!(rank_of("high", "STEADY"), 2);
        assert_eq!(rank_of("low", "STEADY"), 1);
        assert_eq!(rank_of("low", "RACY"), 2);
    }

    #[test]
    fn profiles_are_scored_independently() {
        let metrics = vec![snapshot("A", 0.2), snapshot("B", 0.1)];
        let scorer = scorer_with(&[("p1", flat_weights()), ("p2", flat_weights())]);
        let scored = scorer.score_all(&metrics);
        assert_eq!(scored.len(), 4);
        for profile in ["p1", "p2"] {
            let per: Vec<&ScoreSnapshot> =
                scored.iter().filter(|s| s.risk_profile == profile).collect();
            assert_eq!(per.len(), 2);
            assert_eq!(per.iter().filter(|s| s.rank == 1).count(), 1);
        }
    }

    #[test]
    fn rescoring_is_identical() {
        let metrics = vec![snapshot("A", 0.2), snapshot("B", 0.1), snapshot("C", 0.1)];
        let scorer = scorer_with(&[("p", flat_weights())]);
        assert_eq!(scorer.score_all(&metrics), scorer.score_all(&metrics));
    }

    #[test]
    fn rejects_negative_weights() {
        let mut table = BTreeMap::new();
        table.insert(
            "bad".to_string(),
            ProfileWeights { alpha: 0.0, beta: -1.0, gamma: 0.0, delta: 0.0 },
        );
        assert!(RiskScorer::new(table).is_err());
    }
}
