use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Risk-adjusted score of one ticker under one risk profile.
///
/// One row per (ticker, as_of_date, risk_profile). `normalized_score` is
/// the fractional rank within the same-profile cross-section (1.0 = best,
/// ties averaged); `rank` is a minimum-method competition rank (1 = best).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub ticker: String,
    pub as_of_date: NaiveDate,
    pub risk_profile: String,
    pub raw_score: f64,
    pub normalized_score: f64,
    pub rank: i32,
}
