use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One adjusted daily close for one ticker. Unique per (ticker, date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub ticker: String,
    pub date: NaiveDate,
    pub adj_close: f64,
    pub volume: Option<i64>,
}
