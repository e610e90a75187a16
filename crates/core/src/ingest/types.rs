use serde::{Deserialize, Serialize};

use crate::domain::price::PricePoint;

/// Wire shape of the price provider's daily-history response. Rows are
/// expected grouped by ticker, ascending by date, deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPricesResponse {
    pub prices: Vec<PricePoint>,
}
