use std::collections::BTreeSet;

/// Fallback universe of large-cap US tickers, used when neither the CLI
/// nor the environment provides one.
pub const DEFAULT_TICKERS: [&str; 30] = [
    "AAPL", "MSFT", "AMZN", "GOOGL", "META", "NVDA", "TSLA", "BRK-B", "JPM", "JNJ", "V", "UNH",
    "PG", "HD", "MA", "DIS", "BAC", "XOM", "PFE", "KO", "PEP", "CSCO", "INTC", "NFLX", "ADBE",
    "CRM", "ABT", "CVX", "WMT", "MRK",
];

const DEFAULT_HISTORY_YEARS: i64 = 2;

/// Resolve the ticker universe: CLI override > UNIVERSE_TICKERS env >
/// built-in default list. Always deduplicated, uppercased, sorted.
pub fn resolve_universe(cli_tickers: Option<&str>, env_tickers: Option<&str>) -> Vec<String> {
    if let Some(parsed) = cli_tickers.map(parse_ticker_list).filter(|t| !t.is_empty()) {
        tracing::info!(count = parsed.len(), source = "cli", "resolved ticker universe");
        return parsed;
    }

    if let Some(parsed) = env_tickers.map(parse_ticker_list).filter(|t| !t.is_empty()) {
        tracing::info!(count = parsed.len(), source = "env", "resolved ticker universe");
        return parsed;
    }

    tracing::info!(
        count = DEFAULT_TICKERS.len(),
        source = "default",
        "resolved ticker universe"
    );
    DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect()
}

/// Lookback horizon in calendar years for price ingestion.
pub fn history_years() -> i64 {
    std::env::var("HISTORY_YEARS")
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|y| *y >= 1)
        .unwrap_or(DEFAULT_HISTORY_YEARS)
}

fn parse_ticker_list(raw: &str) -> Vec<String> {
    let set: BTreeSet<String> = raw
        .split(',')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect();
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_takes_precedence_over_env() {
        let universe = resolve_universe(Some("aapl,msft"), Some("TSLA"));
        assert_eq!(universe, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn env_used_when_cli_absent() {
        let universe = resolve_universe(None, Some("nvda, amd"));
        assert_eq!(universe, vec!["AMD", "NVDA"]);
    }

    #[test]
    fn falls_back_to_default_list() {
        let universe = resolve_universe(None, None);
        assert_eq!(universe.len(), DEFAULT_TICKERS.len());
        assert!(universe.contains(&"AAPL".to_string()));
    }

    #[test]
    fn blank_override_falls_through() {
        let universe = resolve_universe(Some(" , ,"), None);
        assert_eq!(universe.len(), DEFAULT_TICKERS.len());
    }

    #[test]
    fn parse_dedupes_and_uppercases() {
        assert_eq!(parse_ticker_list("aapl,AAPL, aapl "), vec!["AAPL"]);
    }
}
