use anyhow::Context;
use chrono::{Duration, Utc};
use sqlx::PgPool;

use riskrank_core::config::Settings;
use riskrank_core::engine::config::EngineConfig;
use riskrank_core::engine::metrics::MetricsComputer;
use riskrank_core::engine::scoring::RiskScorer;
use riskrank_core::ingest::provider::{HttpJsonPriceProvider, PriceProvider};
use riskrank_core::storage;

use crate::universe;

/// Fetch daily prices for the universe and upsert them.
pub async fn run_pull(
    pool: &PgPool,
    settings: &Settings,
    tickers: &[String],
    dry_run: bool,
) -> anyhow::Result<()> {
    let provider = HttpJsonPriceProvider::from_settings(settings)?;

    let end = Utc::now().date_naive();
    let start = end - Duration::days(universe::history_years() * 365);

    tracing::info!(
        tickers = tickers.len(),
        %start,
        %end,
        provider = provider.provider_name(),
        "downloading daily prices"
    );

    let (points, raw) = provider
        .fetch_daily_prices(tickers, start, end)
        .await
        .context("price download failed")?;

    if dry_run {
        tracing::info!(rows = points.len(), dry_run = true, "pull stage (dry-run)");
        return Ok(());
    }

    if points.is_empty() {
        tracing::warn!("provider returned no price rows; nothing to save");
        // Keep the payload only for empty responses; successful rows land in
        // the prices table anyway.
        storage::runs::record_engine_run(pool, end, "pull", "empty", None, Some(raw)).await?;
        return Ok(());
    }

    let as_of_date = points.iter().map(|p| p.date).max().unwrap_or(end);
    let affected = storage::prices::upsert_prices_atomic(pool, &points).await?;

    storage::runs::record_engine_run(
        pool,
        as_of_date,
        "pull",
        "success",
        Some(&format!("{affected} price rows")),
        None,
    )
    .await?;

    tracing::info!(%as_of_date, affected, "saved price rows");
    Ok(())
}

/// Run the metrics computer over the full stored history and replace the
/// metrics snapshot set.
pub async fn run_metrics(
    pool: &PgPool,
    config: &EngineConfig,
    dry_run: bool,
) -> anyhow::Result<()> {
    let history = storage::prices::load_price_history(pool).await?;
    if history.is_empty() {
        tracing::warn!("no price data found in database; nothing to compute");
        return Ok(());
    }

    let computer = MetricsComputer::new(config.clone())?;
    let rows = computer.compute_all(&history);

    let Some(first) = rows.first() else {
        tracing::warn!("no eligible tickers this run; no metrics to save");
        return Ok(());
    };
    let as_of_date = first.as_of_date;

    if dry_run {
        tracing::info!(rows = rows.len(), %as_of_date, dry_run = true, "metrics stage (dry-run)");
        return Ok(());
    }

    let affected = storage::metrics::replace_metrics_atomic(pool, &rows).await?;
    storage::runs::record_engine_run(
        pool,
        as_of_date,
        "metrics",
        "success",
        Some(&format!("{affected} metrics rows")),
        None,
    )
    .await?;

    tracing::info!(%as_of_date, affected, "saved metrics snapshots");
    Ok(())
}

/// Score the latest metrics cross-section under every configured profile
/// and replace the scores set.
pub async fn run_scores(
    pool: &PgPool,
    config: &EngineConfig,
    dry_run: bool,
) -> anyhow::Result<()> {
    let metrics = storage::metrics::load_latest_metrics(pool).await?;
    if metrics.is_empty() {
        tracing::warn!("no metrics found in database; nothing to score");
        return Ok(());
    }
    let as_of_date = metrics[0].as_of_date;

    let scorer = RiskScorer::from_config(config)?;
    let rows = scorer.score_all(&metrics);

    if dry_run {
        tracing::info!(rows = rows.len(), %as_of_date, dry_run = true, "scores stage (dry-run)");
        return Ok(());
    }

    let affected = storage::scores::replace_scores_atomic(pool, &rows).await?;
    storage::runs::record_engine_run(
        pool,
        as_of_date,
        "scores",
        "success",
        Some(&format!("{affected} score rows")),
        None,
    )
    .await?;

    tracing::info!(%as_of_date, affected, "saved score snapshots");
    Ok(())
}
