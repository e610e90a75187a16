use anyhow::Context;
use chrono::NaiveDate;

use crate::domain::metrics::MetricsSnapshot;

/// Row shape for metrics reads.
#[derive(sqlx::FromRow)]
struct MetricsRow {
    ticker: String,
    as_of_date: NaiveDate,
    window_months: i32,
    mean_daily_return: f64,
    annualized_return: f64,
    volatility: f64,
    downside_deviation: f64,
    max_drawdown: f64,
    momentum: f64,
    trading_days: i32,
}

impl From<MetricsRow> for MetricsSnapshot {
    fn from(row: MetricsRow) -> Self {
        MetricsSnapshot {
            ticker: row.ticker,
            as_of_date: row.as_of_date,
            window_months: row.window_months,
            mean_daily_return: row.mean_daily_return,
            annualized_return: row.annualized_return,
            volatility: row.volatility,
            downside_deviation: row.downside_deviation,
            max_drawdown: row.max_drawdown,
            momentum: row.momentum,
            trading_days: row.trading_days,
        }
    }
}

/// Replace-on-conflict write of one metrics row per eligible ticker, all in
/// one transaction.
pub async fn replace_metrics_atomic(
    pool: &sqlx::PgPool,
    rows: &[MetricsSnapshot],
) -> anyhow::Result<u64> {
    anyhow::ensure!(!rows.is_empty(), "rows must be non-empty");

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let chunk_size: usize = std::env::var("METRICS_UPSERT_BATCH")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(200);
    anyhow::ensure!(chunk_size >= 1, "METRICS_UPSERT_BATCH must be >= 1");

    let mut affected: u64 = 0;
    for chunk in rows.chunks(chunk_size) {
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO metrics (ticker, as_of_date, window_months, mean_daily_return, \
             annualized_return, volatility, downside_deviation, max_drawdown, momentum, \
             trading_days) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(row.ticker.trim())
                .push_bind(row.as_of_date)
                .push_bind(row.window_months)
                .push_bind(row.mean_daily_return)
                .push_bind(row.annualized_return)
                .push_bind(row.volatility)
                .push_bind(row.downside_deviation)
                .push_bind(row.max_drawdown)
                .push_bind(row.momentum)
                .push_bind(row.trading_days);
        });
        qb.push(
            " ON CONFLICT (ticker, as_of_date, window_months) DO UPDATE \
               SET mean_daily_return = EXCLUDED.mean_daily_return, \
                   annualized_return = EXCLUDED.annualized_return, \
                   volatility = EXCLUDED.volatility, \
                   downside_deviation = EXCLUDED.downside_deviation, \
                   max_drawdown = EXCLUDED.max_drawdown, \
                   momentum = EXCLUDED.momentum, \
                   trading_days = EXCLUDED.trading_days",
        );

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert metrics failed")?;
        affected += res.rows_affected();
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(affected)
}

/// All metrics rows at the most recent as-of date.
pub async fn load_latest_metrics(pool: &sqlx::PgPool) -> anyhow::Result<Vec<MetricsSnapshot>> {
    let rows = sqlx::query_as::<_, MetricsRow>(
        "SELECT ticker, as_of_date, window_months, mean_daily_return, annualized_return, \
                volatility, downside_deviation, max_drawdown, momentum, trading_days \
         FROM metrics \
         WHERE as_of_date = (SELECT MAX(as_of_date) FROM metrics) \
         ORDER BY ticker ASC",
    )
    .fetch_all(pool)
    .await
    .context("load latest metrics failed")?;

    Ok(rows.into_iter().map(MetricsSnapshot::from).collect())
}

/// Latest metrics rows for one ticker (every window at the most recent
/// as-of date).
pub async fn load_latest_metrics_for_ticker(
    pool: &sqlx::PgPool,
    ticker: &str,
) -> anyhow::Result<Vec<MetricsSnapshot>> {
    let rows = sqlx::query_as::<_, MetricsRow>(
        "SELECT ticker, as_of_date, window_months, mean_daily_return, annualized_return, \
                volatility, downside_deviation, max_drawdown, momentum, trading_days \
         FROM metrics \
         WHERE ticker = $1 AND as_of_date = (SELECT MAX(as_of_date) FROM metrics) \
         ORDER BY window_months ASC",
    )
    .bind(ticker)
    .fetch_all(pool)
    .await
    .context("load ticker metrics failed")?;

    Ok(rows.into_iter().map(MetricsSnapshot::from).collect())
}

pub async fn latest_metrics_date(pool: &sqlx::PgPool) -> anyhow::Result<Option<NaiveDate>> {
    let date: Option<NaiveDate> = sqlx::query_scalar("SELECT MAX(as_of_date) FROM metrics")
        .fetch_one(pool)
        .await
        .context("latest metrics date query failed")?;
    Ok(date)
}
