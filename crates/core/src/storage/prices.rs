use std::collections::BTreeMap;

use anyhow::Context;
use chrono::NaiveDate;

use crate::domain::price::PricePoint;

/// Insert-or-replace the full price batch in one transaction.
///
/// Batched to reduce round trips; stays transactional so no reader can
/// observe a partially written run.
pub async fn upsert_prices_atomic(
    pool: &sqlx::PgPool,
    points: &[PricePoint],
) -> anyhow::Result<u64> {
    anyhow::ensure!(!points.is_empty(), "points must be non-empty");

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let chunk_size: usize = std::env::var("PRICES_UPSERT_BATCH")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(500);
    anyhow::ensure!(chunk_size >= 1, "PRICES_UPSERT_BATCH must be >= 1");

    let mut affected: u64 = 0;
    let mut batch_idx: usize = 0;
    for chunk in points.chunks(chunk_size) {
        batch_idx += 1;
        let t0 = std::time::Instant::now();
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO prices (ticker, date, adj_close, volume) ",
        );
        qb.push_values(chunk, |mut b, point| {
            b.push_bind(point.ticker.trim())
                .push_bind(point.date)
                .push_bind(point.adj_close)
                .push_bind(point.volume);
        });
        qb.push(
            " ON CONFLICT (ticker, date) DO UPDATE \
               SET adj_close = EXCLUDED.adj_close, volume = EXCLUDED.volume",
        );

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert prices failed")?;
        affected += res.rows_affected();

        tracing::debug!(
            batch_idx,
            batch_size = chunk.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "prices batch upsert"
        );
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(affected)
}

/// Full price history, grouped by ticker, ascending by date within each
/// ticker.
pub async fn load_price_history(
    pool: &sqlx::PgPool,
) -> anyhow::Result<BTreeMap<String, Vec<PricePoint>>> {
    let rows = sqlx::query_as::<_, (String, NaiveDate, f64, Option<i64>)>(
        "SELECT ticker, date, adj_close, volume \
         FROM prices \
         ORDER BY ticker ASC, date ASC",
    )
    .fetch_all(pool)
    .await
    .context("load price history failed")?;

    let mut out: BTreeMap<String, Vec<PricePoint>> = BTreeMap::new();
    for (ticker, date, adj_close, volume) in rows {
        out.entry(ticker.clone()).or_default().push(PricePoint {
            ticker,
            date,
            adj_close,
            volume,
        });
    }
    Ok(out)
}

pub async fn latest_price_date(pool: &sqlx::PgPool) -> anyhow::Result<Option<NaiveDate>> {
    let date: Option<NaiveDate> = sqlx::query_scalar("SELECT MAX(date) FROM prices")
        .fetch_one(pool)
        .await
        .context("latest price date query failed")?;
    Ok(date)
}

pub async fn distinct_ticker_count(pool: &sqlx::PgPool) -> anyhow::Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT ticker) FROM prices")
        .fetch_one(pool)
        .await
        .context("ticker count query failed")?;
    Ok(count)
}
