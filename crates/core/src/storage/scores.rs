use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::score::ScoreSnapshot;

/// One row of the ranked list: a score joined with its metrics snapshot.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RankedStock {
    pub rank: i32,
    pub ticker: String,
    pub normalized_score: f64,
    pub raw_score: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub max_drawdown: f64,
    pub downside_deviation: f64,
    pub momentum: f64,
    pub trading_days: i32,
}

/// A ticker's score under one profile, for the detail view.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProfileScore {
    pub risk_profile: String,
    pub raw_score: f64,
    pub normalized_score: f64,
    pub rank: i32,
}

/// Replace-on-conflict write of the whole (ticker x profile) block in one
/// transaction, so no reader observes a scores table with only some
/// profiles for a new as-of date.
pub async fn replace_scores_atomic(
    pool: &sqlx::PgPool,
    rows: &[ScoreSnapshot],
) -> anyhow::Result<u64> {
    anyhow::ensure!(!rows.is_empty(), "rows must be non-empty");

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let chunk_size: usize = std::env::var("SCORES_UPSERT_BATCH")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(500);
    anyhow::ensure!(chunk_size >= 1, "SCORES_UPSERT_BATCH must be >= 1");

    let mut affected: u64 = 0;
    for chunk in rows.chunks(chunk_size) {
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO scores (ticker, as_of_date, risk_profile, raw_score, \
             normalized_score, rank) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(row.ticker.trim())
                .push_bind(row.as_of_date)
                .push_bind(row.risk_profile.as_str())
                .push_bind(row.raw_score)
                .push_bind(row.normalized_score)
                .push_bind(row.rank);
        });
        qb.push(
            " ON CONFLICT (ticker, as_of_date, risk_profile) DO UPDATE \
               SET raw_score = EXCLUDED.raw_score, \
                   normalized_score = EXCLUDED.normalized_score, \
                   rank = EXCLUDED.rank",
        );

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert scores failed")?;
        affected += res.rows_affected();
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(affected)
}

/// Top-N ranked stocks for one profile at the latest as-of date, ascending
/// by rank. Ties order by ticker so a capped page is stable.
pub async fn load_rankings(
    pool: &sqlx::PgPool,
    risk_profile: &str,
    top_n: i64,
) -> anyhow::Result<Vec<RankedStock>> {
    let rows = sqlx::query_as::<_, RankedStock>(
        "SELECT s.rank, s.ticker, s.normalized_score, s.raw_score, \
                m.annualized_return, m.volatility, m.max_drawdown, \
                m.downside_deviation, m.momentum, m.trading_days \
         FROM scores s \
         JOIN metrics m ON m.ticker = s.ticker AND m.as_of_date = s.as_of_date \
         WHERE s.as_of_date = (SELECT MAX(as_of_date) FROM scores) \
           AND s.risk_profile = $1 \
         ORDER BY s.rank ASC, s.ticker ASC \
         LIMIT $2",
    )
    .bind(risk_profile)
    .bind(top_n)
    .fetch_all(pool)
    .await
    .context("load rankings failed")?;

    Ok(rows)
}

/// All profile scores for one ticker at the latest as-of date, ordered by
/// profile name.
pub async fn load_profile_scores(
    pool: &sqlx::PgPool,
    ticker: &str,
) -> anyhow::Result<Vec<ProfileScore>> {
    let rows = sqlx::query_as::<_, ProfileScore>(
        "SELECT risk_profile, raw_score, normalized_score, rank \
         FROM scores \
         WHERE ticker = $1 AND as_of_date = (SELECT MAX(as_of_date) FROM scores) \
         ORDER BY risk_profile ASC",
    )
    .bind(ticker)
    .fetch_all(pool)
    .await
    .context("load profile scores failed")?;

    Ok(rows)
}

pub async fn latest_scores_date(pool: &sqlx::PgPool) -> anyhow::Result<Option<NaiveDate>> {
    let date: Option<NaiveDate> = sqlx::query_scalar("SELECT MAX(as_of_date) FROM scores")
        .fetch_one(pool)
        .await
        .context("latest scores date query failed")?;
    Ok(date)
}
