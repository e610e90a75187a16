use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Append one audit row per stage execution. `raw_response` keeps the
/// provider payload for ingest runs.
pub async fn record_engine_run(
    pool: &sqlx::PgPool,
    as_of_date: NaiveDate,
    stage: &str,
    status: &str,
    detail: Option<&str>,
    raw_response: Option<Value>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let started_at: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO engine_runs (id, as_of_date, started_at, stage, status, detail, raw_response) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .persistent(false)
    .bind(id)
    .bind(as_of_date)
    .bind(started_at)
    .bind(stage)
    .bind(status)
    .bind(detail)
    .bind(raw_response)
    .execute(pool)
    .await
    .context("insert engine_runs failed")?;

    Ok(id)
}
