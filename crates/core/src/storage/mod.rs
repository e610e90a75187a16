use anyhow::Context;

pub mod lock;
pub mod metrics;
pub mod prices;
pub mod runs;
pub mod scores;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
