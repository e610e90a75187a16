use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use riskrank_core::engine::config::EngineConfig;

mod stages;
mod universe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Stage {
    /// Ingest daily prices from the provider.
    Pull,
    /// Compute per-ticker metrics snapshots from stored prices.
    Metrics,
    /// Score the latest metrics under every risk profile.
    Scores,
    /// Pull, then metrics, then scores.
    All,
}

#[derive(Debug, Parser)]
#[command(name = "riskrank_worker")]
struct Args {
    #[arg(long, value_enum, default_value = "all")]
    stage: Stage,

    /// Rolling metrics window in months (12, 6, or 3).
    #[arg(long, default_value_t = 12)]
    window_months: u32,

    /// Comma-separated ticker universe override.
    #[arg(long)]
    tickers: Option<String>,

    /// Do everything except writing to the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = riskrank_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let config = EngineConfig::with_window_months(args.window_months);
    config.validate()?;

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    riskrank_core::storage::migrate(&pool).await?;

    // One lock spans every requested stage, so a concurrent run cannot
    // interleave partial writes for the same as-of date.
    let lock_date = riskrank_core::storage::prices::latest_price_date(&pool)
        .await?
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    let acquired =
        riskrank_core::storage::lock::try_acquire_as_of_date_lock(&pool, lock_date).await?;
    if !acquired {
        tracing::warn!(%lock_date, "as_of_date lock not acquired; another run in progress");
        return Ok(());
    }

    let result = run_stages(&pool, &settings, &config, &args).await;

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(stage = ?args.stage, error = %err, "engine run failed");
    }

    let _ = riskrank_core::storage::lock::release_as_of_date_lock(&pool, lock_date).await;
    result
}

async fn run_stages(
    pool: &sqlx::PgPool,
    settings: &riskrank_core::config::Settings,
    config: &EngineConfig,
    args: &Args,
) -> anyhow::Result<()> {
    match args.stage {
        Stage::Pull => {
            let tickers = resolve_universe(args);
            stages::run_pull(pool, settings, &tickers, args.dry_run).await
        }
        Stage::Metrics => stages::run_metrics(pool, config, args.dry_run).await,
        Stage::Scores => stages::run_scores(pool, config, args.dry_run).await,
        Stage::All => {
            let tickers = resolve_universe(args);
            stages::run_pull(pool, settings, &tickers, args.dry_run).await?;
            stages::run_metrics(pool, config, args.dry_run).await?;
            stages::run_scores(pool, config, args.dry_run).await
        }
    }
}

fn resolve_universe(args: &Args) -> Vec<String> {
    let env_tickers = std::env::var("UNIVERSE_TICKERS").ok();
    universe::resolve_universe(args.tickers.as_deref(), env_tickers.as_deref())
}

fn init_sentry(settings: &riskrank_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
