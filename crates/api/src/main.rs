use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use riskrank_core::domain::metrics::MetricsSnapshot;
use riskrank_core::engine::config::{EngineConfig, ProfileWeights};
use riskrank_core::storage;
use riskrank_core::storage::scores::{ProfileScore, RankedStock};

const DEFAULT_TOP_N: i64 = 10;
const MAX_TOP_N: i64 = 500;

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

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match riskrank_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        pool,
        engine: EngineConfig::default(),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/health", get(health))
        .route("/rankings", get(rankings))
        .route("/stocks/:ticker", get(stock_detail))
        .route("/profiles", get(profiles))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    pool: Option<PgPool>,
    engine: EngineConfig,
}

type ApiError = (StatusCode, String);

fn unavailable() -> ApiError {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        "database unavailable".to_string(),
    )
}

fn internal(e: anyhow::Error) -> ApiError {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %e, "query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, String::new())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    ticker_count: i64,
    latest_price_date: Option<NaiveDate>,
    latest_metrics_date: Option<NaiveDate>,
    latest_scores_date: Option<NaiveDate>,
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let Some(pool) = &state.pool else {
        return Err(unavailable());
    };

    let ticker_count = storage::prices::distinct_ticker_count(pool)
        .await
        .map_err(internal)?;

    Ok(Json(HealthResponse {
        status: "ok",
        ticker_count,
        latest_price_date: storage::prices::latest_price_date(pool)
            .await
            .map_err(internal)?,
        latest_metrics_date: storage::metrics::latest_metrics_date(pool)
            .await
            .map_err(internal)?,
        latest_scores_date: storage::scores::latest_scores_date(pool)
            .await
            .map_err(internal)?,
    }))
}

#[derive(Debug, Deserialize)]
struct RankingsQuery {
    risk_profile: Option<String>,
    top_n: Option<i64>,
}

#[derive(Debug, Serialize)]
struct RankingsResponse {
    risk_profile: String,
    as_of_date: Option<NaiveDate>,
    count: usize,
    stocks: Vec<RankedStock>,
}

async fn rankings(
    State(state): State<AppState>,
    Query(query): Query<RankingsQuery>,
) -> Result<Json<RankingsResponse>, ApiError> {
    let Some(pool) = &state.pool else {
        return Err(unavailable());
    };

    let risk_profile = query.risk_profile.unwrap_or_else(|| "medium".to_string());
    if !state.engine.profiles.contains_key(&risk_profile) {
        let known = state
            .engine
            .profiles
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        return Err((
            StatusCode::BAD_REQUEST,
            format!("unknown risk_profile '{risk_profile}'; choose from: {known}"),
        ));
    }

    let top_n = query.top_n.unwrap_or(DEFAULT_TOP_N);
    if !(1..=MAX_TOP_N).contains(&top_n) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("top_n must be between 1 and {MAX_TOP_N} (got {top_n})"),
        ));
    }

    let stocks = storage::scores::load_rankings(pool, &risk_profile, top_n)
        .await
        .map_err(internal)?;
    let as_of_date = storage::scores::latest_scores_date(pool)
        .await
        .map_err(internal)?;

    Ok(Json(RankingsResponse {
        risk_profile,
        as_of_date,
        count: stocks.len(),
        stocks,
    }))
}

#[derive(Debug, Serialize)]
struct StockDetailResponse {
    ticker: String,
    metrics: Vec<MetricsSnapshot>,
    scores: Vec<ProfileScore>,
}

async fn stock_detail(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<StockDetailResponse>, ApiError> {
    let Some(pool) = &state.pool else {
        return Err(unavailable());
    };

    let ticker = ticker.trim().to_uppercase();

    let metrics = storage::metrics::load_latest_metrics_for_ticker(pool, &ticker)
        .await
        .map_err(internal)?;
    if metrics.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("ticker '{ticker}' not found"),
        ));
    }

    let scores = storage::scores::load_profile_scores(pool, &ticker)
        .await
        .map_err(internal)?;

    Ok(Json(StockDetailResponse {
        ticker,
        metrics,
        scores,
    }))
}

#[derive(Debug, Serialize)]
struct ProfileInfo {
    name: String,
    description: &'static str,
    weights: ProfileWeights,
}

#[derive(Debug, Serialize)]
struct ProfilesResponse {
    profiles: Vec<ProfileInfo>,
}

async fn profiles(State(state): State<AppState>) -> Json<ProfilesResponse> {
    let profiles = state
        .engine
        .profiles
        .iter()
        .map(|(name, weights)| ProfileInfo {
            name: name.clone(),
            description: profile_description(name),
            weights: *weights,
        })
        .collect();

    Json(ProfilesResponse { profiles })
}

fn profile_description(name: &str) -> &'static str {
    match name {
        "low" => "Conservative - heavy risk penalties, favors stability.",
        "medium" => "Balanced - equal weight on return and risk.",
        "high" => "Aggressive - favors momentum, tolerates more risk.",
        _ => "",
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
