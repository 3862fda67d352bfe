use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockprice_core::domain::stock::PriceEntry;
use stockprice_core::pricing::GroupingStrategy;
use stockprice_core::storage::PgCatalog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockprice_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => {
            match stockprice_core::storage::connect(db_url, settings.db_max_connections).await {
                Ok(pool) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db connect failed; starting API in degraded mode");
                    None
                }
            }
        }
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        catalog: pool.map(PgCatalog::new),
        grouping: settings.grouping,
    };

    let app = router(state);

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

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/products/:product_id/latest-prices", get(get_latest_prices))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    catalog: Option<PgCatalog>,
    grouping: GroupingStrategy,
}

#[derive(Debug, Deserialize)]
struct LatestPricesQuery {
    outlet_id: String,
    grouping: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiLatestPrices {
    product_id: String,
    outlet_id: String,
    grouping: GroupingStrategy,
    prices: Vec<PriceEntry>,
}

async fn get_latest_prices(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(query): Query<LatestPricesQuery>,
) -> Result<Json<ApiLatestPrices>, StatusCode> {
    let grouping = match query.grouping.as_deref() {
        Some(s) => s
            .parse::<GroupingStrategy>()
            .map_err(|_| StatusCode::BAD_REQUEST)?,
        None => state.grouping,
    };

    let outlet_id = query.outlet_id.trim().to_string();
    if outlet_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let Some(catalog) = &state.catalog else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let prices =
        stockprice_core::backfill::preview_latest_prices(catalog, &product_id, &outlet_id, grouping)
            .await
            .map_err(|e| {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(%product_id, error = %e, "latest price lookup failed");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

    Ok(Json(ApiLatestPrices {
        product_id,
        outlet_id,
        grouping,
        prices,
    }))
}

fn init_sentry(settings: &stockprice_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
