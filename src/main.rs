use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use listing_quota::{
    api::quota_routes, config, scheduler, PgPlatformDirectory, PgQuotaStore, QuotaEngine,
};
use sqlx::postgres::PgPoolOptions;
use tokio::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

async fn root() -> &'static str {
    "Listing Quota API"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(config::DATABASE_URL.as_str())
        .await
        .context("failed to connect to DATABASE_URL")?;

    if let Err(error) = sqlx::migrate!().run(&pool).await {
        if *config::ALLOW_MIGRATION_FAILURE {
            tracing::warn!(
                ?error,
                "Database migrations failed but continuing due to ALLOW_MIGRATION_FAILURE"
            );
        } else {
            return Err(error).context("failed to run database migrations");
        }
    }

    let settings = config::QuotaSettings::from_env();
    let engine = QuotaEngine::new(
        Arc::new(PgQuotaStore::new(pool.clone())),
        Arc::new(PgPlatformDirectory::new(pool.clone())),
        settings,
    );

    let pricing = engine
        .global_config()
        .await
        .context("pricing configuration unavailable at startup")?;
    tracing::info!(
        phase = %pricing.current_phase,
        launch_phase_end_date = %pricing.launch_phase_end_date,
        "pricing configuration loaded"
    );

    scheduler::spawn(
        engine.clone(),
        Duration::from_secs(*config::QUOTA_CLEANUP_INTERVAL_SECS),
    );

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route("/", get(root))
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(quota_routes())
        .layer(prometheus_layer)
        .layer(Extension(engine));

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .context("invalid BIND_ADDRESS/BIND_PORT")?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
