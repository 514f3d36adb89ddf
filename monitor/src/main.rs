use anyhow::Context;
use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    routing::get,
    Router,
};
use monitor::config::{Config, StoreKind};
use monitor::rest::{self, AppState};
use monitor::store::{DeviceStore, MemoryDeviceStore};
use monitor::{db, metrics};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may carry RUST_LOG, so load it before the subscriber
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    info!("Starting fleet monitor");
    info!("HTTP server: {}", config.http_addr);
    info!("Feed interval: {:?}", config.feed_interval);

    if let Err(e) = metrics::init_metrics() {
        warn!("Failed to register metrics: {}", e);
    }

    let store: Arc<dyn DeviceStore> = match config.store {
        StoreKind::Postgres => {
            info!("Database: {}", config.redacted_database_url());
            let pool = db::make_pool(&config.database_url, config.db_max_connections)
                .await
                .context("failed to connect to database")?;
            Arc::new(db::PgDeviceStore::new(pool))
        }
        StoreKind::Memory => {
            warn!("Using in-memory device store, data is lost on exit");
            Arc::new(MemoryDeviceStore::new())
        }
    };

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .context("invalid CORS_ORIGIN")?,
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true);

    let state = AppState::new(store, config.feed_interval);
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    Ok(())
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    metrics::gather_metrics().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}
