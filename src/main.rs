//!
//! OCPP 1.6 charge-point backend.
//! Reads configuration from TOML file (~/.config/ocpp-backend/config.toml).

use std::sync::Arc;

use sea_orm_migration::MigratorTrait;
use tracing::{error, info};

use ocpp_backend::auth::AcceptAllAuthorizer;
use ocpp_backend::commands::CommandGateway;
use ocpp_backend::registry::build_registry;
use ocpp_backend::server::{spawn_signal_listener, OcppServer, ShutdownSignal};
use ocpp_backend::storage::database::migrator::Migrator;
use ocpp_backend::storage::SharedStore;
use ocpp_backend::{api, default_config_path, init_database, AppConfig, SeaOrmStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Load configuration ─────────────────────────────────────
    let config_path = std::env::var("OCPP_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let config = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            init_logging(&cfg.logging.level);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            let cfg = AppConfig::default();
            init_logging(&cfg.logging.level);
            error!("Failed to load config: {}. Using defaults.", e);
            cfg
        }
    };

    info!("Starting OCPP charge-point backend...");

    // ── Database ───────────────────────────────────────────────
    info!("Database: {}", config.database.url);
    let db = match init_database(&config.database.url).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e.into());
        }
    };

    info!("Running database migrations...");
    Migrator::up(&db, None).await?;
    info!("Migrations completed");

    let store: SharedStore = Arc::new(SeaOrmStore::new(db));

    // ── Session registry & command gateway ─────────────────────
    let registry = build_registry(&config.registry).await?;
    let authorizer = Arc::new(AcceptAllAuthorizer);
    let gateway = Arc::new(CommandGateway::new(store.clone(), registry.clone()));

    // ── Shutdown handling ──────────────────────────────────────
    let shutdown = ShutdownSignal::new();
    spawn_signal_listener(shutdown.clone());

    // ── Admin HTTP API ─────────────────────────────────────────
    let api_addr = config.server.api_address();
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("Admin API listening on http://{}", api_addr);
    let api_shutdown = shutdown.clone();
    let api_task = tokio::spawn(async move {
        let router = api::router(gateway);
        if let Err(e) = axum::serve(api_listener, router)
            .with_graceful_shutdown(async move { api_shutdown.wait().await })
            .await
        {
            error!("Admin API server error: {}", e);
        }
    });

    // ── OCPP WebSocket server ──────────────────────────────────
    let server = OcppServer::new(config.server.clone(), store, authorizer, registry)
        .with_shutdown(shutdown.clone());
    server.run().await?;

    // The WebSocket server returns once shutdown is triggered; give the API
    // server its bounded window to drain.
    let _ = tokio::time::timeout(
        std::time::Duration::from_secs(config.server.shutdown_timeout),
        api_task,
    )
    .await;

    info!("Shutdown complete");
    Ok(())
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}
