//! bullion-gateway server entry point.
//!
//! Starts the Axum HTTP server exposing the backfill control surface
//! and the automation tick endpoint.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use bullion_gateway::api;
use bullion_gateway::api::auth::StaticTokenGate;
use bullion_gateway::app_state::AppState;
use bullion_gateway::config::{GatewayConfig, StoreBackend};
use bullion_gateway::persistence::memory::MemoryStore;
use bullion_gateway::persistence::postgres::PostgresStore;
use bullion_gateway::persistence::{AutomationStore, CatalogueStore, JobStore, SnapshotStore};
use bullion_gateway::service::automation_handlers::SnapshotCleanupHandler;
use bullion_gateway::service::{AutomationScheduler, BackfillExecutor, HttpPriceFeed, JobService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting bullion-gateway");

    // Build stores
    let (jobs, catalogue, snapshots, automations): (
        Arc<dyn JobStore>,
        Arc<dyn CatalogueStore>,
        Arc<dyn SnapshotStore>,
        Arc<dyn AutomationStore>,
    ) = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .min_connections(config.database_min_connections)
                .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
                .connect(&config.database_url)
                .await?;
            if config.run_migrations {
                sqlx::migrate!("./migrations").run(&pool).await?;
            }
            let store = Arc::new(PostgresStore::new(pool));
            (
                Arc::clone(&store) as Arc<dyn JobStore>,
                Arc::clone(&store) as Arc<dyn CatalogueStore>,
                Arc::clone(&store) as Arc<dyn SnapshotStore>,
                store as Arc<dyn AutomationStore>,
            )
        }
        StoreBackend::Memory => {
            tracing::warn!("running against the in-memory store; nothing will survive a restart");
            let store = Arc::new(MemoryStore::new());
            (
                Arc::clone(&store) as Arc<dyn JobStore>,
                Arc::clone(&store) as Arc<dyn CatalogueStore>,
                Arc::clone(&store) as Arc<dyn SnapshotStore>,
                store as Arc<dyn AutomationStore>,
            )
        }
    };

    // Build service layer
    let job_service = Arc::new(JobService::new(Arc::clone(&jobs), Arc::clone(&catalogue)));
    let feed = Arc::new(HttpPriceFeed::new());
    let executor = Arc::new(BackfillExecutor::new(
        Arc::clone(&jobs),
        Arc::clone(&catalogue),
        Arc::clone(&snapshots),
        feed,
    ));

    let mut scheduler = AutomationScheduler::new(Arc::clone(&automations));
    scheduler.register(
        "snapshot_cleanup",
        Arc::new(SnapshotCleanupHandler::new(Arc::clone(&snapshots))),
    );
    let scheduler = Arc::new(scheduler);

    let admin_gate = Arc::new(StaticTokenGate::new(
        config.admin_token.clone(),
        config.admin_identity.clone(),
    ));

    // Build application state
    let app_state = AppState {
        job_service,
        executor,
        scheduler,
        admin_gate,
    };

    // Build router
    let app = api::build_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
