use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use university_leads_api::config::{Config, StorageBackend};
use university_leads_api::db::Database;
use university_leads_api::db_storage::PgLeadStore;
use university_leads_api::handlers::AppState;
use university_leads_api::memory_storage::MemoryLeadStore;
use university_leads_api::notifier::{ReqwestTransport, WebhookNotifier};
use university_leads_api::routes::build_router;
use university_leads_api::storage::LeadStore;

/// How long shutdown waits for in-flight webhook deliveries.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Main entry point for the application.
///
/// Initializes logging, configuration, the lead store and webhook client,
/// then serves until SIGINT/SIGTERM. On shutdown, pending webhook deliveries
/// are drained before the database pool is closed.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "university_leads_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let (store, db): (Arc<dyn LeadStore>, Option<Arc<Database>>) = match config.storage {
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL required for postgres storage"))?;
            let db = Arc::new(Database::new(
                url,
                config.db_max_connections,
                config.duplicate_phone_policy,
            ));
            // Fail fast on an unreachable database or an unappliable policy
            db.connect().await.map_err(|e| anyhow::anyhow!("{}", e))?;
            (Arc::new(PgLeadStore::new(Arc::clone(&db))), Some(db))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory lead store; leads are lost on restart");
            (
                Arc::new(MemoryLeadStore::new(config.duplicate_phone_policy)),
                None,
            )
        }
    };

    let notifier = WebhookNotifier::new(
        Arc::new(ReqwestTransport::new()?),
        config.webhook_url.clone(),
    );

    let state = Arc::new(AppState::new(config.clone(), store, notifier));
    let app = build_router(Arc::clone(&state))?;

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {} ({})", addr, config.environment);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped accepting requests");
    state.submissions.drain(DRAIN_TIMEOUT).await;
    if let Some(db) = db {
        db.close().await;
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
