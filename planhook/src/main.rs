//! Planhook Web Server - order webhook receiver.
//!
//! This binary:
//! - Receives signed order webhooks
//! - Verifies the signature over the raw body
//! - Sets the purchased plan on the buyer's user record
//!
//! The store pool is built once here and injected into the processor.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use planhook::web::router;
use planhook::{
    AppState, Config, MemoryUserStore, OrderProcessor, PlanMapping, PostgresUserStore,
    StoreBackend, UserStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal outside local development
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!(dotenv_loaded = dotenv_loaded, "web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        webhook_secret_configured = config.webhook_secret.is_some(),
        signature_header = %config.signature_header,
        plan_policy = config.plan_policy.as_str(),
        store_backend = ?config.store_backend,
        users_table = %config.users_table,
        database_url_length = config.database_url.len(),
        "config_loaded"
    );

    if config.webhook_secret.is_none() {
        warn!("webhook_secret_missing_all_deliveries_will_be_rejected");
    }

    let store = build_store(&config)?;
    check_store(store.as_ref(), config.store_required_on_startup).await?;

    let plans = PlanMapping::default();
    info!(
        table_version = plans.version(),
        products = plans.len(),
        "plan_mapping_loaded"
    );

    let processor = OrderProcessor::new(Arc::clone(&store), plans, config.plan_policy);
    let state = AppState::new(config.clone(), processor);
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Close pooled store connections once in-flight requests are done
    store.close().await;

    info!("web_server_shutdown_complete");

    Ok(())
}

fn build_store(config: &Config) -> Result<Arc<dyn UserStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let store = PostgresUserStore::from_config(config)
                .context("Failed to configure PostgreSQL store")?;
            info!(
                max_connections = config.store_max_connections,
                acquire_timeout_ms = config.store_acquire_timeout_ms,
                "postgres_pool_created"
            );
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("memory_store_selected_data_is_not_persisted");
            Ok(Arc::new(MemoryUserStore::new()))
        }
    }
}

/// Ping the store and create its schema before serving.
///
/// Fatal only when the store is required at startup; otherwise the first
/// write retries the schema step through the lazy pool.
async fn check_store(store: &dyn UserStore, required: bool) -> Result<()> {
    let ready = match store.ping().await {
        Ok(()) => store.prepare().await,
        Err(e) => Err(e),
    };

    match ready {
        Ok(()) => {
            info!("store_ready");
            Ok(())
        }
        Err(e) if required => {
            error!(error = %e, "store_not_ready_on_startup");
            Err(e).context("Store not ready and STORE_REQUIRED_ON_STARTUP is set")
        }
        Err(e) => {
            warn!(error = %e, "store_not_ready_on_startup_continuing");
            Ok(())
        }
    }
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
