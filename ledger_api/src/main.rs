//! Ledger HTTP + RPC server.
//!
//! Boots the engine against Postgres, spawns the outbox worker as a
//! background task, and serves both a REST surface and a single `/rpc`
//! endpoint over the same `AppState`.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use ledger_core::config::{Config, LogFormat};
use ledger_core::outbox_worker::{LoggingSink, OutboxWorker};
use ledger_core::Application;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod error_mapping;
mod http;
mod rpc;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    init_tracing(&config);

    tracing::info!("connecting to store");
    let app = Arc::new(Application::connect(config).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = OutboxWorker::new(app.engine.store().clone(), Arc::new(LoggingSink));
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let state = AppState { app: app.clone() };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/health", get(http::health::check))
        .route("/consistency", get(http::consistency::check))
        .route("/accounts", post(http::accounts::create).get(http::accounts::list))
        .route("/accounts/:id", get(http::accounts::get))
        .route("/accounts/:id/transfers", get(http::transfers::list_for_account))
        .route("/accounts/:id/holds", get(http::holds::list_for_account))
        .route("/accounts/:id/entries", get(http::entries::list_for_account))
        .route("/accounts/:id/balance-at", get(http::entries::balance_at))
        .route("/transfers", post(http::transfers::create))
        .route("/transfers/batch", post(http::transfers::create_batch))
        .route("/transfers/:id", get(http::transfers::get))
        .route("/transfers/:id/reverse", post(http::transfers::reverse))
        .route("/transfers/:id/entries", get(http::entries::list_for_transfer))
        .route("/holds", post(http::holds::create))
        .route("/holds/:id", get(http::holds::get))
        .route("/holds/:id/void", post(http::holds::void))
        .route("/holds/:id/capture", post(http::holds::capture))
        .route("/rpc", post(rpc::dispatch))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", app.config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "ledger_api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await?;

    let _ = shutdown_tx.send(true);
    match tokio::time::timeout(app.config.http_shutdown_timeout, worker_handle).await {
        Ok(Ok(())) => tracing::info!("outbox worker stopped cleanly"),
        Ok(Err(err)) => tracing::error!(%err, "outbox worker task panicked"),
        Err(_) => tracing::warn!("outbox worker did not stop within the shutdown timeout"),
    }

    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining in-flight requests");
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
