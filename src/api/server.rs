use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::handlers;
use crate::chain::ChainClient;
use crate::manager::WalletManager;
use crate::storage::ShareStore;

pub fn create_router<S, C>(manager: Arc<WalletManager<S, C>>) -> Router
where
    S: ShareStore + 'static,
    C: ChainClient + 'static,
{
    let cors = cors_layer(&manager.config.allowed_origins);

    Router::new()
        // Wallet routes
        .route(
            "/api/wallet/:user_id/create",
            post(handlers::create_wallet_handler::<S, C>),
        )
        .route(
            "/api/wallet/:user_id/recover",
            post(handlers::recover_wallet_handler::<S, C>),
        )
        .route(
            "/api/wallet/:user_id/status",
            get(handlers::wallet_status_handler::<S, C>),
        )
        .route(
            "/api/wallet/:user_id/balance",
            get(handlers::wallet_balance_handler::<S, C>),
        )
        .route(
            "/api/wallet/:user_id/bind",
            post(handlers::bind_key_handler::<S, C>),
        )
        .route(
            "/api/wallet/:user_id/setup",
            post(handlers::setup_account_handler::<S, C>),
        )
        .route("/health", get(handlers::health_handler::<S, C>))
        .layer(cors)
        .with_state(manager)
}

pub async fn start_server<S, C>(manager: Arc<WalletManager<S, C>>) -> anyhow::Result<()>
where
    S: ShareStore + 'static,
    C: ChainClient + 'static,
{
    let addr = manager.config.bind_address.clone();
    let app = create_router(manager);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Set ALLOWED_ORIGINS for production; without it any origin is allowed
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origin_list: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if origin_list.is_empty() {
        log::warn!("CORS: Allowing all origins (development mode). Set ALLOWED_ORIGINS env var for production.");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        log::info!("CORS configured for origins: {}", origins.join(","));
        CorsLayer::new()
            .allow_origin(origin_list)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            log::info!("Received SIGTERM signal");
        },
    }

    log::info!("Shutdown signal received, exiting gracefully...");
}
