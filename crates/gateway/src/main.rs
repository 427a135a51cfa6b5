use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

mod app;
mod auth;
mod error;
mod http;
mod pagination;
mod payment;
mod request_id;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("PLATFORM_CONFIG").ok();
    let config = match platform_core::config::PlatformConfig::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            warn!("config load failed ({e}), using defaults");
            platform_core::config::PlatformConfig::default()
        }
    };

    let db = match persistence::bootstrap(&config.database.path) {
        Ok(db) => db,
        Err(e) => {
            error!("schema bootstrap failed: {e}");
            std::process::exit(2);
        }
    };

    let bind = config.server.bind.clone();
    let port = config.server.port;

    let state = match app::AppState::new(config, db) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("gateway startup failed: {e}");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = scheduler::SchedulerEngine::new(state.db.clone(), state.dispatcher.clone(), state.tenant_lookup())?;
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    let router = app::build_router(state.clone());
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await;

    let _ = shutdown_tx.send(true);
    let _ = scheduler_task.await;

    if let Err(e) = serve_result {
        error!("server error: {e}");
        std::process::exit(1);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
