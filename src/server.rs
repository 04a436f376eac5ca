//! Server initialization and startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, put};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prerender_browser::{PagePool, PagePoolConfig};
use prerender_config::Config;

use crate::handlers;
use crate::state::AppState;

/// Console tracing with `RUST_LOG` filtering, defaulting to `info`.
pub(crate) fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/browser/list", get(handlers::browser_list))
        .route("/browser/version", get(handlers::browser_version))
        .route("/browser/disable", put(handlers::browser_disable))
        .route("/browser/enable", put(handlers::browser_enable))
        .fallback(handlers::handle_render)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}

pub(crate) async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let pool_config = PagePoolConfig {
        concurrency: config.concurrency,
        max_iterations: config.iterations,
        render_timeout: config.prerender_timeout,
        user_agent: config.user_agent.clone(),
    };
    let pool = PagePool::new(&config.chrome_endpoint(), pool_config);
    let cache = prerender_cache::from_config(&config.cache)?;

    if config.concurrency > 0 {
        if let Err(e) = pool.bootstrap().await {
            error!(
                "Error bootstrapping the page pool; is the browser running \
                 with remote debugging enabled? {e}"
            );
            pool.shutdown().await;
            return Err(e.into());
        }
    }

    let state = Arc::new(AppState::new(config.clone(), pool.clone(), cache));
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Prerender v{} listening on {addr}", env!("CARGO_PKG_VERSION"));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    pool.shutdown().await;
    Ok(())
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}, using Ctrl-C only");
                let _ = ctrl_c.await;
                info!("Received Ctrl-C, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("Received Ctrl-C, shutting down");
    }
}
