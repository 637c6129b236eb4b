use std::net::SocketAddr;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use jamroom_store::StoreError;

use crate::context::AppContext;
use crate::handlers;

/// Build the Axum router with all routes.
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/ws", get(handlers::ws_upgrade))
        .route("/join/public", get(handlers::list_public))
        .route("/join/private", get(handlers::join_private))
        .route("/create/done", post(handlers::create_session))
        .route("/health", get(handlers::health))
        .with_state(ctx)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns a handle used to shut down.
pub async fn start(ctx: AppContext) -> Result<ServerHandle, std::io::Error> {
    let listener = tokio::net::TcpListener::bind(ctx.config.bind_addr()).await?;
    let addr = listener.local_addr()?;

    let router = build_router(ctx.clone());
    let shutdown = ctx.shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            warn!(error = %e, "server exited with error");
        }
    });

    info!(addr = %addr, "jamroom server started");

    Ok(ServerHandle { addr, ctx, server })
}

/// Handle returned by [`start`]; owns the service context until shutdown.
pub struct ServerHandle {
    pub addr: SocketAddr,
    ctx: AppContext,
    server: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Stop accepting, drain live connections through the relay, then close
    /// the store. Waits at most the configured grace period for draining.
    pub async fn shutdown(self) -> Result<(), StoreError> {
        let grace = self.ctx.config.shutdown_grace();
        info!(
            connections = self.ctx.gateway.connection_count(),
            grace_secs = grace.as_secs(),
            "shutting down"
        );
        self.ctx.shutdown.cancel();

        let gateway = std::sync::Arc::clone(&self.ctx.gateway);
        let drained = tokio::time::timeout(grace, async move {
            while gateway.connection_count() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = self.ctx.gateway.connection_count(),
                "connections still open after grace period"
            );
        }

        if tokio::time::timeout(grace, self.server).await.is_err() {
            warn!("HTTP server did not stop within grace period");
        }

        self.ctx.directory.close().await?;
        info!("shutdown complete");
        Ok(())
    }
}
