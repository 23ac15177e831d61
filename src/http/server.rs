//! HTTPS server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the CONNECT handler
//! - Wire up middleware (tracing)
//! - Serve the router over TLS with axum-server
//! - Stop accepting on shutdown without touching established tunnels

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::net::connection::TunnelTracker;
use crate::tunnel::{connect_handler, AppState, Dialer, EventSink, TracingSink};

/// Build the Axum router.
///
/// There are no routes: CONNECT requests carry an authority instead of a
/// path, so everything goes to the fallback, which rejects non-CONNECT methods.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(connect_handler)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// HTTPS server for the CONNECT proxy.
pub struct ProxyServer {
    router: Router,
    config: ProxyConfig,
    tracker: TunnelTracker,
}

impl ProxyServer {
    /// Create a new server that logs through `tracing`.
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_events(config, Arc::new(TracingSink))
    }

    /// Create a new server reporting tunnel events to `events`.
    pub fn with_events(config: ProxyConfig, events: Arc<dyn EventSink>) -> Self {
        let tracker = TunnelTracker::new();
        let state = AppState {
            dialer: Dialer::new(config.timeouts.dial_timeout()),
            events,
            tracker: tracker.clone(),
        };

        Self {
            router: build_router(state),
            config,
            tracker,
        }
    }

    /// Live-tunnel tracker shared with the handler.
    pub fn tracker(&self) -> TunnelTracker {
        self.tracker.clone()
    }

    /// Serve until a shutdown signal arrives.
    ///
    /// `handle` reports the bound address once listening. Shutdown stops
    /// accepting and drains HTTP exchanges; hijacked tunnels keep running.
    pub async fn run(
        self,
        tls: RustlsConfig,
        handle: Handle,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self
            .config
            .listener
            .bind_address
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let grace = self.config.timeouts.shutdown_grace();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received, no longer accepting connections");
            shutdown_handle.graceful_shutdown(Some(grace));
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!(
            active_tunnels = self.tracker.active_count(),
            "HTTPS server stopped"
        );
        Ok(())
    }
}
