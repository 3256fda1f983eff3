/// HTTP server lifecycle
use super::routes::{create_router, AppState};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Gateway HTTP server
pub struct GatewayServer {
    addr: SocketAddr,
    state: AppState,
    local_addr: Option<SocketAddr>,
    server_handle: Option<JoinHandle<()>>,
}

impl GatewayServer {
    /// Create a new server
    ///
    /// # Arguments
    /// * `addr` - Address to bind to (e.g., "127.0.0.1:5000")
    /// * `state` - Facade and discovery engine shared by all handlers
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            state,
            local_addr: None,
            server_handle: None,
        }
    }

    /// Bind and start serving in a background task
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting gateway API server on {}", self.addr);

        let app = create_router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.addr))?;
        let local_addr = listener.local_addr()?;
        info!("Gateway API listening on {}", local_addr);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Gateway API server error: {}", e);
            }
        });

        self.local_addr = Some(local_addr);
        self.server_handle = Some(handle);

        Ok(())
    }

    /// Stop the server
    pub async fn stop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            info!("Stopping gateway API server");
            handle.abort();
        }
    }

    /// Configured bind address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Actual listening address, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for GatewayServer {
    fn drop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}
