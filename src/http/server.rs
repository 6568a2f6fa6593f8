//! HTTP server for the dashboard API.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info};

use super::routes::router;
use super::state::AppState;
use crate::error::{InsightError, Result};

/// Serves the dashboard router on a TCP address.
pub struct DashboardServer {
    addr: SocketAddr,
    state: AppState,
}

impl DashboardServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Start the server with graceful shutdown.
    ///
    /// Blocks until `signal` resolves and in-flight requests have finished.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind dashboard server");
            InsightError::Io(e)
        })?;

        info!(addr = %self.addr, "Starting dashboard HTTP server with graceful shutdown");

        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "Dashboard server failed");
                InsightError::Io(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InsightConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let state = AppState::from_config(&InsightConfig::default()).unwrap();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = DashboardServer::new(addr, state);

        let result = server
            .serve_with_shutdown(tokio::time::sleep(Duration::from_millis(50)))
            .await;

        assert!(result.is_ok());
    }
}
