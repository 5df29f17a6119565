pub mod handler;
pub mod transport;

use crate::{Config, Error, Result};
use rmcp::{transport::stdio, ServiceExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use handler::ArxivServerHandler;

/// MCP server over stdio
pub struct Server {
    config: Arc<Config>,
    cancellation_token: CancellationToken,
}

impl Server {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::new_with_arc(Arc::new(config))
    }

    #[must_use]
    pub fn new_with_arc(config: Arc<Config>) -> Self {
        Self {
            config,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Serve until the client disconnects or a shutdown signal arrives
    pub async fn run(&self) -> Result<()> {
        info!("Starting arXiv MCP server");

        let handler = ArxivServerHandler::new(Arc::clone(&self.config)).await?;

        transport::validate_stdio_transport()
            .map_err(|e| Error::Service(format!("Transport validation failed: {e}")))?;

        let shutdown_token = self.cancellation_token.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown_token.cancel();
        });

        let result = tokio::select! {
            result = Self::serve(handler) => result,
            () = self.cancellation_token.cancelled() => {
                info!("Shutdown signal received, stopping MCP server");
                Ok(())
            }
        };

        info!("MCP server shutdown complete");
        result
    }

    async fn serve(handler: ArxivServerHandler) -> Result<()> {
        info!("Serving MCP on stdio");

        let service = handler
            .serve(stdio())
            .await
            .map_err(|e| Error::Service(format!("Failed to start MCP server: {e}")))?;

        let quit_reason = service
            .waiting()
            .await
            .map_err(|e| Error::Service(format!("MCP server error: {e}")))?;

        info!("MCP server completed with reason: {:?}", quit_reason);
        Ok(())
    }

    pub fn shutdown(&self) {
        warn!("Initiating server shutdown");
        self.cancellation_token.cancel();
    }

    /// Check if the server has been requested to shutdown
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Get the server configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
        () = wait_for_ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT, initiating graceful shutdown"),
        Err(e) => {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_creation() {
        let server = Server::new(Config::default());
        assert!(!server.is_shutdown_requested());
    }

    #[test]
    fn test_server_shutdown() {
        let server = Server::new(Config::for_workspace("/tmp/arxiv-mcp-test"));
        server.shutdown();
        assert!(server.is_shutdown_requested());
        assert_eq!(server.config().workspace.root.to_str(), Some("/tmp/arxiv-mcp-test"));
    }
}
