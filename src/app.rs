//! Application wiring
//!
//! config -> Central client -> tool registry -> MCP server -> transport,
//! with signal handling and an orderly shutdown that always releases the
//! Central connection.

use crate::central::Client;
use crate::config::{Config, ServerType};
use crate::error::{McpError, Result};
use crate::mcp::{http, stdio, McpServer};
use crate::metrics;
use crate::tools::{all_toolsets, ToolDefinition, ToolRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Registry over every toolset, honoring the global read-only switch
pub fn build_registry(config: &Config, client: Arc<Client>) -> ToolRegistry {
    ToolRegistry::new(
        config.global.read_only_tools,
        all_toolsets(config, client),
    )
}

/// Tools that `serve` would expose under `config`; nothing is dialed
pub fn exposed_tools(config: &Config) -> Vec<ToolDefinition> {
    let client = Arc::new(Client::new(config.central.clone()));
    build_registry(config, client).get_all_tools()
}

/// Run the MCP server until a shutdown signal or, for stdio, end of input
///
/// # Errors
///
/// Returns an error when the first connection to Central fails, the
/// listener cannot be bound, or the transport stops abnormally.
pub async fn run(config: Config) -> Result<()> {
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    run_until(config, shutdown).await
}

/// Like [`run`], stopping when `shutdown` is cancelled
pub async fn run_until(config: Config, shutdown: CancellationToken) -> Result<()> {
    tracing::info!(config = ?config.redacted(), "Configuration loaded successfully");
    metrics::init_metrics_exporter();

    let client = Arc::new(Client::new(config.central.clone()));
    serve_with(&config, client, shutdown).await
}

/// Serve with an already built Central client
///
/// Settings are checked before the client connects; once connected, the
/// client is closed on every exit path.
pub async fn serve_with(
    config: &Config,
    client: Arc<Client>,
    shutdown: CancellationToken,
) -> Result<()> {
    let server_type = config.server_type().ok_or_else(|| {
        McpError::Config(format!("unsupported server type: {}", config.server.server_type))
    })?;
    let port = match server_type {
        ServerType::Stdio => None,
        ServerType::StreamableHttp => Some(u16::try_from(config.server.port).map_err(|_| {
            McpError::Config("server.port must be between 1 and 65535".to_string())
        })?),
    };

    let registry = build_registry(config, client.clone());
    registry.log_registration();

    client.connect().await?;

    let server = Arc::new(McpServer::new(registry));
    tracing::info!(server_type = server_type.as_str(), "Starting StackRox MCP server");

    let result = match port {
        None => stdio::serve(server, tokio::io::stdin(), tokio::io::stdout(), shutdown).await,
        Some(port) => {
            http::serve(
                server,
                &config.server.address,
                port,
                shutdown.cancelled_owned(),
            )
            .await
        }
    };

    client.close().await;
    tracing::info!("StackRox MCP server stopped");
    result
}

/// Resolve on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                ctrl_c.await;
                tracing::info!("Received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        tracing::info!("Received SIGINT, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_config, FakeCentral};

    #[test]
    fn test_exposed_tools_follow_toolset_switches() {
        let mut config = test_config();
        let names = |config: &Config| -> Vec<String> {
            exposed_tools(config).into_iter().map(|t| t.name).collect()
        };

        assert_eq!(names(&config).len(), 3);

        config.tools.vulnerability.enabled = false;
        assert_eq!(names(&config), vec!["list_clusters"]);
    }

    #[tokio::test]
    async fn test_http_server_stops_on_shutdown() {
        let mut config = test_config();
        config.server.address = "127.0.0.1".to_string();
        config.server.port = 0;

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        run_until(config, shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn test_out_of_range_port_fails_before_connecting() {
        let central = FakeCentral::new(|_, _| Ok(Default::default()));
        let mut config = test_config();
        config.server.port = 70_000;
        let client = central.client(&config);

        let err = serve_with(&config, client.clone(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("server.port must be between 1 and 65535"));
        assert!(!client.is_connected().await);
        assert!(central.calls().is_empty());
    }

    #[tokio::test]
    async fn test_client_closed_after_http_server_stops() {
        let central = FakeCentral::new(|_, _| Ok(Default::default()));
        let mut config = test_config();
        config.server.address = "127.0.0.1".to_string();
        config.server.port = 0;
        let client = central.client(&config);

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        serve_with(&config, client.clone(), shutdown).await.unwrap();

        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn test_unknown_server_type_is_rejected() {
        let mut config = test_config();
        config.server.server_type = "websocket".to_string();
        let err = run_until(config, CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("unsupported server type"));
    }
}
