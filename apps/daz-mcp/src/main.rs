//! daz-mcp main binary

use clap::Parser;
use daz_config::AppConfig;
use daz_handlers::McpRouter;
use daz_transport::McpDispatcher;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "daz-mcp")]
#[command(version)]
#[command(about = "DAZ Studio MCP server")]
struct Cli {
    /// Serve MCP over stdin/stdout instead of WebSocket
    #[arg(long)]
    stdio: bool,

    /// Explicit configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Arc::new(AppConfig::load(cli.config.as_deref())?);

    daz_config::logging::initialize(&config);

    tracing::info!(
        version = daz_handlers::SERVER_VERSION,
        "Starting DAZ Studio MCP server"
    );
    tracing::info!(executable = %config.daz.executable.display(), "DAZ Studio executable");
    tracing::info!(script_root = %config.daz.script_root.display(), "Script root");
    tracing::info!(call_timeout_secs = config.daz.call_timeout_secs, "Call timeout");

    let dispatcher: Arc<dyn McpDispatcher> = Arc::new(McpRouter::from_config(&config));

    if cli.stdio {
        if let Err(e) = daz_transport::start_stdio_server(dispatcher).await {
            tracing::error!(
                error_category = "transport_error",
                error = %e,
                "Stdio server failed"
            );
            return Err(e.into());
        }
    } else {
        tracing::info!(
            "Starting WebSocket server on {}:{}",
            config.server.host,
            config.server.port
        );
        tokio::select! {
            result = daz_transport::start_ws_server(config.clone(), dispatcher) => {
                if let Err(e) = result {
                    tracing::error!(
                        error_category = "transport_error",
                        error = %e,
                        "WebSocket server failed"
                    );
                    return Err(e.into());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
            }
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}
