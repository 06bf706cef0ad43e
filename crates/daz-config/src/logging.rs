//! Tracing setup for the daz-mcp binary
//!
//! Output always goes to stderr. In stdio mode stdout belongs to the MCP
//! session, so a single stray log line there would corrupt the stream.

use crate::{AppConfig, LogFormat};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber described by `config`
///
/// A non-empty `RUST_LOG` replaces the configured level entirely. `LOG_FORMAT`
/// picks between `json` and `pretty` output and wins over `logging.format`.
///
/// ```bash
/// LOG_LEVEL=debug daz-mcp --stdio
/// LOG_FORMAT=json RUST_LOG=daz_services=debug daz-mcp
/// ```
pub fn initialize(config: &AppConfig) {
    let log_level = config
        .logging
        .level
        .parse()
        .unwrap_or(tracing::Level::INFO);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(log_level.into()));

    let format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|f| match f.to_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" | "human" => Some(LogFormat::Pretty),
            _ => None,
        })
        .unwrap_or_else(|| config.logging.format.clone());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Span wrapped around the handling of one inbound frame
///
/// ```rust
/// let span = daz_config::logging::request_span("7", "ws");
/// let _guard = span.enter();
/// tracing::debug!("dispatching");
/// ```
pub fn request_span(request_id: &str, transport: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        request_id = %request_id,
        transport = %transport
    )
}
