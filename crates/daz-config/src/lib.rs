//! Configuration management for the DAZ Studio MCP bridge
//!
//! Settings are resolved once at startup into an [`AppConfig`] value that is
//! passed explicitly to every component.

pub mod config;
pub mod logging;

pub use config::{AppConfig, DazConfig, LogFormat, LoggingConfig, ServerConfig};
