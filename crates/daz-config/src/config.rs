//! Configuration management for the DAZ Studio MCP bridge

use daz_foundation::errors::{DazError, DazResult};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config files searched when no explicit path is given, first match wins
const CONFIG_FILE_PATHS: [&str; 2] = ["daz-mcp.toml", ".daz-mcp/config.toml"];

/// Prefix for structured environment overrides (`DAZ_MCP__SERVER__PORT=9000`)
const ENV_PREFIX: &str = "DAZ_MCP__";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// External renderer configuration
    #[serde(default)]
    pub daz: DazConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind the WebSocket listener to
    pub host: String,
    /// Port to bind the WebSocket listener to
    pub port: u16,
    /// Maximum number of concurrent WebSocket clients
    pub max_clients: Option<usize>,
}

/// External renderer (DAZ Studio) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DazConfig {
    /// Path to the DAZ Studio executable
    pub executable: PathBuf,
    /// Directory holding the `.dsa` scripts
    pub script_root: PathBuf,
    /// Wall-clock limit for a single script run, in seconds
    pub call_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            max_clients: None,
        }
    }
}

impl Default for DazConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(r"C:\Program Files\DAZ 3D\DAZStudio4\dazstudio.exe"),
            script_root: PathBuf::from("scripts"),
            call_timeout_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Whether the configured host only accepts local connections
    pub fn is_loopback_host(&self) -> bool {
        match self.host.as_str() {
            "localhost" => true,
            host => host
                .parse::<std::net::IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false),
        }
    }

    /// `host:port` string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DazConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Map the legacy flat variable names onto config keys
fn legacy_env_key(name: &str) -> Option<&'static str> {
    match name.to_ascii_uppercase().as_str() {
        "HOST" => Some("server.host"),
        "PORT" => Some("server.port"),
        "DAZ_EXE" => Some("daz.executable"),
        "DAZ_SCRIPT_PATH" => Some("daz.script_root"),
        "CALL_TIMEOUT" => Some("daz.call_timeout_secs"),
        "LOG_LEVEL" => Some("logging.level"),
        _ => None,
    }
}

/// Lowercase a log level and fold the long-form names onto tracing's
fn normalize_log_level(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    match level.as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        _ => level,
    }
}

impl AppConfig {
    /// Load configuration from config files and environment
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables (DAZ_MCP__*)
    /// 2. Flat variables: HOST, PORT, DAZ_EXE, DAZ_SCRIPT_PATH, CALL_TIMEOUT, LOG_LEVEL
    /// 3. `explicit_path`, or the first of daz-mcp.toml / .daz-mcp/config.toml
    /// 4. Default values
    pub fn load(explicit_path: Option<&Path>) -> DazResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        match explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(DazError::config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                tracing::debug!(path = %path.display(), "Loading TOML configuration");
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(path) = CONFIG_FILE_PATHS
                    .iter()
                    .map(Path::new)
                    .find(|path| path.exists())
                {
                    tracing::debug!(path = %path.display(), "Loading TOML configuration");
                    figment = figment.merge(Toml::file(path));
                }
            }
        }

        let figment = figment
            .merge(Env::raw().filter_map(|key| legacy_env_key(key.as_str()).map(Into::into)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut app_config: AppConfig = figment
            .extract()
            .map_err(|e| DazError::config(format!("Failed to load configuration: {}", e)))?;

        app_config.logging.level = normalize_log_level(&app_config.logging.level);
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> DazResult<()> {
        if self.server.port == 0 {
            return Err(DazError::config("Server port cannot be 0"));
        }

        if self.daz.call_timeout_secs == 0 {
            return Err(DazError::config("Call timeout cannot be 0"));
        }

        if self.daz.executable.as_os_str().is_empty() {
            return Err(DazError::config("DAZ executable path cannot be empty"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&normalize_log_level(&self.logging.level).as_str()) {
            return Err(DazError::config(format!(
                "Invalid log level '{}', must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.daz.call_timeout(), Duration::from_secs(60));
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_legacy_environment_variables() {
        Jail::expect_with(|jail| {
            jail.set_env("PORT", "9100");
            jail.set_env("CALL_TIMEOUT", "5");
            jail.set_env("DAZ_SCRIPT_PATH", "/opt/daz/scripts");
            jail.set_env("LOG_LEVEL", "debug");

            let config = AppConfig::load(None).map_err(|e| e.to_string())?;

            assert_eq!(config.server.port, 9100);
            assert_eq!(config.daz.call_timeout_secs, 5);
            assert_eq!(config.daz.script_root, PathBuf::from("/opt/daz/scripts"));
            assert_eq!(config.logging.level, "debug");
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_then_prefixed_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "daz-mcp.toml",
                r#"
                [server]
                host = "127.0.0.1"
                port = 9000
                max_clients = 4

                [daz]
                executable = "/usr/local/bin/dazstudio"
                script_root = "/srv/scripts"
                call_timeout_secs = 30
                "#,
            )?;
            jail.set_env("DAZ_MCP__SERVER__PORT", "9200");

            let config = AppConfig::load(None).map_err(|e| e.to_string())?;

            assert_eq!(config.server.port, 9200);
            assert_eq!(config.server.max_clients, Some(4));
            assert_eq!(config.daz.executable, PathBuf::from("/usr/local/bin/dazstudio"));
            assert_eq!(config.daz.call_timeout_secs, 30);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_path_must_exist() {
        Jail::expect_with(|_jail| {
            let result = AppConfig::load(Some(Path::new("missing.toml")));
            assert!(result.is_err());
            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut config = AppConfig::default();
        config.daz.call_timeout_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Call timeout cannot be 0"));
    }

    #[test]
    fn test_long_form_log_levels_are_accepted() {
        Jail::expect_with(|jail| {
            jail.set_env("LOG_LEVEL", "WARNING");

            let config = AppConfig::load(None).map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, "warn");
            Ok(())
        });

        assert_eq!(normalize_log_level("CRITICAL"), "error");
        assert_eq!(normalize_log_level(" Info "), "info");
    }

    #[test]
    fn test_validation_rejects_unknown_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_is_loopback_host() {
        let mut server = ServerConfig::default();
        assert!(server.is_loopback_host());

        server.host = "::1".to_string();
        assert!(server.is_loopback_host());

        server.host = "localhost".to_string();
        assert!(server.is_loopback_host());

        server.host = "0.0.0.0".to_string();
        assert!(!server.is_loopback_host());

        server.host = "example.com".to_string();
        assert!(!server.is_loopback_host());
    }
}
