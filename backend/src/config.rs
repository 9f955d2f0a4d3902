//! server.toml parsing.

use serde::{Deserialize, Serialize};
use tessera_master::MasterConfig;

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub master: MasterConfig,
}

/// The `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_file")]
    pub file_path: String,

    #[serde(default = "default_log_to_console")]
    pub log_to_console: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/tessera-server.log".to_string()
}

fn default_log_to_console() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            file_path: default_log_file(),
            log_to_console: default_log_to_console(),
        }
    }
}

impl ServerConfig {
    /// Loads and validates a configuration file.
    pub fn from_file(path: &str) -> anyhow::Result<ServerConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        config
            .master
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid [master] config: {}", e))?;
        Ok(config)
    }
}
