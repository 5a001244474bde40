//! Configuration loader for Linkbot.
//!
//! Reads `config.toml` from the data directory (`~/.linkbot/` in production)
//! and deserializes it into [`LinkbotConfig`]. Falls back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use linkbot_types::config::LinkbotConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "LINKBOT_DATA_DIR";

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`LinkbotConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config.
pub async fn load_config(data_dir: &Path) -> LinkbotConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return LinkbotConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return LinkbotConfig::default();
        }
    };

    match toml::from_str::<LinkbotConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            LinkbotConfig::default()
        }
    }
}

/// Resolve the data directory.
///
/// Priority: `LINKBOT_DATA_DIR`, then `~/.linkbot`, then `./.linkbot`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".linkbot");
    }

    PathBuf::from(".linkbot")
}

/// Path of the credential encryption key inside the data directory.
pub fn credentials_key_path(data_dir: &Path) -> PathBuf {
    data_dir.join("credentials.key")
}
