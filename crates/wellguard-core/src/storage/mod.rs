mod config;
pub mod database;

pub use config::{Config, MonitorConfig, NotificationsConfig, PresentationConfig};
pub use database::Database;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the wellguard data directory, creating it if needed.
///
/// `$WELLGUARD_HOME` wins when set. Otherwise `~/.config/wellguard`, or
/// `~/.config/wellguard-dev` when `WELLGUARD_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("WELLGUARD_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("WELLGUARD_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("wellguard-dev")
            } else {
                base_dir.join("wellguard")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
