//! TOML-based configuration.
//!
//! Stores:
//! - Loop intervals (tick, foreground detection, periodic snapshot)
//! - Blocking surface escalation timing
//! - Notification preferences
//!
//! Configuration is stored at `<data dir>/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::blocking::EscalationPolicy;
use crate::error::ConfigError;
use crate::messages::NoticeOptions;

/// Monitoring loop intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Polling interval for sampler-based foreground detection.
    #[serde(default = "default_detect_interval")]
    pub detect_interval_ms: u64,
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_ms: u64,
}

/// Blocking surface escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationConfig {
    #[serde(default = "default_retry_after")]
    pub retry_after_ms: u64,
    #[serde(default = "default_fallback_after")]
    pub fallback_after_ms: u64,
    #[serde(default = "default_true")]
    pub prefer_overlay: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub welcome: bool,
    #[serde(default = "default_true")]
    pub wellbeing_tips: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub presentation: PresentationConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

fn default_tick_interval() -> u64 {
    1000
}
fn default_detect_interval() -> u64 {
    2000
}
fn default_snapshot_interval() -> u64 {
    10_000
}
fn default_retry_after() -> u64 {
    500
}
fn default_fallback_after() -> u64 {
    1500
}
fn default_true() -> bool {
    true
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            detect_interval_ms: default_detect_interval(),
            snapshot_interval_ms: default_snapshot_interval(),
        }
    }
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            retry_after_ms: default_retry_after(),
            fallback_after_ms: default_fallback_after(),
            prefer_overlay: true,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            welcome: true,
            wellbeing_tips: true,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let (parent_path, leaf) = match key.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, key),
        };
        if leaf.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        if let Some(parent) = parent_path {
            for part in parent.split('.') {
                current = current
                    .get_mut(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
            }
        }
        let obj = current
            .as_object_mut()
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        let existing = obj
            .get(leaf)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

        let new_value = match existing {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                value
                    .parse::<bool>()
                    .map_err(|e| invalid(e.to_string()))?,
            ),
            serde_json::Value::Number(_) => serde_json::Value::Number(
                value
                    .parse::<u64>()
                    .map_err(|_| invalid(format!("cannot parse '{value}' as a whole number")))?
                    .into(),
            ),
            serde_json::Value::Object(_) => {
                return Err(invalid("cannot assign to a section".to_string()));
            }
            _ => serde_json::Value::String(value.into()),
        };

        obj.insert(leaf.to_string(), new_value);
        Ok(())
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join("config.toml")
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(Self::path_in(&data_dir()?))
    }

    /// Load from disk or create the default file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the result fails validation.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Flatten into `(dotted key, value)` pairs, sorted.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out.sort();
        out
    }

    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("monitor.tick_interval_ms", self.monitor.tick_interval_ms),
            ("monitor.detect_interval_ms", self.monitor.detect_interval_ms),
            ("monitor.snapshot_interval_ms", self.monitor.snapshot_interval_ms),
            ("presentation.retry_after_ms", self.presentation.retry_after_ms),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.presentation.fallback_after_ms <= self.presentation.retry_after_ms {
            return Err(ConfigError::InvalidValue {
                key: "presentation.fallback_after_ms".to_string(),
                message: "must be greater than presentation.retry_after_ms".to_string(),
            });
        }
        Ok(())
    }

    pub fn escalation(&self) -> EscalationPolicy {
        EscalationPolicy {
            retry_after_ms: self.presentation.retry_after_ms,
            fallback_after_ms: self.presentation.fallback_after_ms,
            prefer_overlay: self.presentation.prefer_overlay,
        }
    }

    pub fn notice_options(&self) -> NoticeOptions {
        NoticeOptions {
            enabled: self.notifications.enabled,
            welcome: self.notifications.welcome,
            wellbeing_tips: self.notifications.wellbeing_tips,
        }
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.monitor.tick_interval_ms, 1000);
        assert_eq!(parsed.presentation.fallback_after_ms, 1500);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = toml::from_str("[presentation]\nretry_after_ms = 250\n").unwrap();
        assert_eq!(cfg.presentation.retry_after_ms, 250);
        assert_eq!(cfg.presentation.fallback_after_ms, 1500);
        assert!(cfg.notifications.enabled);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("presentation.prefer_overlay").as_deref(), Some("true"));
        assert_eq!(cfg.get("monitor.snapshot_interval_ms").as_deref(), Some("10000"));
        assert!(cfg.get("monitor.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn set_updates_typed_values() {
        let mut cfg = Config::default();
        cfg.set("notifications.wellbeing_tips", "false").unwrap();
        cfg.set("monitor.tick_interval_ms", "500").unwrap();
        assert!(!cfg.notifications.wellbeing_tips);
        assert_eq!(cfg.monitor.tick_interval_ms, 500);
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_values() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("monitor.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.set("notifications.enabled", "yes please"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.set("monitor", "1"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn set_rejects_inverted_escalation() {
        let mut cfg = Config::default();
        let err = cfg.set("presentation.fallback_after_ms", "400").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert_eq!(cfg.presentation.fallback_after_ms, 1500);
    }

    #[test]
    fn entries_are_flat_and_sorted() {
        let entries = Config::default().entries();
        assert_eq!(entries.len(), 9);
        assert_eq!(entries[0].0, "monitor.detect_interval_ms");
        assert!(entries
            .iter()
            .any(|(k, v)| k == "presentation.retry_after_ms" && v == "500"));
    }

    #[test]
    fn load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::path_in(dir.path());
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        std::fs::write(&path, "monitor = 3").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
