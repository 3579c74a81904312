//! Driver configuration
//!
//! Stored as TOML; every field has a default so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persistent driver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    /// Prefix of the virtual gamepad name; the controller type is appended
    pub device_name: String,
    /// Forward rumble packets to the controller
    pub rumble: bool,
    /// Watch udev for controllers coming and going
    pub hotplug: bool,
    /// Rescan interval when hotplug is off
    pub poll_interval_ms: u64,
    /// hidraw read timeout; bounds how quickly the reader notices shutdown
    pub read_timeout_ms: i32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            device_name: "Nintendo Switch 2".to_string(),
            rumble: true,
            hotplug: true,
            poll_interval_ms: 1000,
            read_timeout_ms: 50,
        }
    }
}

impl DriverConfig {
    /// Default config location (~/.config/switch2-driver/config.toml)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("switch2-driver")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: DriverConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Name of the virtual gamepad for a controller
    pub fn gamepad_name(&self, controller: &str) -> String {
        format!("{} {}", self.device_name, controller)
    }
}
