//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! A missing or unparseable file falls back to defaults; failures to open
//! the serial link or ledger themselves stay fatal at startup.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site identifier attached to logs (e.g. "lot-north")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "parking-gateway".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    pub device: String,
    pub baud: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Admission events file (JSONL format)
    #[serde(default = "default_ledger_file")]
    pub file: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { file: default_ledger_file() }
    }
}

fn default_ledger_file() -> String {
    "admissions.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// Command producing one frame (image bytes) on stdout
    pub capture_cmd: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognizerConfig {
    /// Command reading a frame on stdin, printing `NONE` or
    /// `<plate> <x1> <y1> <x2> <y2>` on stdout
    pub cmd: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub serial: SerialConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    pub camera: CameraConfig,
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    serial_device: String,
    serial_baud: u32,
    ledger_file: String,
    capture_cmd: String,
    recognizer_cmd: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            serial_device: "/dev/ttyUSB0".to_string(),
            serial_baud: 115_200,
            ledger_file: default_ledger_file(),
            capture_cmd: "libcamera-jpeg -n --immediate -o -".to_string(),
            recognizer_cmd: "plate-recognizer".to_string(),
            metrics_interval_secs: default_metrics_interval_secs(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine the config file path: an explicit --config argument wins,
    /// then the CONFIG_FILE environment variable, then the default
    pub fn resolve_config_path(arg: Option<&str>) -> String {
        if let Some(path) = arg {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            site_id: toml_config.site.id,
            serial_device: toml_config.serial.device,
            serial_baud: toml_config.serial.baud,
            ledger_file: toml_config.ledger.file,
            capture_cmd: toml_config.camera.capture_cmd,
            recognizer_cmd: toml_config.recognizer.cmd,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn serial_device(&self) -> &str {
        &self.serial_device
    }

    pub fn serial_baud(&self) -> u32 {
        self.serial_baud
    }

    pub fn ledger_file(&self) -> &str {
        &self.ledger_file
    }

    pub fn capture_cmd(&self) -> &str {
        &self.capture_cmd
    }

    pub fn recognizer_cmd(&self) -> &str {
        &self.recognizer_cmd
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial_device(), "/dev/ttyUSB0");
        assert_eq!(config.serial_baud(), 115_200);
        assert_eq!(config.ledger_file(), "admissions.jsonl");
        assert_eq!(config.metrics_interval_secs(), 10);
    }

    #[test]
    fn test_resolve_config_path_precedence() {
        // Single test so the env var mutation cannot race a parallel test
        env::remove_var("CONFIG_FILE");
        assert_eq!(Config::resolve_config_path(None), "config/dev.toml");

        env::set_var("CONFIG_FILE", "config/lot-east.toml");
        assert_eq!(Config::resolve_config_path(None), "config/lot-east.toml");
        assert_eq!(
            Config::resolve_config_path(Some("config/lot-north.toml")),
            "config/lot-north.toml"
        );
        env::remove_var("CONFIG_FILE");
    }

    #[test]
    fn test_ledger_file_default_not_empty() {
        let ledger = LedgerConfig::default();
        assert_eq!(ledger.file, "admissions.jsonl");
        assert!(!ledger.file.is_empty());
    }
}
