//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working configuration.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{BridgeError, Result};
use crate::protocol::packet::{
    MAX_CADENCE, MAX_TOTAL_POWER, POWER_MEASUREMENT_CHAR_UUID, POWER_METER_SERVICE_UUID,
};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sensor link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    #[serde(default = "default_service_uuid")]
    pub service_uuid: u16,

    #[serde(default = "default_characteristic_uuid")]
    pub characteristic_uuid: u16,

    /// Start scanning as soon as the bridge is up
    #[serde(default = "default_auto_scan")]
    pub auto_scan: bool,

    /// Delay between losing the link and rescanning
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u32,

    /// Upper bound for the rescan delay after repeated failures
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u32,

    /// Drop the link when data has been missing for twice the data timeout
    #[serde(default)]
    pub reconnect_on_stall: bool,
}

/// Data quality monitoring configuration
#[derive(Debug, Deserialize, Clone)]
pub struct QualityConfig {
    #[serde(default = "default_data_timeout_ms")]
    pub data_timeout_ms: u32,

    /// Invalid / total packet ratio above which quality is reported poor
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f32,

    #[serde(default = "default_summary_interval_ms")]
    pub summary_interval_ms: u32,

    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u32,
}

/// Synthetic signal configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SyntheticConfig {
    #[serde(default = "default_base_power")]
    pub base_power: u16,

    #[serde(default = "default_base_cadence")]
    pub base_cadence: u16,

    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u32,

    #[serde(default = "default_power_variation")]
    pub power_variation: u16,

    #[serde(default = "default_cadence_variation")]
    pub cadence_variation: u16,

    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Outbound broadcast configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    #[serde(default = "default_publish_period_ms")]
    pub publish_period_ms: u32,

    /// Control loop tick interval
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u32,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Bench simulator configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimulatorConfig {
    #[serde(default = "default_simulator_enabled")]
    pub enabled: bool,

    #[serde(default = "default_advertise_delay_ms")]
    pub advertise_delay_ms: u32,

    #[serde(default = "default_connect_delay_ms")]
    pub connect_delay_ms: u32,

    #[serde(default = "default_packet_interval_ms")]
    pub packet_interval_ms: u32,

    /// Simulated link loss period while connected (0 = never)
    #[serde(default)]
    pub dropout_interval_ms: u32,

    #[serde(default = "default_rider_power")]
    pub rider_power: u16,

    #[serde(default = "default_rider_cadence")]
    pub rider_cadence: u16,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for a daily rolling log file (empty = stdout only)
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_service_uuid() -> u16 { POWER_METER_SERVICE_UUID }
fn default_characteristic_uuid() -> u16 { POWER_MEASUREMENT_CHAR_UUID }
fn default_auto_scan() -> bool { true }
fn default_settle_delay_ms() -> u32 { 1000 }
fn default_max_backoff_ms() -> u32 { 30000 }

fn default_data_timeout_ms() -> u32 { 5000 }
fn default_max_error_rate() -> f32 { 0.10 }
fn default_summary_interval_ms() -> u32 { 60000 }
fn default_status_interval_ms() -> u32 { 5000 }

fn default_base_power() -> u16 { 100 }
fn default_base_cadence() -> u16 { 70 }
fn default_update_interval_ms() -> u32 { 1000 }
fn default_power_variation() -> u16 { 20 }
fn default_cadence_variation() -> u16 { 10 }

fn default_publish_period_ms() -> u32 { 250 }
fn default_tick_interval_ms() -> u32 { 10 }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn default_simulator_enabled() -> bool { true }
fn default_advertise_delay_ms() -> u32 { 500 }
fn default_connect_delay_ms() -> u32 { 100 }
fn default_packet_interval_ms() -> u32 { 250 }
fn default_rider_power() -> u16 { 180 }
fn default_rider_cadence() -> u16 { 88 }

fn default_log_level() -> String { "info".to_string() }

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            service_uuid: default_service_uuid(),
            characteristic_uuid: default_characteristic_uuid(),
            auto_scan: default_auto_scan(),
            settle_delay_ms: default_settle_delay_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            reconnect_on_stall: false,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            data_timeout_ms: default_data_timeout_ms(),
            max_error_rate: default_max_error_rate(),
            summary_interval_ms: default_summary_interval_ms(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            base_power: default_base_power(),
            base_cadence: default_base_cadence(),
            update_interval_ms: default_update_interval_ms(),
            power_variation: default_power_variation(),
            cadence_variation: default_cadence_variation(),
            seed: None,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            publish_period_ms: default_publish_period_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: default_simulator_enabled(),
            advertise_delay_ms: default_advertise_delay_ms(),
            connect_delay_ms: default_connect_delay_ms(),
            packet_interval_ms: default_packet_interval_ms(),
            dropout_interval_ms: 0,
            rider_power: default_rider_power(),
            rider_cadence: default_rider_cadence(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use power_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Sensor link
        if self.sensor.settle_delay_ms > 60000 {
            return Err(invalid("settle_delay_ms must be at most 60000"));
        }

        if self.sensor.max_backoff_ms < self.sensor.settle_delay_ms
            || self.sensor.max_backoff_ms > 600000
        {
            return Err(invalid(
                "max_backoff_ms must be between settle_delay_ms and 600000",
            ));
        }

        // Data quality
        if self.quality.data_timeout_ms == 0 || self.quality.data_timeout_ms > 60000 {
            return Err(invalid("data_timeout_ms must be between 1 and 60000"));
        }

        if !(0.0..=1.0).contains(&self.quality.max_error_rate) {
            return Err(invalid("max_error_rate must be between 0.0 and 1.0"));
        }

        if self.quality.summary_interval_ms < 1000 || self.quality.summary_interval_ms > 3_600_000 {
            return Err(invalid("summary_interval_ms must be between 1000 and 3600000"));
        }

        if self.quality.status_interval_ms == 0 || self.quality.status_interval_ms > 600000 {
            return Err(invalid("status_interval_ms must be between 1 and 600000"));
        }

        // Synthetic signal
        if self.synthetic.base_power > MAX_TOTAL_POWER {
            return Err(invalid(format!("base_power must be at most {}", MAX_TOTAL_POWER)));
        }

        if self.synthetic.base_cadence > MAX_CADENCE {
            return Err(invalid(format!("base_cadence must be at most {}", MAX_CADENCE)));
        }

        if self.synthetic.power_variation > 500 {
            return Err(invalid("power_variation must be at most 500"));
        }

        if self.synthetic.cadence_variation > 50 {
            return Err(invalid("cadence_variation must be at most 50"));
        }

        if self.synthetic.update_interval_ms == 0 || self.synthetic.update_interval_ms > 60000 {
            return Err(invalid("update_interval_ms must be between 1 and 60000"));
        }

        // Broadcast
        if self.broadcast.publish_period_ms == 0 || self.broadcast.publish_period_ms > 60000 {
            return Err(invalid("publish_period_ms must be between 1 and 60000"));
        }

        if self.broadcast.tick_interval_ms == 0
            || self.broadcast.tick_interval_ms > self.broadcast.publish_period_ms
        {
            return Err(invalid(
                "tick_interval_ms must be between 1 and publish_period_ms",
            ));
        }

        // Telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        // Simulator
        if self.simulator.packet_interval_ms == 0 || self.simulator.packet_interval_ms > 60000 {
            return Err(invalid("packet_interval_ms must be between 1 and 60000"));
        }

        if self.simulator.rider_power > MAX_TOTAL_POWER {
            return Err(invalid(format!("rider_power must be at most {}", MAX_TOTAL_POWER)));
        }

        if self.simulator.rider_cadence > MAX_CADENCE {
            return Err(invalid(format!("rider_cadence must be at most {}", MAX_CADENCE)));
        }

        // Logging
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(invalid(format!(
                "logging level '{}' must be one of: trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.sensor.service_uuid, 0x1828);
        assert_eq!(config.sensor.characteristic_uuid, 0x2A63);
        assert_eq!(config.quality.data_timeout_ms, 5000);
        assert_eq!(config.synthetic.base_power, 100);
        assert_eq!(config.synthetic.base_cadence, 70);
        assert_eq!(config.synthetic.update_interval_ms, 1000);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[sensor]
service_uuid = 0x1818
settle_delay_ms = 0
max_backoff_ms = 0

[quality]
data_timeout_ms = 3000

[synthetic]
base_power = 150
seed = 42

[broadcast]
publish_period_ms = 500

[telemetry]
enabled = false
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.sensor.service_uuid, 0x1818);
        assert_eq!(config.sensor.settle_delay_ms, 0);
        assert_eq!(config.quality.data_timeout_ms, 3000);
        assert_eq!(config.synthetic.base_power, 150);
        assert_eq!(config.synthetic.seed, Some(42));
        assert_eq!(config.broadcast.publish_period_ms, 500);
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/power-bridge.toml");
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::parse("[sensor\nservice_uuid = ");
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_max_backoff_below_settle_delay() {
        let mut config = Config::default();
        config.sensor.settle_delay_ms = 2000;
        config.sensor.max_backoff_ms = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settle_delay_too_high() {
        let mut config = Config::default();
        config.sensor.settle_delay_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_data_timeout_zero() {
        let mut config = Config::default();
        config.quality.data_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_error_rate_out_of_range() {
        let mut config = Config::default();
        config.quality.max_error_rate = 1.5;
        assert!(config.validate().is_err());

        config.quality.max_error_rate = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_interval_too_short() {
        let mut config = Config::default();
        config.quality.summary_interval_ms = 999;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_power_over_limit() {
        let mut config = Config::default();
        config.synthetic.base_power = 2001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_cadence_over_limit() {
        let mut config = Config::default();
        config.synthetic.base_cadence = 201;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_update_interval_zero() {
        let mut config = Config::default();
        config.synthetic.update_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_publish_period_zero() {
        let mut config = Config::default();
        config.broadcast.publish_period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_slower_than_publish_period() {
        let mut config = Config::default();
        config.broadcast.publish_period_ms = 100;
        config.broadcast.tick_interval_ms = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_enabled() {
        let mut config = Config::default();
        config.telemetry.enabled = true;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = Config::default();
        config.telemetry.enabled = false;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_records_per_file_zero() {
        let mut config = Config::default();
        config.telemetry.max_records_per_file = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_files_to_keep_zero() {
        let mut config = Config::default();
        config.telemetry.max_files_to_keep = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_telemetry_format_key_ignored() {
        let toml = "[telemetry]\nformat = \"csv\"\nmax_files_to_keep = 3\n";
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.telemetry.max_files_to_keep, 3);
        assert_eq!(config.telemetry.max_records_per_file, 10000);
    }

    #[test]
    fn test_packet_interval_zero() {
        let mut config = Config::default();
        config.simulator.packet_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_log_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            let mut config = Config::default();
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "Level {} should be valid", level);
        }
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_service_uuid(), 0x1828);
        assert_eq!(default_characteristic_uuid(), 0x2A63);
        assert!(default_auto_scan());
        assert_eq!(default_settle_delay_ms(), 1000);
        assert_eq!(default_max_backoff_ms(), 30000);
        assert_eq!(default_data_timeout_ms(), 5000);
        assert_eq!(default_max_error_rate(), 0.10);
        assert_eq!(default_summary_interval_ms(), 60000);
        assert_eq!(default_status_interval_ms(), 5000);
        assert_eq!(default_base_power(), 100);
        assert_eq!(default_base_cadence(), 70);
        assert_eq!(default_update_interval_ms(), 1000);
        assert_eq!(default_power_variation(), 20);
        assert_eq!(default_cadence_variation(), 10);
        assert_eq!(default_publish_period_ms(), 250);
        assert_eq!(default_tick_interval_ms(), 10);
        assert!(default_telemetry_enabled());
        assert_eq!(default_log_dir(), "./logs");
        assert_eq!(default_max_records_per_file(), 10000);
        assert_eq!(default_max_files_to_keep(), 10);
        assert_eq!(default_packet_interval_ms(), 250);
        assert_eq!(default_log_level(), "info");
    }
}
