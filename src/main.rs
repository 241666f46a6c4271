//! # Power Bridge
//!
//! Bridge a proprietary wireless power meter to a standard cycling-power
//! broadcast, with synthetic fallback data.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use power_bridge::clock::MonotonicClock;
use power_bridge::config::{Config, LoggingConfig};
use power_bridge::link::sim::SimulatedSensorLink;
use power_bridge::link::{event_channel, DetachedLink, LinkSettings, SensorLink};
use power_bridge::telemetry::{BroadcastProfile, JsonlBroadcaster, TracingBroadcaster};
use power_bridge::Bridge;

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name prefix for the daily rolling log
const LOG_FILE_PREFIX: &str = "power-bridge.log";

/// Main entry point for Power Bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`, or
///      built-in defaults when that file does not exist)
///    - Set up logging with tracing subscriber
///    - Attach the sensor link (bench simulator or none) and the broadcast
///      profile (JSONL telemetry files or log only)
///
/// 2. **Main Loop**
///    - Tick the bridge every `tick_interval_ms`
///    - Feed console lines to the bridge as operator commands
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if:
/// - The configuration file exists but is invalid
/// - The telemetry log directory cannot be created
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
///
/// Expected output:
/// ```text
/// INFO power_bridge: Power Bridge v0.1.0 starting...
/// INFO power_bridge::link::state: Scanning for power meter service 0x1828
/// INFO power_bridge::link::state: Found power meter E6:28:10:BF:71:3C (RSSI -52 dBm)
/// INFO power_bridge::link::state: Streaming power data
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path(std::env::args().nth(1));
    let (config, loaded) = load_config(&path)?;

    let _log_guard = init_logging(&config.logging);

    info!("Power Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    if loaded {
        info!("Loaded configuration from {}", path.display());
    } else {
        warn!("{} not found, using default configuration", path.display());
    }

    let clock = MonotonicClock::new();
    let (events_tx, events_rx) = event_channel();

    let link: Box<dyn SensorLink> = if config.simulator.enabled {
        Box::new(SimulatedSensorLink::spawn(
            config.simulator.clone(),
            LinkSettings::from(&config.sensor),
            events_tx,
        ))
    } else {
        warn!("No sensor radio attached, broadcasting synthetic data only");
        Box::new(DetachedLink)
    };

    let profile: Box<dyn BroadcastProfile> = if config.telemetry.enabled {
        Box::new(JsonlBroadcaster::new(&config.telemetry).context("opening telemetry log")?)
    } else {
        Box::new(TracingBroadcaster::new())
    };

    let mut bridge = Bridge::new(&config, link, events_rx, profile, clock.now_ms());
    if config.sensor.auto_scan && config.simulator.enabled {
        bridge.start(clock.now_ms());
    }

    let mut ticker = interval(Duration::from_millis(u64::from(config.broadcast.tick_interval_ms)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut console = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;

    info!(
        "Publishing every {}ms, type 'help' for commands, Ctrl+C to exit",
        config.broadcast.publish_period_ms
    );

    // Main control loop
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = bridge.tick(clock.now_ms());
                for response in report.responses {
                    println!("{}", response);
                }
            }

            line = console.next_line(), if console_open => match line {
                Ok(Some(line)) => bridge.submit(line),
                Ok(None) => {
                    debug!("Console input closed");
                    console_open = false;
                }
                Err(e) => {
                    warn!("Console read failed: {}", e);
                    console_open = false;
                }
            },

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    let publisher = bridge.publisher();
    info!(
        "Published {} frames ({} failed pushes)",
        publisher.published(),
        publisher.failed()
    );

    Ok(())
}

/// Configuration path from the first command line argument, if any
fn config_path(arg: Option<String>) -> PathBuf {
    arg.map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration, falling back to defaults when the file is absent
///
/// Returns the configuration and whether it came from the file.
fn load_config(path: &Path) -> Result<(Config, bool)> {
    if !path.exists() {
        return Ok((Config::default(), false));
    }

    let config = Config::load(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    Ok((config, true))
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. When a log directory is set,
/// output is also written to a daily rolling file; the returned guard must
/// be held until exit so buffered lines are flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer());

    if config.directory.is_empty() {
        registry.init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    registry
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();

    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config_path() {
        assert_eq!(config_path(None), PathBuf::from("config/default.toml"));
        assert_eq!(
            config_path(Some("/etc/power-bridge.toml".to_string())),
            PathBuf::from("/etc/power-bridge.toml")
        );
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let (config, loaded) = load_config(&dir.path().join("absent.toml")).unwrap();
        assert!(!loaded);
        assert_eq!(config.broadcast.publish_period_ms, 250);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[quality]\ndata_timeout_ms = 0\n").unwrap();
        file.flush().unwrap();

        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let (config, loaded) = load_config(&path).unwrap();
        assert!(loaded);
        assert!(config.simulator.enabled);
    }
}
