//! # Connection State Machine
//!
//! Owns the sensor link lifecycle:
//!
//! ```text
//! Idle -> Scanning -> Connecting -> Discovering -> Subscribing -> Streaming
//!   ^                                                                 |
//!   +--------------- link lost (rescan after settle delay) -----------+
//! ```
//!
//! Radio operations are only initiated here; their completions come back
//! through [`ConnectionStateMachine::handle_event`]. Events that do not fit
//! the current state are ignored, so duplicates are harmless.

use std::fmt;
use tracing::{debug, info, warn};

use super::{LinkEvent, PeerAddress, SensorLink};
use crate::clock::deadline_reached;
use crate::config::SensorConfig;

/// Sensor link lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Discovering,
    Subscribing,
    Streaming,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Scanning => "scanning",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Discovering => "discovering",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Link parameters taken from the `[sensor]` configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub service_uuid: u16,
    pub characteristic_uuid: u16,
    pub settle_delay_ms: u32,
    pub max_backoff_ms: u32,
}

impl From<&SensorConfig> for LinkSettings {
    fn from(config: &SensorConfig) -> Self {
        Self {
            service_uuid: config.service_uuid,
            characteristic_uuid: config.characteristic_uuid,
            settle_delay_ms: config.settle_delay_ms,
            max_backoff_ms: config.max_backoff_ms,
        }
    }
}

/// Result of a scan request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Started,
    AlreadyScanning,
    /// Link is busy in another state
    Busy(ConnectionState),
    Failed(String),
}

/// Result of an operator disconnect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectOutcome {
    Requested,
    NotConnected,
    Failed(String),
}

/// Result of a notification toggle request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Changed,
    Unchanged,
    NotConnected,
    Failed(String),
}

/// Sensor link lifecycle driver
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    notifications_enabled: bool,
    handle: Option<u16>,
    peer: Option<PeerAddress>,
    rescan_at: Option<u32>,
    failures: u32,
    settings: LinkSettings,
}

impl ConnectionStateMachine {
    pub fn new(settings: LinkSettings) -> Self {
        Self {
            state: ConnectionState::Idle,
            notifications_enabled: false,
            handle: None,
            peer: None,
            rescan_at: None,
            failures: 0,
            settings,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
    }

    pub fn handle(&self) -> Option<u16> {
        self.handle
    }

    pub fn peer(&self) -> Option<PeerAddress> {
        self.peer
    }

    /// Pending automatic rescan time, if one is scheduled
    pub fn rescan_at(&self) -> Option<u32> {
        self.rescan_at
    }

    /// Consecutive failed attempts since the link last reached streaming
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_streaming(&self) -> bool {
        self.state == ConnectionState::Streaming
    }

    pub fn is_scanning(&self) -> bool {
        self.state == ConnectionState::Scanning
    }

    /// True while a link to the peer is established
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Discovering | ConnectionState::Subscribing | ConnectionState::Streaming
        )
    }

    /// Delay before the next automatic rescan
    ///
    /// The settle delay doubles with each consecutive failure, up to
    /// `max_backoff_ms`.
    pub fn backoff_delay(&self) -> u32 {
        let base = self.settings.settle_delay_ms;
        let shift = self.failures.saturating_sub(1).min(16);
        base.saturating_mul(1 << shift).min(self.settings.max_backoff_ms.max(base))
    }

    /// Start scanning for the power meter service
    ///
    /// Only valid from `Idle`. Cancels any pending automatic rescan.
    pub fn start_scan<L: SensorLink + ?Sized>(&mut self, link: &mut L, now: u32) -> ScanOutcome {
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::Scanning => {
                debug!("Already scanning");
                return ScanOutcome::AlreadyScanning;
            }
            other => return ScanOutcome::Busy(other),
        }

        self.rescan_at = None;
        match link.start_scan(self.settings.service_uuid) {
            Ok(()) => {
                info!(
                    "Scanning for power meter service 0x{:04X}",
                    self.settings.service_uuid
                );
                self.state = ConnectionState::Scanning;
                ScanOutcome::Started
            }
            Err(e) => {
                warn!("Failed to start scan: {}", e);
                self.record_failure();
                self.schedule_rescan(now);
                ScanOutcome::Failed(e.to_string())
            }
        }
    }

    /// Ask the radio stack to drop the current link
    ///
    /// The state returns to `Idle` once the `Disconnected` event arrives.
    pub fn request_disconnect<L: SensorLink + ?Sized>(&mut self, link: &mut L) -> DisconnectOutcome {
        let handle = match self.handle {
            Some(handle) if self.is_connected() => handle,
            _ => return DisconnectOutcome::NotConnected,
        };

        match link.disconnect(handle) {
            Ok(()) => {
                info!("Disconnecting from power meter");
                self.state = ConnectionState::Disconnecting;
                DisconnectOutcome::Requested
            }
            Err(e) => {
                warn!("Disconnect request failed: {}", e);
                DisconnectOutcome::Failed(e.to_string())
            }
        }
    }

    /// Toggle power measurement notifications
    ///
    /// Valid once discovery has completed. Enabling while `Subscribing`
    /// completes the subscription and enters `Streaming`; disabling never
    /// leaves `Streaming`.
    pub fn set_notifications<L: SensorLink + ?Sized>(
        &mut self,
        link: &mut L,
        enabled: bool,
    ) -> NotifyOutcome {
        if !matches!(
            self.state,
            ConnectionState::Subscribing | ConnectionState::Streaming
        ) {
            return NotifyOutcome::NotConnected;
        }

        if self.notifications_enabled == enabled {
            return NotifyOutcome::Unchanged;
        }

        match link.set_notify(enabled) {
            Ok(()) => {
                self.notifications_enabled = enabled;
                info!(
                    "Notifications {}",
                    if enabled { "enabled" } else { "disabled" }
                );
                if enabled && self.state == ConnectionState::Subscribing {
                    self.enter_streaming();
                }
                NotifyOutcome::Changed
            }
            Err(e) => {
                warn!("Failed to change notifications: {}", e);
                NotifyOutcome::Failed(e.to_string())
            }
        }
    }

    /// Advance the lifecycle on a radio stack event
    pub fn handle_event<L: SensorLink + ?Sized>(&mut self, link: &mut L, event: &LinkEvent, now: u32) {
        match event {
            LinkEvent::Advertisement(adv) => {
                if self.state != ConnectionState::Scanning {
                    return;
                }

                if !adv.advertises(self.settings.service_uuid) {
                    debug!("Ignoring device {} (service not advertised)", adv.address);
                    return;
                }

                info!("Found power meter {} (RSSI {} dBm)", adv.address, adv.rssi);
                if let Err(e) = link.stop_scan() {
                    warn!("Failed to stop scan: {}", e);
                }

                match link.connect(adv.address) {
                    Ok(()) => {
                        self.peer = Some(adv.address);
                        self.state = ConnectionState::Connecting;
                    }
                    Err(e) => {
                        warn!("Failed to initiate connection: {}", e);
                        self.record_failure();
                        self.state = ConnectionState::Idle;
                        self.schedule_rescan(now);
                    }
                }
            }

            LinkEvent::Connected { handle } => {
                if self.state != ConnectionState::Connecting {
                    debug!("Unexpected connection event in state {}", self.state);
                    return;
                }

                info!("Connected to power meter (handle {})", handle);
                self.handle = Some(*handle);
                self.state = ConnectionState::Discovering;

                if let Err(e) =
                    link.discover(self.settings.service_uuid, self.settings.characteristic_uuid)
                {
                    warn!("Failed to start discovery: {}", e);
                    self.record_failure();
                    self.tear_down(link, now);
                }
            }

            LinkEvent::ConnectFailed { reason } => {
                if self.state != ConnectionState::Connecting {
                    return;
                }

                warn!("Connection failed: {}", reason);
                self.record_failure();
                self.peer = None;
                self.state = ConnectionState::Idle;
                self.schedule_rescan(now);
            }

            LinkEvent::DiscoveryComplete => {
                if self.state != ConnectionState::Discovering {
                    return;
                }

                info!("Power measurement characteristic found");
                self.state = ConnectionState::Subscribing;

                match link.set_notify(true) {
                    Ok(()) => {
                        self.notifications_enabled = true;
                        self.enter_streaming();
                    }
                    Err(e) => {
                        warn!(
                            "Failed to enable notifications: {}. Use 'enable' command",
                            e
                        );
                    }
                }
            }

            LinkEvent::DiscoveryFailed(failure) => {
                if self.state != ConnectionState::Discovering {
                    return;
                }

                warn!("Discovery failed: {}", failure);
                self.record_failure();
                self.tear_down(link, now);
            }

            LinkEvent::Notification(_) => {}

            LinkEvent::Disconnected { handle, reason } => {
                if matches!(self.state, ConnectionState::Idle | ConnectionState::Scanning) {
                    debug!("Ignoring disconnect for handle {} while {}", handle, self.state);
                    return;
                }

                info!("Disconnected from power meter (reason 0x{:02X})", reason);
                if matches!(
                    self.state,
                    ConnectionState::Connecting
                        | ConnectionState::Discovering
                        | ConnectionState::Subscribing
                ) {
                    self.record_failure();
                }

                self.state = ConnectionState::Idle;
                self.handle = None;
                self.peer = None;
                self.notifications_enabled = false;
                self.schedule_rescan(now);
            }
        }
    }

    /// Run the scheduled rescan once its time has come
    pub fn poll<L: SensorLink + ?Sized>(&mut self, link: &mut L, now: u32) -> Option<ScanOutcome> {
        let at = self.rescan_at?;
        if self.state != ConnectionState::Idle || !deadline_reached(now, at) {
            return None;
        }

        self.rescan_at = None;
        Some(self.start_scan(link, now))
    }

    fn enter_streaming(&mut self) {
        info!("Streaming power data");
        self.state = ConnectionState::Streaming;
        self.failures = 0;
    }

    fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    fn schedule_rescan(&mut self, now: u32) {
        let delay = self.backoff_delay();
        debug!("Rescan in {}ms (failures: {})", delay, self.failures);
        self.rescan_at = Some(now.wrapping_add(delay));
    }

    /// Drop a link that cannot be used and fall back to rescanning
    fn tear_down<L: SensorLink + ?Sized>(&mut self, link: &mut L, now: u32) {
        let disconnected = match self.handle {
            Some(handle) => match link.disconnect(handle) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Disconnect request failed: {}", e);
                    false
                }
            },
            None => false,
        };

        if disconnected {
            self.state = ConnectionState::Disconnecting;
        } else {
            self.state = ConnectionState::Idle;
            self.handle = None;
            self.peer = None;
            self.notifications_enabled = false;
            self.schedule_rescan(now);
        }
    }
}
