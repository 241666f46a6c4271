//! # Simulated Sensor Link
//!
//! Bench stand-in for the power meter radio stack. Runs as a tokio task that
//! advertises the power meter service, accepts a connection, resolves the
//! measurement characteristic and then streams encoded 11-byte packets
//! while notifications are enabled. Optional periodic dropouts exercise the
//! rescan path.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::pending;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{
    Advertisement, DiscoveryFailure, LinkEvent, LinkEventSender, LinkSettings, PeerAddress,
    SensorLink,
};
use crate::config::SimulatorConfig;
use crate::error::{BridgeError, Result};
use crate::protocol::{encode, PowerSample};

/// Address the simulated power meter advertises from
pub const SIM_SENSOR_ADDRESS: PeerAddress = PeerAddress([0x3C, 0x71, 0xBF, 0x10, 0x28, 0xE6]);

/// Address of an unrelated device that is also advertising
pub const SIM_FOREIGN_ADDRESS: PeerAddress = PeerAddress([0x01, 0x9A, 0x44, 0x20, 0x11, 0xF0]);

/// Heart rate service advertised by the unrelated device
const FOREIGN_SERVICE_UUID: u16 = 0x180D;

/// Local host terminated connection
const REASON_LOCAL_HOST: u8 = 0x16;

/// Supervision timeout
const REASON_SUPERVISION_TIMEOUT: u8 = 0x08;

#[derive(Debug)]
enum SimCommand {
    StartScan(u16),
    StopScan,
    Connect(PeerAddress),
    Discover(u16, u16),
    SetNotify(bool),
    Disconnect(u16),
}

/// Handle to a running simulated radio stack
#[derive(Debug)]
pub struct SimulatedSensorLink {
    commands: mpsc::UnboundedSender<SimCommand>,
    task: JoinHandle<()>,
}

impl SimulatedSensorLink {
    /// Spawn the simulator task on the current tokio runtime
    ///
    /// Events are delivered through `events` exactly like a real radio
    /// stack would deliver them.
    pub fn spawn(config: SimulatorConfig, settings: LinkSettings, events: LinkEventSender) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let sensor = SimulatedSensor::new(config, settings, events);
        let task = tokio::spawn(sensor.run(rx));
        info!("Simulated power meter at {}", SIM_SENSOR_ADDRESS);

        Self { commands: tx, task }
    }

    fn send(&self, command: SimCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| BridgeError::Link("simulated radio stopped".to_string()))
    }
}

impl Drop for SimulatedSensorLink {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl SensorLink for SimulatedSensorLink {
    fn start_scan(&mut self, service_uuid: u16) -> Result<()> {
        self.send(SimCommand::StartScan(service_uuid))
    }

    fn stop_scan(&mut self) -> Result<()> {
        self.send(SimCommand::StopScan)
    }

    fn connect(&mut self, peer: PeerAddress) -> Result<()> {
        self.send(SimCommand::Connect(peer))
    }

    fn discover(&mut self, service_uuid: u16, characteristic_uuid: u16) -> Result<()> {
        self.send(SimCommand::Discover(service_uuid, characteristic_uuid))
    }

    fn set_notify(&mut self, enabled: bool) -> Result<()> {
        self.send(SimCommand::SetNotify(enabled))
    }

    fn disconnect(&mut self, handle: u16) -> Result<()> {
        self.send(SimCommand::Disconnect(handle))
    }
}

/// State of the simulated device and its radio stack
struct SimulatedSensor {
    config: SimulatorConfig,
    settings: LinkSettings,
    events: LinkEventSender,
    rng: StdRng,
    advertise_at: Option<Instant>,
    connect_at: Option<(Instant, PeerAddress)>,
    dropout_at: Option<Instant>,
    handle: Option<u16>,
    next_handle: u16,
    discovered: bool,
    notifying: bool,
    angle: i16,
}

impl SimulatedSensor {
    fn new(config: SimulatorConfig, settings: LinkSettings, events: LinkEventSender) -> Self {
        Self {
            config,
            settings,
            events,
            rng: StdRng::from_entropy(),
            advertise_at: None,
            connect_at: None,
            dropout_at: None,
            handle: None,
            next_handle: 1,
            discovered: false,
            notifying: false,
            angle: -180,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SimCommand>) {
        let period = Duration::from_millis(u64::from(self.config.packet_interval_ms.max(1)));
        let mut packets = interval(period);
        packets.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let delivered = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                _ = wait_until(self.advertise_at) => self.advertise(),
                _ = wait_until(self.connect_at.map(|(at, _)| at)) => self.complete_connect(),
                _ = wait_until(self.dropout_at) => self.drop_link(),
                _ = packets.tick(), if self.is_streaming() => self.notify(),
            };

            if !delivered {
                debug!("Bridge gone, stopping simulated power meter");
                break;
            }
        }
    }

    fn is_streaming(&self) -> bool {
        self.handle.is_some() && self.discovered && self.notifying
    }

    fn emit(&self, event: LinkEvent) -> bool {
        self.events.send(event).is_ok()
    }

    fn apply(&mut self, command: SimCommand) -> bool {
        debug!("Simulated radio command: {:?}", command);
        match command {
            SimCommand::StartScan(service_uuid) => {
                if service_uuid == self.settings.service_uuid && self.handle.is_none() {
                    self.advertise_at = Some(Instant::now() + self.delay(self.config.advertise_delay_ms));
                }
                true
            }
            SimCommand::StopScan => {
                self.advertise_at = None;
                true
            }
            SimCommand::Connect(peer) => {
                self.connect_at = Some((Instant::now() + self.delay(self.config.connect_delay_ms), peer));
                true
            }
            SimCommand::Discover(service_uuid, characteristic_uuid) => {
                if self.handle.is_none() {
                    return true;
                }

                if service_uuid != self.settings.service_uuid {
                    return self.emit(LinkEvent::DiscoveryFailed(DiscoveryFailure::ServiceNotFound));
                }

                if characteristic_uuid != self.settings.characteristic_uuid {
                    return self.emit(LinkEvent::DiscoveryFailed(
                        DiscoveryFailure::CharacteristicNotFound,
                    ));
                }

                self.discovered = true;
                self.emit(LinkEvent::DiscoveryComplete)
            }
            SimCommand::SetNotify(enabled) => {
                self.notifying = enabled && self.discovered;
                true
            }
            SimCommand::Disconnect(handle) => {
                if self.handle != Some(handle) {
                    return true;
                }

                self.reset_link();
                self.emit(LinkEvent::Disconnected { handle, reason: REASON_LOCAL_HOST })
            }
        }
    }

    fn advertise(&mut self) -> bool {
        self.advertise_at = Some(Instant::now() + self.delay(self.config.advertise_delay_ms));

        let foreign = LinkEvent::Advertisement(Advertisement {
            address: SIM_FOREIGN_ADDRESS,
            rssi: -80,
            services: vec![FOREIGN_SERVICE_UUID],
        });
        let sensor = LinkEvent::Advertisement(Advertisement {
            address: SIM_SENSOR_ADDRESS,
            rssi: self.rng.gen_range(-70..=-45),
            services: vec![self.settings.service_uuid],
        });

        self.emit(foreign) && self.emit(sensor)
    }

    fn complete_connect(&mut self) -> bool {
        let Some((_, peer)) = self.connect_at.take() else {
            return true;
        };

        if peer != SIM_SENSOR_ADDRESS {
            return self.emit(LinkEvent::ConnectFailed {
                reason: format!("no device at {}", peer),
            });
        }

        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        self.handle = Some(handle);
        self.advertise_at = None;

        if self.config.dropout_interval_ms > 0 {
            self.dropout_at = Some(Instant::now() + self.delay(self.config.dropout_interval_ms));
        }

        self.emit(LinkEvent::Connected { handle })
    }

    fn drop_link(&mut self) -> bool {
        self.dropout_at = None;
        let Some(handle) = self.handle else {
            return true;
        };

        info!("Simulated power meter dropped the link");
        self.reset_link();
        self.emit(LinkEvent::Disconnected { handle, reason: REASON_SUPERVISION_TIMEOUT })
    }

    fn notify(&mut self) -> bool {
        let sample = self.next_sample();
        self.emit(LinkEvent::Notification(encode(&sample)))
    }

    fn next_sample(&mut self) -> PowerSample {
        let power = (i32::from(self.config.rider_power) + self.rng.gen_range(-15..=15)).max(0) as u16;
        let cadence = (i32::from(self.config.rider_cadence) + self.rng.gen_range(-3..=3)).max(0) as u16;

        // Slight left/right imbalance, well inside the balance tolerance
        let left = (power / 2) as i16 + self.rng.gen_range(-3..=3);
        let right = power as i16 - left;

        self.angle = if self.angle >= 135 { -180 } else { self.angle + 45 };

        PowerSample {
            total_power: power,
            left_power: left,
            right_power: right,
            angle: self.angle,
            cadence,
            error_code: 0,
            valid: true,
        }
    }

    fn reset_link(&mut self) {
        self.handle = None;
        self.discovered = false;
        self.notifying = false;
        self.connect_at = None;
        self.dropout_at = None;
    }

    fn delay(&self, ms: u32) -> Duration {
        Duration::from_millis(u64::from(ms))
    }
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}
