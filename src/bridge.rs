//! # Bridge Controller
//!
//! Owns every piece of bridge state and advances it once per scheduler tick:
//!
//! 1. Drain sensor link events (notifications go through decode, validate
//!    and the quality monitor; everything else drives the state machine)
//! 2. Run any scheduled rescan
//! 3. Pick the current reading: real while streaming with fresh data,
//!    synthetic otherwise
//! 4. Log the periodic status line
//! 5. Publish to the broadcast profile when due
//! 6. Emit the quality summary when due
//! 7. Dispatch queued operator commands
//!
//! Nothing here blocks; radio operations complete through later events.

use std::collections::VecDeque;
use tracing::{debug, info, trace, warn};

use crate::clock::elapsed_since;
use crate::config::Config;
use crate::console::{parse_line, Command, StatusReport, HELP_TEXT};
use crate::link::{
    ConnectionState, ConnectionStateMachine, DisconnectOutcome, LinkEvent, LinkEventReceiver,
    LinkSettings, NotifyOutcome, ScanOutcome, SensorLink,
};
use crate::protocol::decoder::{basic_parse, format_details, hex};
use crate::protocol::packet::PACKET_LEN;
use crate::protocol::{check, decode, BroadcastFrame};
use crate::quality::{QualityMonitor, QualitySummary};
use crate::reading::Reading;
use crate::synthetic::SyntheticGenerator;
use crate::telemetry::{BroadcastProfile, Deadline, TelemetryPublisher};

/// How far behind the sensor data is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stall {
    None,
    Stale,
    Severe,
}

/// What happened during one tick
#[derive(Debug, Default)]
pub struct TickReport {
    /// Frame pushed to the broadcast profile, if the publish deadline fired
    pub published: Option<BroadcastFrame>,
    /// Quality summary, if the summary timer fired and packets have been seen
    pub summary: Option<QualitySummary>,
    /// Responses to operator commands dispatched this tick
    pub responses: Vec<String>,
}

/// Bridge between the sensor link and the broadcast profile
pub struct Bridge<L, B> {
    link: L,
    events: LinkEventReceiver,
    machine: ConnectionStateMachine,
    monitor: QualityMonitor,
    generator: SyntheticGenerator,
    publisher: TelemetryPublisher<B>,
    current: Reading,
    status: Deadline,
    stall: Stall,
    streaming_since: Option<u32>,
    reconnect_on_stall: bool,
    commands: VecDeque<String>,
}

impl<L: SensorLink, B: BroadcastProfile> Bridge<L, B> {
    /// Build a bridge starting at clock value `now`
    ///
    /// The current reading starts as the synthetic baseline, and the first
    /// publish is due at `now`.
    pub fn new(
        config: &Config,
        link: L,
        events: LinkEventReceiver,
        profile: B,
        now: u32,
    ) -> Self {
        let generator = SyntheticGenerator::new(&config.synthetic, now);
        let current = Reading::Synthetic {
            sample: generator.baseline(),
            generated_at: now,
        };

        Self {
            link,
            events,
            machine: ConnectionStateMachine::new(LinkSettings::from(&config.sensor)),
            monitor: QualityMonitor::new(&config.quality),
            generator,
            publisher: TelemetryPublisher::new(profile, &config.broadcast, &config.quality, now),
            current,
            status: Deadline::starting_at(
                now.wrapping_add(config.quality.status_interval_ms),
                config.quality.status_interval_ms,
            ),
            stall: Stall::None,
            streaming_since: None,
            reconnect_on_stall: config.sensor.reconnect_on_stall,
            commands: VecDeque::new(),
        }
    }

    /// Begin scanning for the power meter
    pub fn start(&mut self, now: u32) -> ScanOutcome {
        self.machine.start_scan(&mut self.link, now)
    }

    /// Queue an operator command line for the next tick
    pub fn submit(&mut self, line: impl Into<String>) {
        self.commands.push_back(line.into());
    }

    /// Advance the bridge to clock value `now`
    pub fn tick(&mut self, now: u32) -> TickReport {
        while let Ok(event) = self.events.try_recv() {
            self.on_event(event, now);
        }

        if let Some(ScanOutcome::Failed(reason)) = self.machine.poll(&mut self.link, now) {
            debug!("Automatic rescan failed: {}", reason);
        }

        self.refresh_reading(now);

        if self.status.poll(now) {
            self.log_status(now);
        }

        let mut report = TickReport {
            published: self.publisher.poll_publish(now, &self.current),
            ..TickReport::default()
        };

        if self.publisher.poll_summary(now) && self.monitor.has_samples() {
            let summary = self.monitor.summary(now, self.machine.is_connected());
            info!("\n{}", summary);
            report.summary = Some(summary);
        }

        while let Some(line) = self.commands.pop_front() {
            if let Some(response) = self.dispatch(&line, now) {
                report.responses.push(response);
            }
        }

        report
    }

    fn on_event(&mut self, event: LinkEvent, now: u32) {
        match event {
            LinkEvent::Notification(payload) => self.on_notification(&payload, now),
            other => {
                self.machine.handle_event(&mut self.link, &other, now);
                if self.machine.state() == ConnectionState::Idle {
                    self.stall = Stall::None;
                }
            }
        }
    }

    fn on_notification(&mut self, payload: &[u8], now: u32) {
        if !self.machine.is_streaming() {
            debug!("Ignoring notification while {}", self.machine.state());
            return;
        }

        trace!("Packet ({} bytes): {}", payload.len(), hex(payload));
        if payload.len() != PACKET_LEN {
            warn!(
                "Unexpected packet length {} (expected {})",
                payload.len(),
                PACKET_LEN
            );
        }

        let sample = decode(payload);
        trace!("\n{}", format_details(&sample, payload));

        if !sample.valid {
            self.monitor.record_invalid();
            warn!("Packet too short to decode: {}", hex(payload));
            return;
        }

        match check(&sample) {
            Ok(()) => {
                self.monitor.record_valid(now);
                self.current = Reading::Real {
                    sample,
                    received_at: now,
                };
                if self.stall != Stall::None {
                    info!("Sensor data resumed");
                    self.stall = Stall::None;
                }
            }
            Err(e) => {
                self.monitor.record_invalid();
                warn!("Rejected packet: {}", e);
                if let Some((power, cadence)) = basic_parse(payload) {
                    debug!("Basic parse of rejected packet: {}W @ {}RPM", power, cadence);
                }
            }
        }
    }

    fn refresh_reading(&mut self, now: u32) {
        if self.machine.is_streaming() {
            if self.streaming_since.is_none() {
                self.streaming_since = Some(now);
                self.stall = Stall::None;
            }
            self.check_stall(now);
        } else {
            self.streaming_since = None;
        }

        let use_synthetic = !self.machine.is_streaming() || !self.monitor.is_fresh(now);
        if !use_synthetic {
            return;
        }

        if self.current.is_real() {
            info!("Switching to synthetic data");
            self.current = Reading::Synthetic {
                sample: self.generator.sample(now),
                generated_at: now,
            };
        } else if let Some(sample) = self.generator.tick(now) {
            self.current = Reading::Synthetic {
                sample,
                generated_at: now,
            };
        }
    }

    /// Escalate the stall level for the current link
    ///
    /// Data age counts from the later of the last valid sample and the
    /// moment this link reached streaming, so a sample left over from an
    /// earlier session cannot stall a fresh link.
    fn check_stall(&mut self, now: u32) {
        let (Some(last_valid_age), Some(since)) =
            (self.monitor.last_valid_age(now), self.streaming_since)
        else {
            return;
        };
        let age = last_valid_age.min(elapsed_since(now, since));

        let timeout = self.monitor.timeout_ms();
        let level = if age > timeout.saturating_mul(2) {
            Stall::Severe
        } else if age > timeout {
            Stall::Stale
        } else {
            Stall::None
        };

        if level <= self.stall {
            return;
        }
        self.stall = level;

        match level {
            Stall::Stale => warn!("No valid data for {}ms, using synthetic data", age),
            Stall::Severe => {
                warn!("No valid data for {}ms, sensor may be stalled", age);
                if self.reconnect_on_stall {
                    info!("Dropping stalled sensor link");
                    self.machine.request_disconnect(&mut self.link);
                }
            }
            Stall::None => {}
        }
    }

    fn log_status(&self, now: u32) {
        let sample = self.current.sample();
        info!(
            state = %self.machine.state(),
            notifications = self.machine.notifications_enabled(),
            valid = self.monitor.valid_count(),
            invalid = self.monitor.invalid_count(),
            "Status: {}W @ {}RPM ({}), last valid {}",
            sample.total_power,
            sample.cadence,
            self.current.label(),
            match self.monitor.last_valid_age(now) {
                Some(age) => format!("{}ms ago", age),
                None => "never".to_string(),
            }
        );
    }

    fn dispatch(&mut self, line: &str, now: u32) -> Option<String> {
        let command = match parse_line(line)? {
            Ok(command) => command,
            Err(e) => return Some(format!("{}\nType 'help' for available commands", e)),
        };
        debug!("Operator command: {:?}", command);

        let response = match command {
            Command::Help => HELP_TEXT.to_string(),
            Command::Status => self.status_report(now).to_string(),
            Command::Scan => match self.machine.start_scan(&mut self.link, now) {
                ScanOutcome::Started => "Scanning for power meter...".to_string(),
                ScanOutcome::AlreadyScanning => "Already scanning...".to_string(),
                ScanOutcome::Busy(_) if self.machine.is_connected() => {
                    "Already connected to power meter".to_string()
                }
                ScanOutcome::Busy(state) => format!("Cannot scan while {}", state),
                ScanOutcome::Failed(reason) => format!("Failed to start scan: {}", reason),
            },
            Command::Disconnect => match self.machine.request_disconnect(&mut self.link) {
                DisconnectOutcome::Requested => "Disconnecting...".to_string(),
                DisconnectOutcome::NotConnected => "Not connected to any device".to_string(),
                DisconnectOutcome::Failed(reason) => format!("Failed to disconnect: {}", reason),
            },
            Command::Enable => notify_response(
                self.machine.set_notifications(&mut self.link, true),
                "enable",
                "enabled",
            ),
            Command::Disable => notify_response(
                self.machine.set_notifications(&mut self.link, false),
                "disable",
                "disabled",
            ),
        };

        Some(response)
    }

    /// Snapshot of the link, quality counters and current reading
    pub fn status_report(&self, now: u32) -> StatusReport {
        let sample = self.current.sample();
        StatusReport {
            state: self.machine.state(),
            peer: self.machine.peer().map(|peer| peer.to_string()),
            handle: self.machine.handle(),
            notifications_enabled: self.machine.notifications_enabled(),
            valid_count: self.monitor.valid_count(),
            invalid_count: self.monitor.invalid_count(),
            quality_good: self.monitor.is_quality_good(),
            last_valid_age_ms: self.monitor.last_valid_age(now),
            power: sample.total_power,
            cadence: sample.cadence,
            source: self.current.label(),
        }
    }

    pub fn current(&self) -> &Reading {
        &self.current
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn machine(&self) -> &ConnectionStateMachine {
        &self.machine
    }

    pub fn monitor(&self) -> &QualityMonitor {
        &self.monitor
    }

    pub fn publisher(&self) -> &TelemetryPublisher<B> {
        &self.publisher
    }

    pub fn link(&self) -> &L {
        &self.link
    }
}

fn notify_response(outcome: NotifyOutcome, verb: &str, done: &str) -> String {
    match outcome {
        NotifyOutcome::Changed => format!("Notifications {}", done),
        NotifyOutcome::Unchanged => format!("Notifications already {}", done),
        NotifyOutcome::NotConnected => "Error: Not connected".to_string(),
        NotifyOutcome::Failed(reason) => format!("Failed to {} notifications: {}", verb, reason),
    }
}
