//! # Sensor Link Module
//!
//! Boundary to the short-range radio stack that talks to the power meter.
//!
//! The radio stack is modelled as two halves:
//! - [`SensorLink`]: commands the bridge issues (scan, connect, discover,
//!   enable notifications, disconnect). Each call only *initiates* the
//!   operation and returns immediately.
//! - [`LinkEvent`]: completions and unsolicited traffic, delivered through a
//!   single-consumer channel that the bridge drains on its own loop.

pub mod sim;
pub mod state;

use bytes::Bytes;
use std::fmt;
use tokio::sync::mpsc;

use crate::error::{BridgeError, Result};

pub use state::{
    ConnectionState, ConnectionStateMachine, DisconnectOutcome, LinkSettings, NotifyOutcome,
    ScanOutcome,
};

/// 48-bit radio device address, stored little-endian as received on air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PeerAddress(pub [u8; 6]);

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

/// Scan report from a nearby device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: PeerAddress,
    pub rssi: i8,
    /// 16-bit service UUIDs listed in the advertisement
    pub services: Vec<u16>,
}

impl Advertisement {
    pub fn advertises(&self, service_uuid: u16) -> bool {
        self.services.contains(&service_uuid)
    }
}

/// What was missing when discovery failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryFailure {
    ServiceNotFound,
    CharacteristicNotFound,
}

impl fmt::Display for DiscoveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryFailure::ServiceNotFound => write!(f, "service not found"),
            DiscoveryFailure::CharacteristicNotFound => write!(f, "characteristic not found"),
        }
    }
}

/// Events delivered by the radio stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Device seen while scanning
    Advertisement(Advertisement),

    /// Link established
    Connected { handle: u16 },

    /// Connection attempt did not complete
    ConnectFailed { reason: String },

    /// Target service and characteristic resolved
    DiscoveryComplete,

    DiscoveryFailed(DiscoveryFailure),

    /// Notification payload from the power measurement characteristic
    Notification(Bytes),

    /// Link lost or closed
    Disconnected { handle: u16, reason: u8 },
}

/// Commands the bridge can issue to the sensor radio stack
///
/// Every call initiates an operation and returns without waiting for it to
/// complete; completion arrives later as a [`LinkEvent`].
#[cfg_attr(test, mockall::automock)]
pub trait SensorLink {
    /// Begin scanning for devices advertising `service_uuid`
    fn start_scan(&mut self, service_uuid: u16) -> Result<()>;

    fn stop_scan(&mut self) -> Result<()>;

    fn connect(&mut self, peer: PeerAddress) -> Result<()>;

    /// Resolve the power measurement characteristic on the connected peer
    fn discover(&mut self, service_uuid: u16, characteristic_uuid: u16) -> Result<()>;

    /// Enable or disable notifications on the discovered characteristic
    fn set_notify(&mut self, enabled: bool) -> Result<()>;

    fn disconnect(&mut self, handle: u16) -> Result<()>;
}

impl<L: SensorLink + ?Sized> SensorLink for Box<L> {
    fn start_scan(&mut self, service_uuid: u16) -> Result<()> {
        (**self).start_scan(service_uuid)
    }

    fn stop_scan(&mut self) -> Result<()> {
        (**self).stop_scan()
    }

    fn connect(&mut self, peer: PeerAddress) -> Result<()> {
        (**self).connect(peer)
    }

    fn discover(&mut self, service_uuid: u16, characteristic_uuid: u16) -> Result<()> {
        (**self).discover(service_uuid, characteristic_uuid)
    }

    fn set_notify(&mut self, enabled: bool) -> Result<()> {
        (**self).set_notify(enabled)
    }

    fn disconnect(&mut self, handle: u16) -> Result<()> {
        (**self).disconnect(handle)
    }
}

/// Link used when no sensor radio is attached
///
/// Every operation fails, so the bridge stays on synthetic data.
#[derive(Debug, Default)]
pub struct DetachedLink;

impl DetachedLink {
    fn unavailable() -> BridgeError {
        BridgeError::Link("no sensor radio attached".to_string())
    }
}

impl SensorLink for DetachedLink {
    fn start_scan(&mut self, _service_uuid: u16) -> Result<()> {
        Err(Self::unavailable())
    }

    fn stop_scan(&mut self) -> Result<()> {
        Err(Self::unavailable())
    }

    fn connect(&mut self, _peer: PeerAddress) -> Result<()> {
        Err(Self::unavailable())
    }

    fn discover(&mut self, _service_uuid: u16, _characteristic_uuid: u16) -> Result<()> {
        Err(Self::unavailable())
    }

    fn set_notify(&mut self, _enabled: bool) -> Result<()> {
        Err(Self::unavailable())
    }

    fn disconnect(&mut self, _handle: u16) -> Result<()> {
        Err(Self::unavailable())
    }
}

pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;
pub type LinkEventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

/// Create the channel carrying radio stack events to the bridge
pub fn event_channel() -> (LinkEventSender, LinkEventReceiver) {
    mpsc::unbounded_channel()
}

/// Test doubles for the sensor link
#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Command recorded by [`RecordingLink`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum LinkCall {
        StartScan(u16),
        StopScan,
        Connect(PeerAddress),
        Discover(u16, u16),
        SetNotify(bool),
        Disconnect(u16),
    }

    /// Link that records every command and succeeds unless told to fail
    #[derive(Debug, Clone, Default)]
    pub struct RecordingLink {
        pub calls: Arc<Mutex<Vec<LinkCall>>>,
        pub fail_notify: Arc<Mutex<bool>>,
    }

    impl RecordingLink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<LinkCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }

        fn record(&self, call: LinkCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl SensorLink for RecordingLink {
        fn start_scan(&mut self, service_uuid: u16) -> Result<()> {
            self.record(LinkCall::StartScan(service_uuid));
            Ok(())
        }

        fn stop_scan(&mut self) -> Result<()> {
            self.record(LinkCall::StopScan);
            Ok(())
        }

        fn connect(&mut self, peer: PeerAddress) -> Result<()> {
            self.record(LinkCall::Connect(peer));
            Ok(())
        }

        fn discover(&mut self, service_uuid: u16, characteristic_uuid: u16) -> Result<()> {
            self.record(LinkCall::Discover(service_uuid, characteristic_uuid));
            Ok(())
        }

        fn set_notify(&mut self, enabled: bool) -> Result<()> {
            self.record(LinkCall::SetNotify(enabled));
            if *self.fail_notify.lock().unwrap() {
                return Err(BridgeError::Link("CCCD write rejected".to_string()));
            }
            Ok(())
        }

        fn disconnect(&mut self, handle: u16) -> Result<()> {
            self.record(LinkCall::Disconnect(handle));
            Ok(())
        }
    }
}
