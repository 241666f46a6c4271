//! Outbound broadcast profile boundary

use tracing::debug;

use crate::error::Result;
use crate::protocol::{decoder::hex, encode_power_only_page, BroadcastFrame};

/// Channel on which cycling-power telemetry is broadcast
///
/// Implementations push one frame per publish tick. A failed push is
/// reported to the caller, which logs it and carries on.
#[cfg_attr(test, mockall::automock)]
pub trait BroadcastProfile {
    fn publish(&mut self, frame: &BroadcastFrame) -> Result<()>;
}

impl<B: BroadcastProfile + ?Sized> BroadcastProfile for Box<B> {
    fn publish(&mut self, frame: &BroadcastFrame) -> Result<()> {
        (**self).publish(frame)
    }
}

/// Profile that only logs each encoded page
#[derive(Debug, Default)]
pub struct TracingBroadcaster {
    published: u64,
}

impl TracingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames published so far
    pub fn published(&self) -> u64 {
        self.published
    }
}

impl BroadcastProfile for TracingBroadcaster {
    fn publish(&mut self, frame: &BroadcastFrame) -> Result<()> {
        self.published += 1;
        debug!(
            power = frame.instant_power,
            cadence = frame.instant_cadence,
            accumulated = frame.accumulated_power,
            events = frame.event_count,
            "Power page {}",
            hex(&encode_power_only_page(frame))
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_broadcaster_counts() {
        let mut profile = TracingBroadcaster::new();
        profile.publish(&BroadcastFrame::default()).unwrap();
        profile.publish(&BroadcastFrame::default()).unwrap();
        assert_eq!(profile.published(), 2);
    }

    #[test]
    fn test_boxed_profile_forwards() {
        let mut mock = MockBroadcastProfile::new();
        mock.expect_publish()
            .withf(|frame| frame.event_count == 3)
            .times(1)
            .returning(|_| Ok(()));

        let mut boxed: Box<dyn BroadcastProfile> = Box::new(mock);
        let frame = BroadcastFrame { event_count: 3, ..BroadcastFrame::default() };
        assert!(boxed.publish(&frame).is_ok());
    }
}
