//! # Millisecond Clock
//!
//! The bridge keeps time as a wrapping 32-bit millisecond counter. Every
//! deadline comparison goes through [`deadline_reached`] so that scheduling
//! keeps working across the 2^32 ms (~49.7 day) wrap.

use tokio::time::Instant;

/// True once `now` is at or past `deadline`, tolerating counter wrap
///
/// Valid while the two values are less than 2^31 ms apart.
///
/// # Examples
///
/// ```
/// use power_bridge::clock::deadline_reached;
///
/// assert!(deadline_reached(1000, 1000));
/// assert!(!deadline_reached(999, 1000));
/// // Deadline scheduled just before the wrap, now just after it
/// assert!(deadline_reached(5, u32::MAX - 5));
/// ```
pub fn deadline_reached(now: u32, deadline: u32) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

/// Milliseconds elapsed from `earlier` to `now`, tolerating counter wrap
pub fn elapsed_since(now: u32, earlier: u32) -> u32 {
    now.wrapping_sub(earlier)
}

/// Monotonic millisecond counter starting at zero
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    /// Milliseconds since the clock was created, truncated to 32 bits
    pub fn now_ms(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
