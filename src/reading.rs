//! # Current Reading
//!
//! The value the bridge broadcasts is always tagged with where it came from,
//! so that the sensor path and the synthetic path never share a mutable
//! record.

use std::fmt;

use crate::protocol::PowerSample;

/// Latest power/cadence reading and its source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// Decoded and validated from a sensor notification
    Real { sample: PowerSample, received_at: u32 },

    /// Produced by the synthetic generator
    Synthetic { sample: PowerSample, generated_at: u32 },
}

impl Reading {
    pub fn sample(&self) -> &PowerSample {
        match self {
            Reading::Real { sample, .. } | Reading::Synthetic { sample, .. } => sample,
        }
    }

    /// Clock value (ms) when the reading was produced
    pub fn timestamp(&self) -> u32 {
        match self {
            Reading::Real { received_at, .. } => *received_at,
            Reading::Synthetic { generated_at, .. } => *generated_at,
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Reading::Real { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Reading::Real { .. } => "REAL",
            Reading::Synthetic { .. } => "SYNTHETIC",
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sample = self.sample();
        write!(
            f,
            "{}W @ {}RPM ({})",
            sample.total_power,
            sample.cadence,
            self.label()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_accessors() {
        let sample = PowerSample::from_power_cadence(200, 90);
        let real = Reading::Real { sample, received_at: 42 };
        let synthetic = Reading::Synthetic { sample, generated_at: 7 };

        assert!(real.is_real());
        assert!(!synthetic.is_real());
        assert_eq!(real.timestamp(), 42);
        assert_eq!(synthetic.timestamp(), 7);
        assert_eq!(real.sample().total_power, 200);
    }

    #[test]
    fn test_reading_display() {
        let reading = Reading::Synthetic {
            sample: PowerSample::from_power_cadence(100, 70),
            generated_at: 0,
        };
        assert_eq!(reading.to_string(), "100W @ 70RPM (SYNTHETIC)");
    }
}
