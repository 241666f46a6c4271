//! # Synthetic Signal Generator
//!
//! Produces plausible power/cadence values when no live sensor data is
//! available. Each draw is the configured baseline plus a uniform random
//! offset, clamped at zero.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::clock::deadline_reached;
use crate::config::SyntheticConfig;
use crate::protocol::PowerSample;

/// Baseline-plus-noise power/cadence source
#[derive(Debug)]
pub struct SyntheticGenerator {
    base_power: u16,
    base_cadence: u16,
    power_variation: u16,
    cadence_variation: u16,
    update_interval_ms: u32,
    last_update: u32,
    rng: StdRng,
}

impl SyntheticGenerator {
    /// Create a generator whose first interval starts at `now`
    ///
    /// A configured seed makes the sequence reproducible.
    pub fn new(config: &SyntheticConfig, now: u32) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            base_power: config.base_power,
            base_cadence: config.base_cadence,
            power_variation: config.power_variation,
            cadence_variation: config.cadence_variation,
            update_interval_ms: config.update_interval_ms,
            last_update: now,
            rng,
        }
    }

    /// Draw a new value if the update interval has elapsed since the last one
    pub fn tick(&mut self, now: u32) -> Option<PowerSample> {
        let due = self.last_update.wrapping_add(self.update_interval_ms);
        if !deadline_reached(now, due) {
            return None;
        }

        Some(self.sample(now))
    }

    /// Draw a new value immediately and restart the update interval
    pub fn sample(&mut self, now: u32) -> PowerSample {
        self.last_update = now;

        let power = vary(&mut self.rng, self.base_power, self.power_variation);
        let cadence = vary(&mut self.rng, self.base_cadence, self.cadence_variation);
        debug!("Synthetic sample: {}W @ {}RPM", power, cadence);

        PowerSample::from_power_cadence(power, cadence)
    }

    /// Noise-free sample at the configured baseline
    pub fn baseline(&self) -> PowerSample {
        PowerSample::from_power_cadence(self.base_power, self.base_cadence)
    }
}

fn vary(rng: &mut StdRng, base: u16, variation: u16) -> u16 {
    let variation = i32::from(variation);
    let offset = if variation == 0 {
        0
    } else {
        rng.gen_range(-variation..=variation)
    };

    (i32::from(base) + offset).clamp(0, i32::from(u16::MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(base_power: u16, power_variation: u16) -> SyntheticConfig {
        SyntheticConfig {
            base_power,
            base_cadence: 70,
            update_interval_ms: 1000,
            power_variation,
            cadence_variation: 10,
            seed: Some(7),
        }
    }

    #[test]
    fn test_values_stay_within_variation() {
        let mut generator = SyntheticGenerator::new(&seeded(100, 20), 0);

        for i in 1..=500u32 {
            let sample = generator.sample(i * 1000);
            assert!((80..=120).contains(&sample.total_power));
            assert!((60..=80).contains(&sample.cadence));
            assert!(sample.valid);
        }
    }

    #[test]
    fn test_values_never_negative() {
        let mut config = seeded(5, 20);
        config.base_cadence = 3;
        let mut generator = SyntheticGenerator::new(&config, 0);

        let mut saw_zero = false;
        for i in 1..=500u32 {
            let sample = generator.sample(i);
            assert!(sample.total_power <= 25);
            assert!(sample.cadence <= 13);
            saw_zero |= sample.total_power == 0;
        }
        assert!(saw_zero);
    }

    #[test]
    fn test_tick_respects_interval() {
        let mut generator = SyntheticGenerator::new(&seeded(100, 20), 0);

        assert!(generator.tick(0).is_none());
        assert!(generator.tick(999).is_none());
        assert!(generator.tick(1000).is_some());
        assert!(generator.tick(1500).is_none());
        assert!(generator.tick(2000).is_some());
    }

    #[test]
    fn test_sample_restarts_interval() {
        let mut generator = SyntheticGenerator::new(&seeded(100, 20), 0);

        generator.sample(800);
        assert!(generator.tick(1000).is_none());
        assert!(generator.tick(1800).is_some());
    }

    #[test]
    fn test_zero_variation_is_constant() {
        let mut config = seeded(150, 0);
        config.cadence_variation = 0;
        let mut generator = SyntheticGenerator::new(&config, 0);

        let sample = generator.sample(1);
        assert_eq!(sample.total_power, 150);
        assert_eq!(sample.cadence, 70);
        assert_eq!(generator.baseline(), sample);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let mut a = SyntheticGenerator::new(&seeded(100, 20), 0);
        let mut b = SyntheticGenerator::new(&seeded(100, 20), 0);

        for i in 1..=20u32 {
            assert_eq!(a.sample(i), b.sample(i));
        }
    }
}
