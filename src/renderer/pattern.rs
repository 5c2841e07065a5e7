//! The per-anchor point pattern
//!
//! A [`Pattern`] is a table of sample offsets relative to an anchor, each with
//! a brightness level. Compute queues scatter every sample of every anchor
//! into the frame; they never need to know the shape.

use std::f64::consts::TAU;

/// Golden ratio
const PHI: f64 = 1.618_033_988_749_895;

/// One sample of a pattern, relative to its anchor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub dx: f64,
    pub dy: f64,
    /// Brightness in `0..=255`
    pub level: u32,
}

/// A fixed set of offsets painted around each anchor
pub trait Pattern: Sync {
    fn samples(&self) -> &[Sample];
}

/// Sunflower seed-head spiral.
///
/// Sample `n` sits at radius `sqrt(n)` and angle `n * 2π * φ`; brightness
/// falls linearly from 255 at the centre to 0 at `n = count`.
#[derive(Debug, Clone)]
pub struct Phyllotaxis {
    samples: Vec<Sample>,
}

impl Phyllotaxis {
    pub fn new(count: u32) -> Self {
        let total = u64::from(count);
        let samples = (0..count)
            .map(|n| {
                let nf = f64::from(n);
                let radius = nf.sqrt();
                let angle = nf * TAU * PHI;
                let level = 255 * (total - u64::from(n)) / total;
                Sample {
                    dx: radius * angle.cos(),
                    dy: radius * angle.sin(),
                    level: level as u32,
                }
            })
            .collect();

        Self { samples }
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

impl Pattern for Phyllotaxis {
    fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_is_anchor_at_full_brightness() {
        let spiral = Phyllotaxis::new(100);
        let first = spiral.samples()[0];
        assert_eq!(first.dx, 0.0);
        assert_eq!(first.dy, 0.0);
        assert_eq!(first.level, 255);
    }

    #[test]
    fn test_brightness_decays_linearly() {
        let spiral = Phyllotaxis::new(256);
        let levels: Vec<u32> = spiral.samples().iter().map(|s| s.level).collect();

        assert_eq!(levels.len(), 256);
        assert_eq!(levels[128], 127);
        assert_eq!(levels[255], 0);
        assert!(levels.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_radius_is_sqrt_n() {
        let spiral = Phyllotaxis::new(1000);
        for (n, sample) in spiral.samples().iter().enumerate().step_by(97) {
            let radius = (sample.dx * sample.dx + sample.dy * sample.dy).sqrt();
            assert!((radius - (n as f64).sqrt()).abs() < 1e-9, "sample {}", n);
        }
    }

    #[test]
    fn test_consecutive_samples_turn_by_golden_angle() {
        let spiral = Phyllotaxis::new(10);
        let a = spiral.samples()[1];
        let b = spiral.samples()[2];

        let turn = b.dy.atan2(b.dx) - a.dy.atan2(a.dx);
        let expected = (TAU * PHI).rem_euclid(TAU);
        assert!((turn.rem_euclid(TAU) - expected).abs() < 1e-9);
    }
}
