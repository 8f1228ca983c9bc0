//! Particle set quality tracking
//!
//! Keeps an exponential moving average of how well the particle set explains
//! the incoming scans. When the average drops below a threshold the filter
//! replaces part of its prior with random free-space particles so it can
//! recover from a wrong convergence.

/// Moving average of the distribution quality in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingAugmentation {
    /// Weight of the newest observation
    smoothing: f64,
    threshold: f64,
    quality: f64,
}

impl SamplingAugmentation {
    /// Starts at full quality so a fresh filter is not reinvigorated.
    pub fn new(smoothing: f64, threshold: f64) -> Self {
        SamplingAugmentation {
            smoothing: smoothing.clamp(0.0, 1.0),
            threshold,
            quality: 1.0,
        }
    }

    pub fn quality(&self) -> f64 {
        self.quality
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Fold in one observed quality and return the new average.
    pub fn update(&mut self, observed: f64) -> f64 {
        let observed = if observed.is_finite() {
            observed.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.quality += self.smoothing * (observed - self.quality);
        self.quality
    }

    /// Drop the average to zero after the weights collapsed entirely.
    pub fn invalidate(&mut self) {
        self.quality = 0.0;
    }

    pub fn reset(&mut self) {
        self.quality = 1.0;
    }

    pub fn needs_reinvigoration(&self) -> bool {
        self.quality < self.threshold
    }
}

impl Default for SamplingAugmentation {
    fn default() -> Self {
        Self::new(0.5, 0.15)
    }
}
