//! Stochastic channel rate model
//!
//! A channel is stateless beyond its configured parameters: every sample is
//! an independent draw from the node-facing RNG, so a seeded generator
//! reproduces an episode's rate sequence exactly.

use rand::Rng;

use crate::config::ChannelKind;

/// Direction-aware bandwidth model for one edge-to-cloud link.
#[derive(Debug, Clone)]
pub struct Channel {
    uplink_rate: f64,
    downlink_rate: f64,
    jitter: f64,
}

impl Channel {
    /// Creates a channel from a catalog technology.
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            uplink_rate: kind.uplink_rate(),
            downlink_rate: kind.downlink_rate(),
            jitter: kind.jitter(),
        }
    }

    /// Creates a channel with explicit nominal rates (bits/tick) and jitter
    /// fraction.
    pub fn with_rates(uplink_rate: f64, downlink_rate: f64, jitter: f64) -> Self {
        Self { uplink_rate, downlink_rate, jitter }
    }

    /// Nominal rate for the given direction, bits/tick.
    pub fn nominal_rate(&self, uplink: bool) -> f64 {
        if uplink { self.uplink_rate } else { self.downlink_rate }
    }

    /// Samples an instantaneous rate in bits/tick. Non-negative; with zero
    /// jitter the sample equals the nominal rate and consumes no randomness.
    pub fn sample_rate(&self, uplink: bool, rng: &mut impl Rng) -> f64 {
        let nominal = self.nominal_rate(uplink);
        if self.jitter == 0.0 {
            return nominal;
        }
        let factor = 1.0 + self.jitter * rng.gen_range(-1.0..1.0);
        (nominal * factor).max(0.0)
    }
}
