//! Point-to-point link model.
//!
//! A link serialises frames per direction at its data rate, then adds a
//! fixed propagation delay. An optional receive error model drops frames
//! at random; there is no corruption short of a drop.

use std::time::Duration;

use rand::Rng;

use trickle_core::config::SimulationSettings;

/// IPv4 (20) + UDP (8) + PPP (2) bytes added to every datagram on the wire.
pub const FRAME_OVERHEAD: usize = 30;

/// What one error-rate draw applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorUnit {
    /// Each byte fails independently; a frame is lost if any byte fails.
    Byte,
    /// Each frame fails independently.
    Packet,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateErrorModel {
    rate: f64,
    unit: ErrorUnit,
}

impl RateErrorModel {
    /// Byte-unit model. `rate` is clamped to [0, 1].
    pub fn new(rate: f64) -> Self {
        Self::with_unit(rate, ErrorUnit::Byte)
    }

    pub fn with_unit(rate: f64, unit: ErrorUnit) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
            unit,
        }
    }

    /// Probability that a frame of `frame_bytes` is lost.
    pub fn loss_probability(&self, frame_bytes: usize) -> f64 {
        match self.unit {
            ErrorUnit::Packet => self.rate,
            ErrorUnit::Byte => 1.0 - (1.0 - self.rate).powi(frame_bytes as i32),
        }
    }

    pub fn drops<R: Rng + ?Sized>(&self, frame_bytes: usize, rng: &mut R) -> bool {
        let p = self.loss_probability(frame_bytes);
        p > 0.0 && rng.gen::<f64>() < p
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub data_rate_bps: u64,
    pub delay: Duration,
    pub error_model: Option<RateErrorModel>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            data_rate_bps: 5_000_000,
            delay: Duration::from_millis(2),
            error_model: None,
        }
    }
}

impl From<&SimulationSettings> for LinkConfig {
    fn from(s: &SimulationSettings) -> Self {
        Self {
            data_rate_bps: s.data_rate_bps,
            delay: Duration::from_millis(s.link_delay_ms),
            error_model: (s.error_rate > 0.0).then(|| RateErrorModel::new(s.error_rate)),
        }
    }
}

impl LinkConfig {
    /// Time to put `frame_bytes` on the wire. Zero rate means infinitely fast.
    pub fn transmission_time(&self, frame_bytes: usize) -> Duration {
        if self.data_rate_bps == 0 {
            return Duration::ZERO;
        }
        let bits = frame_bytes as u128 * 8;
        let nanos = bits * 1_000_000_000 / self.data_rate_bps as u128;
        Duration::from_nanos(nanos as u64)
    }
}

/// A link between two nodes, with per-direction transmitter state.
#[derive(Debug)]
pub(crate) struct Link {
    pub(crate) ends: [u32; 2],
    pub(crate) config: LinkConfig,
    busy_until: [Duration; 2],
}

impl Link {
    pub(crate) fn new(a: u32, b: u32, config: LinkConfig) -> Self {
        Self {
            ends: [a, b],
            config,
            busy_until: [Duration::ZERO; 2],
        }
    }

    pub(crate) fn connects(&self, from: u32, to: u32) -> bool {
        self.ends == [from, to] || self.ends == [to, from]
    }

    /// Queue a frame leaving `from` at `now`; returns its arrival time at the far end.
    pub(crate) fn transmit(&mut self, from: u32, frame_bytes: usize, now: Duration) -> Duration {
        let dir = usize::from(self.ends[0] != from);
        let start = now.max(self.busy_until[dir]);
        let done = start + self.config.transmission_time(frame_bytes);
        self.busy_until[dir] = done;
        done + self.config.delay
    }
}
