use crate::rng::{self, SplitMix64};

/// Timing for one iteration of the cooperative control loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    pub tick: u64,
    pub dt_seconds: f32,
    /// Seconds since the loop started; used for timeouts and cool-downs.
    pub time_s: f64,
    pub seed: u64,
}

impl TickContext {
    /// Fixed-rate context: `time_s` is derived from `tick * dt_seconds`.
    pub fn new(tick: u64, dt_seconds: f32, seed: u64) -> Self {
        Self {
            tick,
            dt_seconds,
            time_s: tick as f64 * dt_seconds as f64,
            seed,
        }
    }

    pub fn next(&self) -> Self {
        Self::new(self.tick + 1, self.dt_seconds, self.seed)
    }

    /// Deterministic RNG for a named stream within this tick.
    pub fn rng(&self, stream: u64) -> SplitMix64 {
        SplitMix64::new(rng::derive_seed(self.seed, self.tick, stream))
    }
}
