use bevy_ecs::prelude::Resource;

pub const ONE_SEC_MS: u64 = 1000;
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;
pub const ONE_HOUR_MS: u64 = 60 * ONE_MIN_MS;

/// Fixed-step simulation clock. Every system observes the same tick; time only
/// moves forward through [`SimulationClock::advance`].
#[derive(Debug, Clone, Copy, Resource)]
pub struct SimulationClock {
    tick: u64,
    tick_ms: u64,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(ONE_SEC_MS)
    }
}

impl SimulationClock {
    pub fn new(tick_ms: u64) -> Self {
        Self {
            tick: 0,
            tick_ms: tick_ms.max(1),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms
    }

    pub fn tick_secs(&self) -> f64 {
        self.tick_ms as f64 / ONE_SEC_MS as f64
    }

    pub fn now_ms(&self) -> u64 {
        self.tick * self.tick_ms
    }

    pub fn advance(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Number of whole ticks needed to cover `ms`, rounded up.
    pub fn ticks_for_ms(&self, ms: u64) -> u64 {
        ms.div_ceil(self.tick_ms)
    }
}
