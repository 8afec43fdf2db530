#![allow(dead_code)]

use bevy_ecs::prelude::World;
use bevy_ecs::schedule::Schedule;
use dispatch_core::runner::{on_tick, simulation_schedule};

/// Owns a reusable `Schedule` so tests can step ticks or run until a condition.
pub struct ScheduleRunner {
    schedule: Schedule,
}

impl Default for ScheduleRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleRunner {
    pub fn new() -> Self {
        Self {
            schedule: simulation_schedule(),
        }
    }

    pub fn step(&mut self, world: &mut World) -> u64 {
        on_tick(world, &mut self.schedule)
    }

    pub fn run(&mut self, world: &mut World, ticks: u64) {
        for _ in 0..ticks {
            self.step(world);
        }
    }

    /// Step until `done` holds or `max_ticks` pass. Returns the tick reached
    /// when the condition held.
    pub fn run_until<F>(&mut self, world: &mut World, max_ticks: u64, mut done: F) -> Option<u64>
    where
        F: FnMut(&mut World) -> bool,
    {
        for _ in 0..max_ticks {
            let tick = self.step(world);
            if done(world) {
                return Some(tick);
            }
        }
        None
    }

    /// Step `ticks` ticks, calling `check` after each.
    pub fn run_checked<F>(&mut self, world: &mut World, ticks: u64, mut check: F)
    where
        F: FnMut(&mut World, u64),
    {
        for _ in 0..ticks {
            let tick = self.step(world);
            check(world, tick);
        }
    }
}
