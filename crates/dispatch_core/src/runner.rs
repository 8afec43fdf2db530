//! Simulation runner: advances the clock and runs the per-tick schedule.
//!
//! Within a tick the systems run in a fixed order: due requests are released,
//! vehicles move, driver agents react, controllers react and schedule, then
//! deferred commands (driver removal) are applied.

use bevy_ecs::prelude::{Entity, Schedule, World};
use bevy_ecs::schedule::{apply_deferred, IntoSystemConfigs};
use tracing::info;

use crate::clock::SimulationClock;
use crate::controller::ControllerFleet;
use crate::driver::OnCallDriver;
use crate::ecs::{Movement, Position};
use crate::error::{DispatchError, DispatchResult};
use crate::ids::{ControllerId, DriverId};
use crate::message::{DriverMessage, MessageBus};
use crate::scenario::{DispatchConfig, DriverSpawn};
use crate::schedule::TripRequest;
use crate::systems::{
    dispatch::{controller_system, fleet_snapshot_system},
    driver_agent::driver_agent_system,
    movement::movement_system,
    request_inbound::request_inbound_system,
};

/// Builds the per-tick schedule.
pub fn simulation_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            request_inbound_system,
            movement_system,
            driver_agent_system,
            fleet_snapshot_system,
            controller_system,
            apply_deferred,
        )
            .chain(),
    );
    schedule
}

/// Advance the clock by one tick and run the schedule. Returns the new tick.
pub fn on_tick(world: &mut World, schedule: &mut Schedule) -> u64 {
    let tick = world.resource_mut::<SimulationClock>().advance();
    schedule.run(world);
    tick
}

pub fn run_ticks(world: &mut World, schedule: &mut Schedule, ticks: u64) {
    for _ in 0..ticks {
        on_tick(world, schedule);
    }
}

/// Runs `ticks` ticks and invokes `hook` after each one.
pub fn run_ticks_with_hook<F>(world: &mut World, schedule: &mut Schedule, ticks: u64, mut hook: F)
where
    F: FnMut(&World, u64),
{
    for _ in 0..ticks {
        let tick = on_tick(world, schedule);
        hook(world, tick);
    }
}

/// Hand a request straight to a controller's queue.
pub fn on_trip_request_received(
    world: &mut World,
    controller: ControllerId,
    request: TripRequest,
) -> DispatchResult<()> {
    let now_ms = world.resource::<SimulationClock>().now_ms();
    world
        .resource_mut::<ControllerFleet>()
        .get_mut(controller)?
        .on_trip_request(request, now_ms);
    Ok(())
}

/// Spawn a driver agent. It subscribes to its controllers on its first tick.
pub fn on_driver_subscribe(world: &mut World, spawn: DriverSpawn) -> DispatchResult<Entity> {
    let controllers = if spawn.controllers.is_empty() {
        world.resource::<ControllerFleet>().ids()
    } else {
        let fleet = world.resource::<ControllerFleet>();
        if let Some(unknown) = spawn.controllers.iter().find(|id| fleet.get(**id).is_none()) {
            return Err(DispatchError::UnknownController(*unknown));
        }
        spawn.controllers
    };
    let config = world.resource::<DispatchConfig>();
    let capacity = spawn.capacity.unwrap_or(config.driver.capacity);
    let driver = OnCallDriver::new(
        spawn.id,
        capacity,
        controllers,
        config.driver.cruise_policy(),
        config.seed,
    );
    info!(driver = %spawn.id, location = %spawn.location, capacity, "driver spawned");
    Ok(world
        .spawn((driver, Position(spawn.location), Movement::default()))
        .id())
}

/// Ask a driver to end its shift once its schedule is done.
pub fn on_driver_shift_end(world: &mut World, driver: DriverId) {
    let tick = world.resource::<SimulationClock>().tick();
    world
        .resource_mut::<MessageBus>()
        .post_to_driver(driver, DriverMessage::ShiftEndRequested, tick);
}
