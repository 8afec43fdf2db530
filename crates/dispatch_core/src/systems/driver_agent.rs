use bevy_ecs::prelude::{Commands, Entity, Query, Res, ResMut};
use tracing::debug;

use crate::clock::SimulationClock;
use crate::driver::{DriverContext, DriverOutcome, MobilityServiceDriver, OnCallDriver};
use crate::ecs::{MotionHandle, Movement, Position};
use crate::message::MessageBus;
use crate::routing::RouteServiceResource;
use crate::telemetry::DispatchTelemetry;

/// Step every driver agent once and remove the ones whose shift has ended.
pub fn driver_agent_system(
    mut commands: Commands,
    clock: Res<SimulationClock>,
    route: Res<RouteServiceResource>,
    mut bus: ResMut<MessageBus>,
    mut telemetry: ResMut<DispatchTelemetry>,
    mut drivers: Query<(Entity, &mut OnCallDriver, &mut Position, &mut Movement)>,
) {
    let tick = clock.tick();
    for (entity, mut driver, mut position, mut movement) in &mut drivers {
        let id = driver.driver_id();
        let inbox = bus.take_for_driver(id, tick);
        let mut motion = MotionHandle {
            position: &mut position,
            movement: &mut movement,
        };
        let mut ctx = DriverContext {
            tick,
            now_ms: clock.now_ms(),
            route: route.service(),
            bus: &mut bus,
            telemetry: &mut telemetry,
        };
        if driver.update(&mut ctx, &mut motion, inbox) == DriverOutcome::Departed {
            debug!(driver = %id, tick, "removing driver");
            bus.remove_driver(id);
            commands.entity(entity).despawn();
        }
    }
}
