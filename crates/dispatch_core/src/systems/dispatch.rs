use bevy_ecs::prelude::{Query, Res, ResMut};

use crate::clock::SimulationClock;
use crate::controller::{ControllerContext, ControllerFleet, DriverSnapshot};
use crate::driver::{MobilityServiceDriver, OnCallDriver};
use crate::ecs::Position;
use crate::message::MessageBus;
use crate::routing::RouteServiceResource;
use crate::scenario::FleetSnapshotResource;
use crate::telemetry::DispatchTelemetry;

/// Rebuild the controllers' view of every live driver agent.
pub fn fleet_snapshot_system(
    mut snapshot: ResMut<FleetSnapshotResource>,
    drivers: Query<(&OnCallDriver, &Position)>,
) {
    let fleet = &mut snapshot.0.drivers;
    fleet.clear();
    for (driver, position) in &drivers {
        fleet.insert(
            driver.driver_id(),
            DriverSnapshot {
                location: position.0,
                status: driver.service_status(),
                passenger_count: driver.passenger_count(),
                ending_shift: driver.is_ending_shift(),
            },
        );
    }
}

/// Tick every controller in id order.
pub fn controller_system(
    clock: Res<SimulationClock>,
    route: Res<RouteServiceResource>,
    snapshot: Res<FleetSnapshotResource>,
    mut bus: ResMut<MessageBus>,
    mut telemetry: ResMut<DispatchTelemetry>,
    mut fleet: ResMut<ControllerFleet>,
) {
    for controller in fleet.iter_mut() {
        let mut ctx = ControllerContext {
            tick: clock.tick(),
            now_ms: clock.now_ms(),
            route: route.service(),
            bus: &mut bus,
            fleet: &snapshot.0,
            telemetry: &mut telemetry,
        };
        controller.on_tick(&mut ctx);
    }
}
