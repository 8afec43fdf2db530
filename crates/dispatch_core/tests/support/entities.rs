#![allow(dead_code)]

use bevy_ecs::prelude::{Entity, World};
use dispatch_core::controller::{ControllerFleet, DispatchController};
use dispatch_core::driver::{MobilityServiceDriver, OnCallDriver};
use dispatch_core::ecs::Position;
use dispatch_core::ids::{DriverId, RequestId};
use dispatch_core::runner::{on_driver_subscribe, on_trip_request_received};
use dispatch_core::scenario::DriverSpawn;
use dispatch_core::schedule::TripRequest;
use dispatch_core::test_helpers::request_at;
use h3o::CellIndex;

use super::world::CONTROLLER;

pub fn spawn_driver(world: &mut World, id: u32, location: CellIndex) -> Entity {
    on_driver_subscribe(world, DriverSpawn::new(DriverId(id), location)).expect("spawn driver")
}

/// Hand a request issued now to the test controller.
pub fn submit_request(world: &mut World, id: u64, pickup: CellIndex, dropoff: CellIndex) -> TripRequest {
    let now_ms = world
        .resource::<dispatch_core::clock::SimulationClock>()
        .now_ms();
    let request = request_at(id, now_ms, pickup, dropoff);
    on_trip_request_received(world, CONTROLLER, request.clone()).expect("known controller");
    request
}

pub fn controller(world: &World) -> &DispatchController {
    world
        .resource::<ControllerFleet>()
        .get(CONTROLLER)
        .expect("test controller")
}

pub fn driver_count(world: &mut World) -> usize {
    world.query::<&OnCallDriver>().iter(world).count()
}

/// Location and passenger count of a live driver.
pub fn driver_state(world: &mut World, id: u32) -> Option<(CellIndex, usize)> {
    world
        .query::<(&OnCallDriver, &Position)>()
        .iter(world)
        .find(|(driver, _)| driver.driver_id() == DriverId(id))
        .map(|(driver, position)| (position.0, driver.passenger_count()))
}

pub fn completed_requests(world: &World) -> Vec<RequestId> {
    world
        .resource::<dispatch_core::telemetry::DispatchTelemetry>()
        .completed_trips
        .iter()
        .map(|trip| trip.request)
        .collect()
}
