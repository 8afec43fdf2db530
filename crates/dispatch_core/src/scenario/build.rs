use std::collections::VecDeque;
use std::sync::Arc;

use bevy_ecs::prelude::{Resource, World};
use h3o::CellIndex;
use tracing::info;

use crate::clock::SimulationClock;
use crate::controller::{ControllerFleet, DispatchController, FleetSnapshot};
use crate::ids::{ControllerId, DriverId};
use crate::message::MessageBus;
use crate::routing::{build_route_service, RouteService, RouteServiceResource};
use crate::scenario::params::DispatchConfig;
use crate::schedule::TripRequest;
use crate::telemetry::DispatchTelemetry;

/// A driver to put into the world.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverSpawn {
    pub id: DriverId,
    pub location: CellIndex,
    /// Falls back to the configured driver capacity.
    pub capacity: Option<usize>,
    /// Empty means every controller in the world.
    pub controllers: Vec<ControllerId>,
}

impl DriverSpawn {
    pub fn new(id: DriverId, location: CellIndex) -> Self {
        Self {
            id,
            location,
            capacity: None,
            controllers: Vec::new(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_controllers(mut self, controllers: Vec<ControllerId>) -> Self {
        self.controllers = controllers;
        self
    }
}

/// A trip request released to its controller once the clock reaches `due_ms`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTripRequest {
    pub due_ms: u64,
    pub controller: ControllerId,
    pub request: TripRequest,
}

/// Requests not yet released, ordered by due time.
#[derive(Debug, Clone, Default, Resource)]
pub struct PendingTripRequests(pub VecDeque<PendingTripRequest>);

impl PendingTripRequests {
    /// Insert keeping due-time order; equal due times stay in insertion order.
    pub fn push(&mut self, pending: PendingTripRequest) {
        let index = self.0.partition_point(|queued| queued.due_ms <= pending.due_ms);
        self.0.insert(index, pending);
    }

    /// Pop every request due at or before `now_ms`.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<PendingTripRequest> {
        let mut due = Vec::new();
        while self.0.front().is_some_and(|pending| pending.due_ms <= now_ms) {
            if let Some(pending) = self.0.pop_front() {
                due.push(pending);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Latest positions and states of the driver agents, rebuilt every tick.
#[derive(Debug, Clone, Default, Resource)]
pub struct FleetSnapshotResource(pub FleetSnapshot);

/// Build a world with the routing backend named in the config.
pub fn build_world(config: &DispatchConfig) -> World {
    build_world_with_route(config, build_route_service(&config.route))
}

/// Build a world around an existing route service.
pub fn build_world_with_route(config: &DispatchConfig, route: Arc<dyn RouteService>) -> World {
    let mut world = World::new();
    world.insert_resource(SimulationClock::new(config.tick_ms));
    world.insert_resource(MessageBus::new(config.message_latency_ticks));
    world.insert_resource(RouteServiceResource(route));
    world.insert_resource(DispatchTelemetry::default());
    world.insert_resource(PendingTripRequests::default());
    world.insert_resource(FleetSnapshotResource::default());

    let mut fleet = ControllerFleet::new();
    for controller in &config.controllers {
        fleet.insert(DispatchController::new(controller.clone(), config.seed));
    }
    info!(
        controllers = fleet.len(),
        tick_ms = config.tick_ms,
        latency_ticks = config.message_latency_ticks,
        "dispatch world built"
    );
    world.insert_resource(fleet);
    world.insert_resource(config.clone());
    world
}

/// Queue requests for release by the request inbound system.
pub fn schedule_requests(world: &mut World, requests: impl IntoIterator<Item = PendingTripRequest>) {
    let mut pending = world.resource_mut::<PendingTripRequests>();
    for request in requests {
        pending.push(request);
    }
}
