use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::SimulationClock;
use crate::message::{ControllerMessage, MessageBus};
use crate::scenario::PendingTripRequests;

/// Release due trip requests to their controllers.
pub fn request_inbound_system(
    clock: Res<SimulationClock>,
    mut pending: ResMut<PendingTripRequests>,
    mut bus: ResMut<MessageBus>,
) {
    for due in pending.take_due(clock.now_ms()) {
        bus.post_to_controller(
            due.controller,
            ControllerMessage::TripRequest(due.request),
            clock.tick(),
        );
    }
}
