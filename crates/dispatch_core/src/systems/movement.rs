//! Movement system: advances vehicles cell-by-cell along the paths their
//! driver agents handed over.
//!
//! Each hop costs the route service's travel time between the two cells; time
//! left over at the end of a tick carries into the next one.

use bevy_ecs::prelude::{Query, Res};

use crate::clock::SimulationClock;
use crate::ecs::{Movement, Position};
use crate::routing::RouteServiceResource;

pub fn movement_system(
    clock: Res<SimulationClock>,
    route: Res<RouteServiceResource>,
    mut vehicles: Query<(&mut Position, &mut Movement)>,
) {
    let elapsed_secs = clock.tick_secs();
    let now_ms = clock.now_ms();
    for (mut position, mut movement) in &mut vehicles {
        if movement.path.is_empty() {
            continue;
        }
        movement.advance(&mut position, route.service(), now_ms, elapsed_secs);
    }
}
