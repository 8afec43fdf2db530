use std::collections::VecDeque;

use bevy_ecs::prelude::Component;
use h3o::CellIndex;

use crate::driver::VehicleMotion;
use crate::ids::ParkingId;
use crate::routing::RouteService;
use crate::schedule::ParkingFacility;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Component)]
pub struct Position(pub CellIndex);

/// Cell-stepping movement along a path handed over by the driver agent.
#[derive(Debug, Clone, Default, PartialEq, Component)]
pub struct Movement {
    /// Cells still to enter, next hop first.
    pub path: VecDeque<CellIndex>,
    /// Seconds already spent on the current hop.
    pub hop_progress_secs: f64,
    pub parked_at: Option<ParkingId>,
}

impl Movement {
    /// Spend `elapsed_secs` driving along the path and return the number of
    /// cells entered. An unroutable hop drops the rest of the path so the
    /// driver re-plans.
    pub fn advance(
        &mut self,
        position: &mut Position,
        route: &dyn RouteService,
        now_ms: u64,
        elapsed_secs: f64,
    ) -> usize {
        let mut budget = self.hop_progress_secs + elapsed_secs;
        let mut hops = 0;
        while let Some(&next) = self.path.front() {
            let Some(hop_secs) = route.travel_time_secs(position.0, next, now_ms) else {
                self.path.clear();
                break;
            };
            if budget < hop_secs {
                break;
            }
            budget -= hop_secs;
            position.0 = next;
            self.path.pop_front();
            hops += 1;
        }
        self.hop_progress_secs = if self.path.is_empty() { 0.0 } else { budget };
        hops
    }
}

/// The [`VehicleMotion`] view of one entity's movement components.
pub struct MotionHandle<'a> {
    pub position: &'a mut Position,
    pub movement: &'a mut Movement,
}

impl VehicleMotion for MotionHandle<'_> {
    fn current_location(&self) -> CellIndex {
        self.position.0
    }

    fn begin_moving_to(&mut self, path: Vec<CellIndex>) {
        let here = self.position.0;
        self.movement.path = path.into_iter().skip_while(|cell| *cell == here).collect();
        self.movement.hop_progress_secs = 0.0;
        self.movement.parked_at = None;
    }

    fn park_at(&mut self, facility: &ParkingFacility) {
        self.halt();
        self.movement.parked_at = Some(facility.id);
    }

    fn has_arrived(&self) -> bool {
        self.movement.path.is_empty()
    }

    fn halt(&mut self) {
        self.movement.path.clear();
        self.movement.hop_progress_secs = 0.0;
    }
}
