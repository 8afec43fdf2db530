//! Test helpers for common test setup and utilities.
//!
//! This module provides shared fixtures for unit tests, integration tests and
//! benches: fixed H3 cells, request builders, a route service with explicit
//! travel times and a scripted vehicle body.

use std::collections::HashMap;
use std::sync::Arc;

use bevy_ecs::prelude::World;
use h3o::CellIndex;

use crate::driver::VehicleMotion;
use crate::ids::{ControllerId, ParkingId, RequestId, RiderId};
use crate::routing::RouteService;
use crate::scenario::{build_world_with_route, ControllerConfig, DispatchConfig, DriverAgentConfig};
use crate::schedule::{ParkingFacility, TripRequest};

/// A standard test cell used across test files for consistency.
/// This is a valid H3 cell at resolution 9 in the San Francisco Bay Area.
pub const TEST_CELL: u64 = 0x8a1fb46622dffff;

/// Get the test cell as a `CellIndex`.
///
/// # Panics
///
/// Panics if the test cell constant is invalid (should never happen).
pub fn test_cell() -> CellIndex {
    CellIndex::try_from(TEST_CELL).expect("TEST_CELL should be a valid H3 cell")
}

/// Get a neighbor cell of the test cell for testing purposes.
pub fn test_neighbor_cell() -> CellIndex {
    test_cell()
        .grid_disk::<Vec<_>>(1)
        .into_iter()
        .find(|c| *c != test_cell())
        .expect("test cell should have neighbors")
}

/// Get a distant cell from the test cell for testing trip destinations.
pub fn test_distant_cell() -> CellIndex {
    test_cell()
        .grid_disk::<Vec<_>>(2)
        .into_iter()
        .find(|c| *c != test_cell() && *c != test_neighbor_cell())
        .expect("test cell should have distant neighbors")
}

/// `N` distinct cells around the test cell, none equal to it.
///
/// # Panics
///
/// Panics if `N` exceeds the 36 cells within three rings.
pub fn cell_ring<const N: usize>() -> [CellIndex; N] {
    let origin = test_cell();
    let cells: Vec<CellIndex> = origin
        .grid_disk::<Vec<_>>(3)
        .into_iter()
        .filter(|c| *c != origin)
        .collect();
    assert!(N <= cells.len(), "only {} cells available", cells.len());
    std::array::from_fn(|i| cells[i])
}

/// A request issued at time zero.
pub fn request(id: u64, pickup: CellIndex, dropoff: CellIndex) -> TripRequest {
    request_at(id, 0, pickup, dropoff)
}

pub fn request_at(id: u64, issued_at_ms: u64, pickup: CellIndex, dropoff: CellIndex) -> TripRequest {
    TripRequest::new(RequestId(id), RiderId(id), issued_at_ms, pickup, dropoff)
}

pub fn parking(id: u32, location: CellIndex) -> ParkingFacility {
    ParkingFacility {
        id: ParkingId(id),
        location,
    }
}

/// Route service with hand-written travel times.
///
/// Times are symmetric. A pair without an explicit time uses the uniform
/// default if one was given and is unreachable otherwise; a cell always
/// reaches itself in zero seconds. Paths are the two endpoints.
#[derive(Debug, Clone, Default)]
pub struct MatrixRouteService {
    default_secs: Option<f64>,
    times: HashMap<(CellIndex, CellIndex), f64>,
}

impl MatrixRouteService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uniform(secs: f64) -> Self {
        Self {
            default_secs: Some(secs),
            times: HashMap::new(),
        }
    }

    pub fn with_time(mut self, a: CellIndex, b: CellIndex, secs: f64) -> Self {
        self.times.insert(Self::key(a, b), secs);
        self
    }

    fn key(a: CellIndex, b: CellIndex) -> (CellIndex, CellIndex) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl RouteService for MatrixRouteService {
    fn travel_time_secs(&self, from: CellIndex, to: CellIndex, _depart_ms: u64) -> Option<f64> {
        if from == to {
            return Some(0.0);
        }
        self.times
            .get(&Self::key(from, to))
            .copied()
            .or(self.default_secs)
    }

    fn shortest_path(&self, from: CellIndex, to: CellIndex) -> Option<Vec<CellIndex>> {
        if from == to {
            return Some(vec![from]);
        }
        self.travel_time_secs(from, to, 0).map(|_| vec![from, to])
    }
}

/// Vehicle body that only moves when a test says so.
#[derive(Debug, Clone)]
pub struct FakeMotion {
    location: CellIndex,
    path: Vec<CellIndex>,
    destination: Option<CellIndex>,
    paths_started: usize,
    parked_at: Option<ParkingId>,
}

impl FakeMotion {
    pub fn at(location: CellIndex) -> Self {
        Self {
            location,
            path: Vec::new(),
            destination: None,
            paths_started: 0,
            parked_at: None,
        }
    }

    /// Jump to the end of the current path.
    pub fn finish_path(&mut self) {
        if let Some(last) = self.path.last() {
            self.location = *last;
        }
        self.path.clear();
    }

    /// Target of the most recent path.
    pub fn destination(&self) -> Option<CellIndex> {
        self.destination
    }

    pub fn paths_started(&self) -> usize {
        self.paths_started
    }

    pub fn parked_at(&self) -> Option<ParkingId> {
        self.parked_at
    }
}

impl VehicleMotion for FakeMotion {
    fn current_location(&self) -> CellIndex {
        self.location
    }

    fn begin_moving_to(&mut self, path: Vec<CellIndex>) {
        self.destination = path.last().copied();
        self.paths_started += 1;
        self.parked_at = None;
        let here = self.location;
        self.path = path.into_iter().skip_while(|c| *c == here).collect();
    }

    fn park_at(&mut self, facility: &ParkingFacility) {
        self.path.clear();
        self.parked_at = Some(facility.id);
    }

    fn has_arrived(&self) -> bool {
        self.path.is_empty()
    }

    fn halt(&mut self) {
        self.path.clear();
    }
}

/// Config for a world with one controller that schedules every tick and
/// drivers that never wander.
pub fn test_config() -> DispatchConfig {
    DispatchConfig::default()
        .with_controllers(vec![ControllerConfig::new(ControllerId(0)).with_period_ticks(1)])
        .with_driver(DriverAgentConfig {
            cruise_when_idle: false,
            ..DriverAgentConfig::default()
        })
}

/// Create a basic test world with essential resources.
///
/// This is a convenience function for tests that need a minimal world setup.
/// For other layouts, build a config and use `build_world_with_route`.
pub fn create_test_world(route: MatrixRouteService) -> World {
    build_world_with_route(&test_config(), Arc::new(route))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_is_valid() {
        let cell = test_cell();
        assert_eq!(cell, CellIndex::try_from(TEST_CELL).unwrap());
    }

    #[test]
    fn neighbor_and_distant_cells_differ() {
        let cell = test_cell();
        let neighbor = test_neighbor_cell();
        let distant = test_distant_cell();
        assert_ne!(cell, neighbor);
        assert_ne!(cell, distant);
        assert_ne!(neighbor, distant);
    }

    #[test]
    fn cell_ring_is_distinct() {
        let cells = cell_ring::<8>();
        let unique: std::collections::BTreeSet<_> = cells.iter().collect();
        assert_eq!(unique.len(), 8);
        assert!(!cells.contains(&test_cell()));
    }

    #[test]
    fn matrix_times_are_symmetric_and_override_default() {
        let [a, b, c] = cell_ring::<3>();
        let route = MatrixRouteService::uniform(5.0).with_time(a, b, 42.0);
        assert_eq!(route.travel_time_secs(b, a, 0), Some(42.0));
        assert_eq!(route.travel_time_secs(a, c, 0), Some(5.0));
        assert_eq!(route.travel_time_secs(c, c, 0), Some(0.0));
        assert_eq!(MatrixRouteService::new().shortest_path(a, c), None);
    }
}
