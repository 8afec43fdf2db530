//! Synthetic fleet and demand: random positions inside a bounding box and
//! request times spread uniformly over a window.

use h3o::{CellIndex, LatLng, Resolution};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::ids::{ControllerId, DriverId, RequestId, RiderId};
use crate::schedule::TripRequest;
use crate::spatial::grid_disk_cached;

use super::build::{DriverSpawn, PendingTripRequest};

/// Default bounding box: San Francisco Bay Area (approx).
const DEFAULT_LAT_MIN: f64 = 37.6;
const DEFAULT_LAT_MAX: f64 = 37.85;
const DEFAULT_LNG_MIN: f64 = -122.55;
const DEFAULT_LNG_MAX: f64 = -122.35;

/// Default time window for requests: 1 hour (simulation ms).
const DEFAULT_REQUEST_WINDOW_MS: u64 = 60 * 60 * 1000;

const MAX_SAMPLING_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticParams {
    pub num_drivers: usize,
    pub num_requests: usize,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
    /// Requests are issued uniformly in `[0, request_window_ms]`.
    pub request_window_ms: u64,
    /// Trip length in H3 cells: min..=max.
    pub min_trip_cells: u32,
    pub max_trip_cells: u32,
    /// Share of requests that accept a shared ride.
    pub shareable_fraction: f64,
    pub seed: u64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            num_drivers: 50,
            num_requests: 300,
            lat_min: DEFAULT_LAT_MIN,
            lat_max: DEFAULT_LAT_MAX,
            lng_min: DEFAULT_LNG_MIN,
            lng_max: DEFAULT_LNG_MAX,
            request_window_ms: DEFAULT_REQUEST_WINDOW_MS,
            min_trip_cells: 5,
            max_trip_cells: 30,
            shareable_fraction: 0.5,
            seed: 0,
        }
    }
}

impl SyntheticParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_counts(mut self, drivers: usize, requests: usize) -> Self {
        self.num_drivers = drivers;
        self.num_requests = requests;
        self
    }

    /// Set the request time window in minutes.
    pub fn with_request_window_mins(mut self, mins: u64) -> Self {
        self.request_window_ms = mins * 60 * 1000;
        self
    }

    pub fn with_trip_cells(mut self, min_cells: u32, max_cells: u32) -> Self {
        self.min_trip_cells = min_cells;
        self.max_trip_cells = max_cells;
        self
    }

    pub fn with_shareable_fraction(mut self, fraction: f64) -> Self {
        self.shareable_fraction = fraction;
        self
    }
}

/// A generated fleet and the requests it will be asked to serve.
#[derive(Debug, Clone, Default)]
pub struct SyntheticScenario {
    pub drivers: Vec<DriverSpawn>,
    /// Ordered by due time; request ids follow that order.
    pub demand: Vec<PendingTripRequest>,
}

impl SyntheticScenario {
    /// Requests are spread round-robin over `controllers`; drivers subscribe
    /// to all of them.
    pub fn generate(params: &SyntheticParams, controllers: &[ControllerId]) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let drivers = (0..params.num_drivers)
            .filter_map(|index| {
                let id = u32::try_from(index).ok()?;
                let location = random_cell_in_bounds(&mut rng, params)?;
                Some(DriverSpawn::new(DriverId(id), location))
            })
            .collect();

        let mut due_times: Vec<u64> = (0..params.num_requests)
            .map(|_| rng.gen_range(0..=params.request_window_ms))
            .collect();
        due_times.sort_unstable();

        let demand = if controllers.is_empty() {
            Vec::new()
        } else {
            due_times
                .into_iter()
                .enumerate()
                .filter_map(|(index, due_ms)| {
                    let pickup = random_cell_in_bounds(&mut rng, params)?;
                    let dropoff = random_destination(
                        &mut rng,
                        pickup,
                        params.min_trip_cells,
                        params.max_trip_cells,
                    );
                    let id = index as u64;
                    let request = TripRequest::new(RequestId(id), RiderId(id), due_ms, pickup, dropoff)
                        .with_shareable(rng.gen_bool(params.shareable_fraction.clamp(0.0, 1.0)));
                    Some(PendingTripRequest {
                        due_ms,
                        controller: controllers[index % controllers.len()],
                        request,
                    })
                })
                .collect()
        };

        Self { drivers, demand }
    }
}

/// A resolution-9 cell uniformly sampled from the bounding box; `None` when
/// the box holds invalid coordinates.
pub fn random_cell_in_bounds<R: Rng>(rng: &mut R, params: &SyntheticParams) -> Option<CellIndex> {
    let lat = rng.gen_range(params.lat_min..=params.lat_max);
    let lng = rng.gen_range(params.lng_min..=params.lng_max);
    LatLng::new(lat, lng)
        .ok()
        .map(|point| point.to_cell(Resolution::Nine))
}

/// A cell between `min_cells` and `max_cells` grid steps away from `pickup`.
/// Falls back to any other cell of the disk, then to `pickup` itself.
pub fn random_destination<R: Rng>(rng: &mut R, pickup: CellIndex, min_cells: u32, max_cells: u32) -> CellIndex {
    let max_cells = max_cells.max(min_cells).max(1);
    let disk = grid_disk_cached(pickup, max_cells);
    let candidates: Vec<CellIndex> = disk
        .iter()
        .copied()
        .filter(|cell| {
            pickup
                .grid_distance(*cell)
                .is_ok_and(|d| d >= min_cells as i32 && d <= max_cells as i32 && d > 0)
        })
        .collect();
    if let Some(cell) = candidates.choose(rng) {
        return *cell;
    }
    for _ in 0..MAX_SAMPLING_ATTEMPTS {
        if let Some(cell) = disk.choose(rng) {
            if *cell != pickup {
                return *cell;
            }
        }
    }
    pickup
}
