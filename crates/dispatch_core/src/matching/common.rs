use h3o::CellIndex;

use crate::feasibility::{EvaluationLimits, FeasibilityEvaluator};
use crate::registry::DriverRecord;
use crate::schedule::{ParkingFacility, Schedule, ScheduleItem};
use crate::spatial::distance_km_between_cells;

/// Thresholds shared by every strategy, taken from the controller config.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingParams {
    pub max_waiting_secs: f64,
    pub ride_delay_secs: f64,
    /// Upper bound on riders per vehicle regardless of its capacity.
    pub max_aggregated_requests: usize,
    /// Proximity strategy: how far a dropoff may lie from the schedule's
    /// dropoff centroid, in seconds of travel.
    pub tolerated_extra_time_secs: f64,
    pub parking: Vec<ParkingFacility>,
}

impl Default for MatchingParams {
    fn default() -> Self {
        Self {
            max_waiting_secs: 600.0,
            ride_delay_secs: 1_800.0,
            max_aggregated_requests: 4,
            tolerated_extra_time_secs: 150.0,
            parking: Vec::new(),
        }
    }
}

impl MatchingParams {
    pub fn limits_for(&self, driver: &DriverRecord) -> EvaluationLimits {
        EvaluationLimits::new(self.max_waiting_secs, self.ride_delay_secs, driver.capacity)
    }

    /// Riders a driver may carry at once.
    pub fn occupancy_limit(&self, driver: &DriverRecord) -> usize {
        driver.capacity.min(self.max_aggregated_requests)
    }
}

pub fn nearest_parking(parking: &[ParkingFacility], location: CellIndex) -> Option<&ParkingFacility> {
    let mut best: Option<(&ParkingFacility, f64)> = None;
    for facility in parking {
        let distance = distance_km_between_cells(location, facility.location);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((facility, distance));
        }
    }
    best.map(|(facility, _)| facility)
}

/// Close the schedule with a PARK at the facility nearest its last stop.
pub(crate) fn append_nearest_parking(schedule: &mut Schedule, parking: &[ParkingFacility]) {
    if schedule.terminal_index().is_some() {
        return;
    }
    let Some(last) = schedule.last().map(ScheduleItem::location) else {
        return;
    };
    if let Some(facility) = nearest_parking(parking, last) {
        schedule.push(ScheduleItem::Park(*facility));
    }
}

/// The candidate closest to `target` (straight line) that can serve
/// `schedule` from where it stands. Earlier candidates win ties.
pub(crate) fn closest_feasible_driver<'r>(
    candidates: impl IntoIterator<Item = &'r DriverRecord>,
    target: CellIndex,
    schedule: &Schedule,
    evaluator: &FeasibilityEvaluator<'_>,
    params: &MatchingParams,
) -> Option<&'r DriverRecord> {
    let mut best: Option<(&DriverRecord, f64)> = None;
    for driver in candidates {
        if evaluator
            .evaluate(driver.location, schedule, &params.limits_for(driver))
            .is_err()
        {
            continue;
        }
        let distance = distance_km_between_cells(driver.location, target);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((driver, distance));
        }
    }
    best.map(|(driver, _)| driver)
}
