//! Proximity aggregation.
//!
//! Round one walks the eligible drivers and appends nearby requests: an idle
//! vehicle takes requests it can reach within the waiting threshold, a busy
//! vehicle takes requests whose dropoff lies close to the centroid of its
//! current dropoffs. Round two hands the oldest leftovers to drivers that are
//! still idle, one request each.
//!
//! No constraint check is run on the aggregated schedules beyond structure
//! and occupancy; the heuristic trades exactness for speed.

use std::collections::BTreeMap;

use crate::feasibility::FeasibilityEvaluator;
use crate::ids::{DriverId, RequestId};
use crate::registry::{DriverRecord, DriverRegistry, RequestQueue};
use crate::schedule::{Schedule, ScheduleItem, TripRequest};

use super::common::MatchingParams;
use super::strategy::MatchingStrategy;
use super::types::Assignment;

#[derive(Debug, Clone)]
pub struct ProximityMatching {
    params: MatchingParams,
}

impl ProximityMatching {
    pub fn new(params: MatchingParams) -> Self {
        Self { params }
    }

    fn accepts(
        &self,
        driver: &DriverRecord,
        schedule: &Schedule,
        request: &TripRequest,
        evaluator: &FeasibilityEvaluator<'_>,
    ) -> bool {
        let within = |from, to, limit: f64| {
            evaluator
                .travel_time_secs(from, to)
                .is_some_and(|secs| secs <= limit)
        };
        match schedule.dropoff_centroid() {
            None => within(driver.location, request.pickup, self.params.max_waiting_secs),
            Some(centroid) => {
                within(driver.location, centroid, self.params.max_waiting_secs)
                    && within(request.dropoff, centroid, self.params.tolerated_extra_time_secs)
            }
        }
    }
}

/// Put the PICKUP before the first existing DROPOFF and the DROPOFF before
/// the terminal item.
fn insert_proximate(schedule: &mut Schedule, request: &TripRequest) {
    let end = schedule.terminal_index().unwrap_or(schedule.len());
    let pickup_at = schedule.first_dropoff_index().unwrap_or(end).min(end);
    schedule.insert(pickup_at, ScheduleItem::Pickup(request.clone()));
    let dropoff_at = schedule.terminal_index().unwrap_or(schedule.len());
    schedule.insert(dropoff_at, ScheduleItem::Dropoff(request.clone()));
}

impl MatchingStrategy for ProximityMatching {
    fn name(&self) -> &'static str {
        "proximity"
    }

    fn compute_assignments(
        &self,
        queue: &RequestQueue,
        registry: &DriverRegistry,
        evaluator: &FeasibilityEvaluator<'_>,
    ) -> Vec<Assignment> {
        let mut remaining: Vec<&TripRequest> = queue.iter().collect();
        let mut grown: BTreeMap<DriverId, (Schedule, Vec<RequestId>, bool)> = BTreeMap::new();
        let mut idle: Vec<DriverId> = Vec::new();

        for driver in registry.eligible() {
            let was_empty = driver.schedule.is_empty();
            let limit = self.params.occupancy_limit(driver);
            let mut schedule = driver.schedule.clone();
            let mut added = Vec::new();
            let mut index = 0;
            while index < remaining.len() && schedule.passenger_count() < limit {
                let request = remaining[index];
                if self.accepts(driver, &schedule, request, evaluator) {
                    insert_proximate(&mut schedule, request);
                    added.push(request.id);
                    remaining.remove(index);
                } else {
                    index += 1;
                }
            }
            if !added.is_empty() {
                grown.insert(driver.id, (schedule, added, was_empty));
            } else if was_empty {
                idle.push(driver.id);
            }
        }

        let mut assignments: Vec<Assignment> = grown
            .into_iter()
            .map(|(driver, (schedule, added, was_empty))| {
                if was_empty {
                    Assignment::new_schedule(driver, schedule)
                } else {
                    Assignment::update(driver, schedule, added)
                }
            })
            .collect();

        remaining.sort_by_key(|request| request.issued_at_ms);
        for (driver, request) in idle.into_iter().zip(remaining) {
            assignments.push(Assignment::new_schedule(driver, Schedule::solo(request)));
        }
        assignments
    }
}
