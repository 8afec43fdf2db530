//! Nearest-driver matching: one request per available driver.

use std::collections::BTreeSet;

use crate::feasibility::FeasibilityEvaluator;
use crate::ids::DriverId;
use crate::registry::{DriverRecord, DriverRegistry, RequestQueue};
use crate::schedule::{Schedule, TripRequest};

use super::common::{append_nearest_parking, closest_feasible_driver, MatchingParams};
use super::strategy::MatchingStrategy;
use super::types::Assignment;

/// For each request in queue order, the nearest (straight-line) available
/// driver that can serve `[PICKUP, DROPOFF]` from its position. Requests with
/// no feasible driver stay queued.
#[derive(Debug, Clone)]
pub struct GreedyMatching {
    params: MatchingParams,
    append_parking: bool,
}

impl GreedyMatching {
    pub fn new(params: MatchingParams) -> Self {
        Self {
            params,
            append_parking: false,
        }
    }

    /// Close every schedule with a PARK at the nearest facility.
    pub fn with_parking(mut self) -> Self {
        self.append_parking = true;
        self
    }
}

/// Greedy pass over `requests` using `candidates` in the given order.
pub(crate) fn assign_greedily<'q>(
    requests: impl IntoIterator<Item = &'q TripRequest>,
    candidates: &[&DriverRecord],
    evaluator: &FeasibilityEvaluator<'_>,
    params: &MatchingParams,
    append_parking: bool,
) -> Vec<Assignment> {
    let mut taken: BTreeSet<DriverId> = BTreeSet::new();
    let mut assignments = Vec::new();
    for request in requests {
        let mut schedule = Schedule::solo(request);
        if append_parking {
            append_nearest_parking(&mut schedule, &params.parking);
        }
        let free = candidates
            .iter()
            .copied()
            .filter(|driver| !taken.contains(&driver.id));
        if let Some(driver) = closest_feasible_driver(free, request.pickup, &schedule, evaluator, params) {
            taken.insert(driver.id);
            assignments.push(Assignment::new_schedule(driver.id, schedule));
        }
    }
    assignments
}

impl MatchingStrategy for GreedyMatching {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn compute_assignments(
        &self,
        queue: &RequestQueue,
        registry: &DriverRegistry,
        evaluator: &FeasibilityEvaluator<'_>,
    ) -> Vec<Assignment> {
        let candidates: Vec<&DriverRecord> = registry.eligible_available().collect();
        assign_greedily(
            queue.iter(),
            &candidates,
            evaluator,
            &self.params,
            self.append_parking,
        )
    }
}
