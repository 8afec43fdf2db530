//! Incremental insertion into running schedules.
//!
//! Shareable requests are first offered to busy drivers already serving a
//! shareable schedule; the driver whose schedule grows by the least travel
//! time takes the request. Whatever is left (including every single-rider
//! request) is matched greedily to available drivers.

use std::collections::{BTreeMap, BTreeSet};

use crate::feasibility::FeasibilityEvaluator;
use crate::ids::{DriverId, RequestId};
use crate::registry::{DriverRecord, DriverRegistry, RequestQueue};
use crate::schedule::Schedule;

use super::common::MatchingParams;
use super::greedy::assign_greedily;
use super::strategy::MatchingStrategy;
use super::types::Assignment;

#[derive(Debug, Clone)]
pub struct IncrementalMatching {
    params: MatchingParams,
    append_parking: bool,
}

impl IncrementalMatching {
    pub fn new(params: MatchingParams) -> Self {
        Self {
            params,
            append_parking: false,
        }
    }

    /// Close fresh schedules with a PARK at the nearest facility.
    pub fn with_parking(mut self) -> Self {
        self.append_parking = true;
        self
    }
}

struct Grown {
    schedule: Schedule,
    added: Vec<RequestId>,
}

impl MatchingStrategy for IncrementalMatching {
    fn name(&self) -> &'static str {
        "incremental"
    }

    fn compute_assignments(
        &self,
        queue: &RequestQueue,
        registry: &DriverRegistry,
        evaluator: &FeasibilityEvaluator<'_>,
    ) -> Vec<Assignment> {
        let mut grown: BTreeMap<DriverId, Grown> = BTreeMap::new();
        let mut matched: BTreeSet<RequestId> = BTreeSet::new();

        for request in queue.iter().filter(|r| r.shareable) {
            let mut best: Option<(DriverId, Schedule, f64)> = None;
            for driver in registry.eligible_busy() {
                let current = grown
                    .get(&driver.id)
                    .map_or(&driver.schedule, |g| &g.schedule);
                if !current.is_shareable()
                    || current.passenger_count() >= self.params.occupancy_limit(driver)
                {
                    continue;
                }
                let limits = self.params.limits_for(driver);
                let Ok(base_cost) = evaluator.evaluate(driver.location, current, &limits) else {
                    continue;
                };
                let Some((schedule, cost)) = evaluator.compute_optimal_insertion(
                    driver.location,
                    current,
                    std::slice::from_ref(request),
                    &limits,
                    true,
                ) else {
                    continue;
                };
                if schedule.len() <= current.len() {
                    continue;
                }
                let marginal = cost - base_cost;
                if best.as_ref().map_or(true, |(_, _, b)| marginal < *b) {
                    best = Some((driver.id, schedule, marginal));
                }
            }
            if let Some((driver, schedule, _)) = best {
                let entry = grown.entry(driver).or_insert_with(|| Grown {
                    schedule: Schedule::new(),
                    added: Vec::new(),
                });
                entry.schedule = schedule;
                entry.added.push(request.id);
                matched.insert(request.id);
            }
        }

        let mut assignments: Vec<Assignment> = grown
            .into_iter()
            .map(|(driver, g)| Assignment::update(driver, g.schedule, g.added))
            .collect();

        let candidates: Vec<&DriverRecord> = registry.eligible_available().collect();
        assignments.extend(assign_greedily(
            queue.iter().filter(|r| !matched.contains(&r.id)),
            &candidates,
            evaluator,
            &self.params,
            self.append_parking,
        ));
        assignments
    }
}
