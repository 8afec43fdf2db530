//! Request-trip-vehicle matching with greedy assignment.
//!
//! 1. RV graph: request-request edges where two requests can share a vehicle,
//!    request-driver edges where a driver can absorb a request into its
//!    current schedule.
//! 2. RTV graph: per driver, feasible trips of one request or two
//!    RR-connected requests, each with the optimal insertion into the
//!    driver's schedule. For every trip only the cheapest driver is kept.
//! 3. Greedy: trips sorted by size (desc), marginal cost (asc), driver id and
//!    request ids; a trip is committed if its driver and requests are free.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::feasibility::FeasibilityEvaluator;
use crate::ids::{DriverId, RequestId};
use crate::registry::{DriverRecord, DriverRegistry, RequestQueue};
use crate::schedule::{Schedule, TripRequest};

use super::common::MatchingParams;
use super::pairing::best_pair_schedule;
use super::strategy::MatchingStrategy;
use super::types::Assignment;

#[derive(Debug, Clone)]
struct Trip {
    requests: Vec<RequestId>,
    driver: DriverId,
    driver_available: bool,
    schedule: Schedule,
    /// Travel time added on top of the driver's current schedule.
    cost: f64,
}

fn trip_order(a: &Trip, b: &Trip) -> Ordering {
    b.requests
        .len()
        .cmp(&a.requests.len())
        .then(a.cost.total_cmp(&b.cost))
        .then(a.driver.cmp(&b.driver))
        .then(a.requests.cmp(&b.requests))
}

#[derive(Debug, Clone)]
pub struct RtvGreedyMatching {
    params: MatchingParams,
}

impl RtvGreedyMatching {
    pub fn new(params: MatchingParams) -> Self {
        Self { params }
    }

    fn shareable_pairs(
        &self,
        requests: &[&TripRequest],
        evaluator: &FeasibilityEvaluator<'_>,
    ) -> BTreeSet<(usize, usize)> {
        let mut pairs = BTreeSet::new();
        for i in 0..requests.len() {
            for j in (i + 1)..requests.len() {
                if best_pair_schedule(requests[i], requests[j], evaluator, &self.params).is_some() {
                    pairs.insert((i, j));
                }
            }
        }
        pairs
    }

    fn trips_for_driver(
        &self,
        driver: &DriverRecord,
        requests: &[&TripRequest],
        pairs: &BTreeSet<(usize, usize)>,
        evaluator: &FeasibilityEvaluator<'_>,
        out: &mut BTreeMap<Vec<usize>, Trip>,
    ) {
        let limits = self.params.limits_for(driver);
        let base_cost = if driver.schedule.is_empty() {
            0.0
        } else {
            match evaluator.evaluate(driver.location, &driver.schedule, &limits) {
                Ok(cost) => cost,
                // A schedule already running late cannot take more work.
                Err(_) => return,
            }
        };
        let headroom = self
            .params
            .occupancy_limit(driver)
            .saturating_sub(driver.schedule.passenger_count());
        if headroom == 0 {
            return;
        }

        let mut offer = |group: Vec<usize>, schedule: Schedule, cost: f64| {
            let trip = Trip {
                requests: group.iter().map(|&i| requests[i].id).collect(),
                driver: driver.id,
                driver_available: driver.schedule.is_empty(),
                schedule,
                cost: cost - base_cost,
            };
            let better = out.get(&group).map_or(true, |current| trip.cost < current.cost);
            if better {
                out.insert(group, trip);
            }
        };

        let carrying = driver.schedule.passenger_count() > 0;
        let mut reachable = Vec::new();
        for (i, request) in requests.iter().enumerate() {
            if carrying && !(request.shareable && driver.schedule.is_shareable()) {
                continue;
            }
            if let Some((schedule, cost)) = evaluator.compute_optimal_insertion(
                driver.location,
                &driver.schedule,
                &[(*request).clone()],
                &limits,
                true,
            ) {
                reachable.push(i);
                offer(vec![i], schedule, cost);
            }
        }

        if headroom < 2 {
            return;
        }
        for (n, &i) in reachable.iter().enumerate() {
            for &j in &reachable[n + 1..] {
                if !pairs.contains(&(i, j)) {
                    continue;
                }
                if let Some((schedule, cost)) = evaluator.compute_optimal_insertion(
                    driver.location,
                    &driver.schedule,
                    &[requests[i].clone(), requests[j].clone()],
                    &limits,
                    true,
                ) {
                    offer(vec![i, j], schedule, cost);
                }
            }
        }
    }
}

impl MatchingStrategy for RtvGreedyMatching {
    fn name(&self) -> &'static str {
        "rtv_greedy"
    }

    fn compute_assignments(
        &self,
        queue: &RequestQueue,
        registry: &DriverRegistry,
        evaluator: &FeasibilityEvaluator<'_>,
    ) -> Vec<Assignment> {
        let requests: Vec<&TripRequest> = queue.iter().collect();
        if requests.is_empty() {
            return Vec::new();
        }
        let pairs = self.shareable_pairs(&requests, evaluator);

        let mut best_trips: BTreeMap<Vec<usize>, Trip> = BTreeMap::new();
        for driver in registry.eligible() {
            self.trips_for_driver(driver, &requests, &pairs, evaluator, &mut best_trips);
        }

        let mut trips: Vec<Trip> = best_trips.into_values().collect();
        trips.sort_by(trip_order);
        debug!(
            requests = requests.len(),
            rr_edges = pairs.len(),
            trips = trips.len(),
            "rtv graph built"
        );

        let mut used_drivers = BTreeSet::new();
        let mut used_requests = BTreeSet::new();
        let mut assignments = Vec::new();
        for trip in trips {
            if used_drivers.contains(&trip.driver)
                || trip.requests.iter().any(|id| used_requests.contains(id))
            {
                continue;
            }
            used_drivers.insert(trip.driver);
            used_requests.extend(trip.requests.iter().copied());
            assignments.push(if trip.driver_available {
                Assignment::new_schedule(trip.driver, trip.schedule)
            } else {
                Assignment::update(trip.driver, trip.schedule, trip.requests)
            });
        }
        assignments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::AssignmentKind;
    use crate::registry::DriverInfo;
    use crate::test_helpers::{cell_ring, request, MatrixRouteService};

    fn trip(requests: &[u64], driver: u32, cost: f64) -> Trip {
        Trip {
            requests: requests.iter().map(|&id| RequestId(id)).collect(),
            driver: DriverId(driver),
            driver_available: true,
            schedule: Schedule::new(),
            cost,
        }
    }

    #[test]
    fn trips_sort_by_size_then_cost_then_ids() {
        let mut trips = vec![
            trip(&[3], 1, 10.0),
            trip(&[1, 2], 2, 50.0),
            trip(&[2], 1, 10.0),
            trip(&[1, 3], 1, 50.0),
            trip(&[4], 0, 5.0),
        ];
        trips.sort_by(trip_order);
        let order: Vec<(Vec<RequestId>, DriverId)> =
            trips.into_iter().map(|t| (t.requests, t.driver)).collect();
        assert_eq!(
            order,
            vec![
                (vec![RequestId(1), RequestId(3)], DriverId(1)),
                (vec![RequestId(1), RequestId(2)], DriverId(2)),
                (vec![RequestId(4)], DriverId(0)),
                (vec![RequestId(2)], DriverId(1)),
                (vec![RequestId(3)], DriverId(1)),
            ]
        );
    }

    #[test]
    fn prefers_pooling_two_requests_into_one_vehicle() {
        let [a, b, c, d, far] = cell_ring::<5>();
        let route = MatrixRouteService::uniform(20.0)
            .with_time(far, a, 2_000.0)
            .with_time(far, b, 2_000.0)
            .with_time(far, c, 2_000.0)
            .with_time(far, d, 2_000.0);
        let evaluator = FeasibilityEvaluator::new(&route, 0);
        let mut registry = DriverRegistry::new();
        registry
            .subscribe(DriverInfo {
                id: DriverId(1),
                capacity: 4,
                location: a,
            })
            .expect("subscribe");
        registry
            .subscribe(DriverInfo {
                id: DriverId(2),
                capacity: 4,
                location: far,
            })
            .expect("subscribe");
        let mut queue = RequestQueue::new();
        queue.enqueue(request(1, a, b)).expect("enqueue");
        queue.enqueue(request(2, c, d)).expect("enqueue");

        let assignments = RtvGreedyMatching::new(MatchingParams::default())
            .compute_assignments(&queue, &registry, &evaluator);
        assert_eq!(assignments.len(), 1);
        let assignment = &assignments[0];
        assert_eq!(assignment.driver, DriverId(1));
        assert_eq!(assignment.kind, AssignmentKind::New);
        assert_eq!(assignment.schedule.passenger_count(), 2);
        assert!(assignment.schedule.validate(4).is_ok());
    }

    #[test]
    fn busy_drivers_receive_updates() {
        let [a, b, c, d] = cell_ring::<4>();
        let route = MatrixRouteService::uniform(20.0);
        let evaluator = FeasibilityEvaluator::new(&route, 0);
        let mut registry = DriverRegistry::new();
        registry
            .subscribe(DriverInfo {
                id: DriverId(1),
                capacity: 4,
                location: a,
            })
            .expect("subscribe");
        registry
            .mark_busy(DriverId(1), Schedule::solo(&request(1, a, b)))
            .expect("busy");
        let mut queue = RequestQueue::new();
        queue.enqueue(request(2, c, d)).expect("enqueue");

        let assignments = RtvGreedyMatching::new(MatchingParams::default())
            .compute_assignments(&queue, &registry, &evaluator);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].kind, AssignmentKind::Update);
        assert_eq!(assignments[0].new_requests, vec![RequestId(2)]);
        assert_eq!(assignments[0].schedule.len(), 4);
    }
}
