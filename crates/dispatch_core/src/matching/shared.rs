//! Pairwise ride-sharing.
//!
//! Pending requests are the vertices of a shareability graph; two requests are
//! joined when some interleaving of their stops is feasible for one vehicle.
//! A maximum-cardinality matching on that graph decides which requests ride
//! together, and each resulting schedule goes to the nearest feasible
//! available driver.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::maximum_matching;
use petgraph::graph::{NodeIndex, UnGraph};
use tracing::debug;

use crate::feasibility::FeasibilityEvaluator;
use crate::ids::DriverId;
use crate::registry::{DriverRecord, DriverRegistry, RequestQueue};
use crate::schedule::{Schedule, ScheduleItem, TripRequest};

use super::common::{closest_feasible_driver, MatchingParams};
use super::pairing::best_pair_schedule;
use super::strategy::MatchingStrategy;
use super::types::Assignment;

#[derive(Debug, Clone)]
pub struct SharedMatching {
    params: MatchingParams,
}

impl SharedMatching {
    pub fn new(params: MatchingParams) -> Self {
        Self { params }
    }

    /// Group pending requests into pair and solo schedules, ordered by the
    /// lowest queue position they contain.
    pub fn group_requests(
        &self,
        requests: &[&TripRequest],
        evaluator: &FeasibilityEvaluator<'_>,
    ) -> Vec<Schedule> {
        let mut graph: UnGraph<usize, ()> = UnGraph::with_capacity(requests.len(), 0);
        let nodes: Vec<NodeIndex> = (0..requests.len()).map(|i| graph.add_node(i)).collect();
        let mut pair_schedules: BTreeMap<(usize, usize), Schedule> = BTreeMap::new();

        for i in 0..requests.len() {
            for j in (i + 1)..requests.len() {
                if let Some((schedule, _)) =
                    best_pair_schedule(requests[i], requests[j], evaluator, &self.params)
                {
                    graph.add_edge(nodes[i], nodes[j], ());
                    pair_schedules.insert((i, j), schedule);
                }
            }
        }

        let matching = maximum_matching(&graph);
        debug!(
            requests = requests.len(),
            edges = graph.edge_count(),
            pairs = matching.len(),
            "shareability graph matched"
        );

        let mut schedules = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            match matching.mate(*node).map(NodeIndex::index) {
                Some(j) if i < j => {
                    if let Some(schedule) = pair_schedules.remove(&(i, j)) {
                        schedules.push(schedule);
                    }
                }
                Some(_) => {}
                None => schedules.push(Schedule::solo(requests[i])),
            }
        }
        schedules
    }
}

impl MatchingStrategy for SharedMatching {
    fn name(&self) -> &'static str {
        "shared"
    }

    fn compute_assignments(
        &self,
        queue: &RequestQueue,
        registry: &DriverRegistry,
        evaluator: &FeasibilityEvaluator<'_>,
    ) -> Vec<Assignment> {
        let requests: Vec<&TripRequest> = queue.iter().collect();
        let candidates: Vec<&DriverRecord> = registry.eligible_available().collect();
        let mut taken: BTreeSet<DriverId> = BTreeSet::new();
        let mut assignments = Vec::new();

        for schedule in self.group_requests(&requests, evaluator) {
            let Some(target) = schedule.front().map(ScheduleItem::location) else {
                continue;
            };
            let free = candidates
                .iter()
                .copied()
                .filter(|driver| !taken.contains(&driver.id));
            if let Some(driver) = closest_feasible_driver(free, target, &schedule, evaluator, &self.params) {
                taken.insert(driver.id);
                assignments.push(Assignment::new_schedule(driver.id, schedule));
            }
        }
        assignments
    }
}
