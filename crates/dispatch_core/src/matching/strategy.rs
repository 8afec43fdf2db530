use serde::{Deserialize, Serialize};

use crate::feasibility::FeasibilityEvaluator;
use crate::registry::{DriverRegistry, RequestQueue};

use super::common::MatchingParams;
use super::types::Assignment;
use super::{GreedyMatching, IncrementalMatching, ProximityMatching, RtvGreedyMatching, SharedMatching};

/// A batch matching policy run once per controller pass.
///
/// Implementations only read the queue and the registry. The controller
/// commits the returned assignments, so no request or driver may appear in
/// more than one of them.
pub trait MatchingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn compute_assignments(
        &self,
        queue: &RequestQueue,
        registry: &DriverRegistry,
        evaluator: &FeasibilityEvaluator<'_>,
    ) -> Vec<Assignment>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingStrategyKind {
    /// Nearest feasible available driver per request.
    #[default]
    Greedy,
    /// Greedy followed by a PARK at the nearest facility.
    GreedyAmod,
    /// Pairwise ride-sharing via maximum-cardinality matching.
    Shared,
    /// Request-trip-vehicle graph with greedy assignment.
    RtvGreedy,
    /// Insert shareable requests into busy schedules, then greedy.
    Incremental,
    /// Incremental with a PARK appended to fresh schedules.
    IncrementalAmod,
    /// Dropoff-centroid aggregation heuristic.
    Proximity,
}

pub fn build_strategy(kind: MatchingStrategyKind, params: MatchingParams) -> Box<dyn MatchingStrategy> {
    match kind {
        MatchingStrategyKind::Greedy => Box::new(GreedyMatching::new(params)),
        MatchingStrategyKind::GreedyAmod => Box::new(GreedyMatching::new(params).with_parking()),
        MatchingStrategyKind::Shared => Box::new(SharedMatching::new(params)),
        MatchingStrategyKind::RtvGreedy => Box::new(RtvGreedyMatching::new(params)),
        MatchingStrategyKind::Incremental => Box::new(IncrementalMatching::new(params)),
        MatchingStrategyKind::IncrementalAmod => {
            Box::new(IncrementalMatching::new(params).with_parking())
        }
        MatchingStrategyKind::Proximity => Box::new(ProximityMatching::new(params)),
    }
}
