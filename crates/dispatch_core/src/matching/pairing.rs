use crate::feasibility::{EvaluationLimits, FeasibilityEvaluator};
use crate::schedule::{Schedule, ScheduleItem, TripRequest};

use super::common::MatchingParams;

#[derive(Clone, Copy)]
enum Stop {
    Pickup(usize),
    Dropoff(usize),
}

/// The four ways to serve two requests with one vehicle.
const INTERLEAVINGS: [[Stop; 4]; 4] = [
    [Stop::Pickup(0), Stop::Pickup(1), Stop::Dropoff(0), Stop::Dropoff(1)],
    [Stop::Pickup(1), Stop::Pickup(0), Stop::Dropoff(1), Stop::Dropoff(0)],
    [Stop::Pickup(0), Stop::Pickup(1), Stop::Dropoff(1), Stop::Dropoff(0)],
    [Stop::Pickup(1), Stop::Pickup(0), Stop::Dropoff(0), Stop::Dropoff(1)],
];

/// Cheapest feasible way to share one vehicle between `first` and `second`,
/// evaluated from the first pickup of each interleaving.
///
/// Returns `None` when either rider declined sharing, when aggregation is
/// capped at one request, or when no interleaving satisfies both riders'
/// constraints. Earlier interleavings win ties.
pub fn best_pair_schedule(
    first: &TripRequest,
    second: &TripRequest,
    evaluator: &FeasibilityEvaluator<'_>,
    params: &MatchingParams,
) -> Option<(Schedule, f64)> {
    if !(first.shareable && second.shareable) || params.max_aggregated_requests < 2 {
        return None;
    }
    let pair = [first, second];
    let limits = EvaluationLimits::new(params.max_waiting_secs, params.ride_delay_secs, 2);
    let mut best: Option<(Schedule, f64)> = None;
    for stops in INTERLEAVINGS {
        let schedule: Schedule = stops
            .iter()
            .map(|stop| match *stop {
                Stop::Pickup(i) => ScheduleItem::Pickup(pair[i].clone()),
                Stop::Dropoff(i) => ScheduleItem::Dropoff(pair[i].clone()),
            })
            .collect();
        let Some(start) = schedule.front().map(ScheduleItem::location) else {
            continue;
        };
        if let Ok(cost) = evaluator.evaluate(start, &schedule, &limits) {
            if best.as_ref().map_or(true, |(_, b)| cost < *b) {
                best = Some((schedule, cost));
            }
        }
    }
    best
}
