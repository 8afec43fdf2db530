//! Feasibility and cost of candidate schedules.
//!
//! [`FeasibilityEvaluator::evaluate`] walks a schedule from a start cell and
//! returns the predicted vehicle travel time, or the first constraint it
//! breaks. [`FeasibilityEvaluator::compute_optimal_insertion`] searches the
//! orderings of a schedule extended with new requests.
//!
//! Both functions are pure: the route service is only read and nothing is
//! cached between calls, so the same inputs always give the same answer.

use std::collections::BTreeSet;

use h3o::CellIndex;
use thiserror::Error;

use crate::ids::RequestId;
use crate::routing::RouteService;
use crate::schedule::{Schedule, ScheduleError, ScheduleItem, TripRequest};

/// Extra delay every rider accepts once the vehicle is shared.
pub const DEFAULT_SHARING_ALLOWANCE_SECS: f64 = 150.0;

/// Constraint thresholds applied to every request in a schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationLimits {
    pub ride_delay_secs: f64,
    pub wait_secs: f64,
    pub capacity: usize,
}

impl EvaluationLimits {
    pub fn new(wait_secs: f64, ride_delay_secs: f64, capacity: usize) -> Self {
        Self {
            ride_delay_secs,
            wait_secs,
            capacity,
        }
    }

    pub fn with_capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }
}

/// Why a schedule cannot be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Infeasibility {
    #[error("schedule is malformed")]
    Malformed,
    #[error("no route between consecutive stops")]
    NoRoute,
    #[error("{0} would wait longer than allowed")]
    WaitExceeded(RequestId),
    #[error("{0} would exceed its ride delay")]
    RideDelayExceeded(RequestId),
    #[error("vehicle capacity exceeded")]
    CapacityExceeded,
}

impl From<ScheduleError> for Infeasibility {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::CapacityExceeded { .. } => Self::CapacityExceeded,
            _ => Self::Malformed,
        }
    }
}

/// Position of the vehicle while walking a schedule.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    location: CellIndex,
    elapsed_secs: f64,
    aboard: usize,
}

pub struct FeasibilityEvaluator<'a> {
    route: &'a dyn RouteService,
    now_ms: u64,
    sharing_allowance_secs: f64,
}

impl<'a> FeasibilityEvaluator<'a> {
    pub fn new(route: &'a dyn RouteService, now_ms: u64) -> Self {
        Self {
            route,
            now_ms,
            sharing_allowance_secs: DEFAULT_SHARING_ALLOWANCE_SECS,
        }
    }

    pub fn with_sharing_allowance_secs(mut self, secs: f64) -> Self {
        self.sharing_allowance_secs = secs;
        self
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn route(&self) -> &dyn RouteService {
        self.route
    }

    fn now_secs(&self) -> f64 {
        self.now_ms as f64 / 1000.0
    }

    /// Travel time departing now.
    pub fn travel_time_secs(&self, from: CellIndex, to: CellIndex) -> Option<f64> {
        self.route.travel_time_secs(from, to, self.now_ms)
    }

    fn leg_secs(&self, from: CellIndex, to: CellIndex, elapsed_secs: f64) -> Option<f64> {
        let depart_ms = self.now_ms + (elapsed_secs.max(0.0) * 1000.0) as u64;
        self.route.travel_time_secs(from, to, depart_ms)
    }

    fn advance(
        &self,
        cursor: Cursor,
        item: &ScheduleItem,
        shared: bool,
        limits: &EvaluationLimits,
    ) -> Result<Cursor, Infeasibility> {
        let request = match item {
            ScheduleItem::Pickup(request) | ScheduleItem::Dropoff(request) => request,
            // Terminal items add neither time nor constraints.
            ScheduleItem::Cruise(_) | ScheduleItem::Park(_) => return Ok(cursor),
        };
        let target = item.location();
        let leg = self
            .leg_secs(cursor.location, target, cursor.elapsed_secs)
            .ok_or(Infeasibility::NoRoute)?;
        let elapsed_secs = cursor.elapsed_secs + leg;
        let since_issued = self.now_secs() + elapsed_secs - request.issued_at_secs();

        let aboard = match item {
            ScheduleItem::Pickup(_) => {
                if since_issued > limits.wait_secs {
                    return Err(Infeasibility::WaitExceeded(request.id));
                }
                let aboard = cursor.aboard + 1;
                if aboard > limits.capacity {
                    return Err(Infeasibility::CapacityExceeded);
                }
                aboard
            }
            _ => {
                let direct = self
                    .travel_time_secs(request.pickup, request.dropoff)
                    .ok_or(Infeasibility::NoRoute)?;
                if since_issued > direct + self.tolerance_secs(request, shared, limits) {
                    return Err(Infeasibility::RideDelayExceeded(request.id));
                }
                cursor.aboard.saturating_sub(1)
            }
        };

        Ok(Cursor {
            location: target,
            elapsed_secs,
            aboard,
        })
    }

    fn tolerance_secs(&self, request: &TripRequest, shared: bool, limits: &EvaluationLimits) -> f64 {
        let base = limits.ride_delay_secs.min(request.extra_trip_time_secs);
        if shared {
            base + self.sharing_allowance_secs
        } else {
            base
        }
    }

    /// Predicted vehicle travel time for `schedule` starting at `start`.
    pub fn evaluate(
        &self,
        start: CellIndex,
        schedule: &Schedule,
        limits: &EvaluationLimits,
    ) -> Result<f64, Infeasibility> {
        if schedule.is_empty() {
            return Err(Infeasibility::Malformed);
        }
        schedule.validate(limits.capacity)?;

        let shared = schedule.passenger_count() > 1;
        let mut cursor = Cursor {
            location: start,
            elapsed_secs: 0.0,
            aboard: initially_aboard(schedule.items()),
        };
        for item in schedule {
            cursor = self.advance(cursor, item, shared, limits)?;
        }
        Ok(cursor.elapsed_secs)
    }

    /// Cheapest feasible ordering of `base` extended with pickup and dropoff
    /// items for every request in `group`.
    ///
    /// Orderings are enumerated depth first, trying items in insertion order
    /// (base items first, then each group request's pickup and dropoff).
    /// With `require_optimal` the minimum-cost ordering is returned and ties
    /// keep the first one found; otherwise the first feasible ordering wins.
    /// A terminal item of `base` is kept at the end.
    pub fn compute_optimal_insertion(
        &self,
        start: CellIndex,
        base: &Schedule,
        group: &[TripRequest],
        limits: &EvaluationLimits,
        require_optimal: bool,
    ) -> Option<(Schedule, f64)> {
        let base_ids: BTreeSet<RequestId> = base.request_ids().into_iter().collect();
        let mut group_ids = BTreeSet::new();
        if group
            .iter()
            .any(|r| base_ids.contains(&r.id) || !group_ids.insert(r.id))
        {
            return None;
        }

        let mut items: Vec<ScheduleItem> = base
            .iter()
            .filter(|item| !item.is_terminal())
            .cloned()
            .collect();
        for request in group {
            items.push(ScheduleItem::Pickup(request.clone()));
            items.push(ScheduleItem::Dropoff(request.clone()));
        }
        if items.is_empty() {
            return None;
        }

        // Capacity depends on the ordering and is checked during the search.
        let candidate: Schedule = items.iter().cloned().collect();
        candidate.validate(usize::MAX).ok()?;

        let mut search = InsertionSearch {
            evaluator: self,
            limits,
            shared: candidate.passenger_count() > 1,
            requires: pickup_prerequisites(&items),
            items: &items,
            placed: vec![false; items.len()],
            order: Vec::with_capacity(items.len()),
            best: None,
            require_optimal,
        };
        let cursor = Cursor {
            location: start,
            elapsed_secs: 0.0,
            aboard: initially_aboard(&items),
        };
        if cursor.aboard > limits.capacity {
            return None;
        }
        search.explore(cursor);

        let (order, cost) = search.best?;
        let mut schedule: Schedule = order.into_iter().map(|i| items[i].clone()).collect();
        if let Some(terminal) = base.terminal() {
            schedule.push(terminal.clone());
        }
        Some((schedule, cost))
    }
}

/// DROPOFF items whose PICKUP is not part of the list.
fn initially_aboard(items: &[ScheduleItem]) -> usize {
    let pickups: BTreeSet<RequestId> = items
        .iter()
        .filter_map(|item| match item {
            ScheduleItem::Pickup(request) => Some(request.id),
            _ => None,
        })
        .collect();
    items
        .iter()
        .filter(|item| match item {
            ScheduleItem::Dropoff(request) => !pickups.contains(&request.id),
            _ => false,
        })
        .count()
}

/// For each item, the index of the item that must be placed before it.
fn pickup_prerequisites(items: &[ScheduleItem]) -> Vec<Option<usize>> {
    items
        .iter()
        .map(|item| match item {
            ScheduleItem::Dropoff(request) => items.iter().position(|other| {
                matches!(other, ScheduleItem::Pickup(p) if p.id == request.id)
            }),
            _ => None,
        })
        .collect()
}

struct InsertionSearch<'s, 'a> {
    evaluator: &'s FeasibilityEvaluator<'a>,
    limits: &'s EvaluationLimits,
    shared: bool,
    requires: Vec<Option<usize>>,
    items: &'s [ScheduleItem],
    placed: Vec<bool>,
    order: Vec<usize>,
    best: Option<(Vec<usize>, f64)>,
    require_optimal: bool,
}

impl InsertionSearch<'_, '_> {
    fn done(&self) -> bool {
        !self.require_optimal && self.best.is_some()
    }

    fn explore(&mut self, cursor: Cursor) {
        if self.order.len() == self.items.len() {
            let improves = self
                .best
                .as_ref()
                .map_or(true, |(_, best)| cursor.elapsed_secs < *best);
            if improves {
                self.best = Some((self.order.clone(), cursor.elapsed_secs));
            }
            return;
        }

        for index in 0..self.items.len() {
            if self.done() {
                return;
            }
            if self.placed[index] {
                continue;
            }
            if let Some(prerequisite) = self.requires[index] {
                if !self.placed[prerequisite] {
                    continue;
                }
            }
            let Ok(next) =
                self.evaluator
                    .advance(cursor, &self.items[index], self.shared, self.limits)
            else {
                continue;
            };
            // Travel times are non-negative, so a prefix already at the best
            // cost cannot lead to a strictly cheaper ordering.
            if let Some((_, best)) = &self.best {
                if next.elapsed_secs >= *best {
                    continue;
                }
            }
            self.placed[index] = true;
            self.order.push(index);
            self.explore(next);
            self.order.pop();
            self.placed[index] = false;
        }
    }
}
