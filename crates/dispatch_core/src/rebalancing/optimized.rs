//! Zone-level rebalancing as a transportation problem.
//!
//! Demand and idle supply are counted per H3 zone. Every idle vehicle in a
//! zone with more vehicles than demand can move to any zone with more demand
//! than vehicles, at a cost equal to the travel distance. With unit supplies
//! and demands the transportation LP has an integral optimum, which is the
//! minimum-cost assignment of surplus vehicles to deficit slots, so it is
//! solved with the Kuhn-Munkres algorithm.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use h3o::{CellIndex, Resolution};
use pathfinding::kuhn_munkres::{kuhn_munkres, Weights};
use tracing::{debug, warn};

use crate::ids::DriverId;
use crate::spatial::distance_km_between_cells;

use super::{RebalanceMove, Rebalancer};

/// Scale factor from kilometres to integer weights.
const SCALE: f64 = 1_000.0;

struct I64Weights(Vec<Vec<i64>>);

impl Weights<i64> for I64Weights {
    fn rows(&self) -> usize {
        self.0.len()
    }

    fn columns(&self) -> usize {
        self.0.first().map_or(0, |row| row.len())
    }

    fn at(&self, row: usize, col: usize) -> i64 {
        self.0[row][col]
    }

    fn neg(&self) -> Self {
        I64Weights(
            self.0
                .iter()
                .map(|row| row.iter().map(|&w| w.saturating_neg()).collect())
                .collect(),
        )
    }
}

#[derive(Debug)]
pub struct OptimizedRebalancer {
    zone_resolution: Resolution,
    history_ms: u64,
    max_problem_size: usize,
    solver_timeout: Duration,
    recent: VecDeque<(u64, CellIndex)>,
}

impl OptimizedRebalancer {
    pub fn new(
        zone_resolution: Resolution,
        history_ms: u64,
        max_problem_size: usize,
        solver_timeout: Duration,
    ) -> Self {
        Self {
            zone_resolution,
            history_ms,
            max_problem_size,
            solver_timeout,
            recent: VecDeque::new(),
        }
    }

    fn zone(&self, cell: CellIndex) -> CellIndex {
        cell.parent(self.zone_resolution).unwrap_or(cell)
    }

    fn forget_before(&mut self, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.history_ms);
        while self.recent.front().is_some_and(|(at, _)| *at < cutoff) {
            self.recent.pop_front();
        }
    }

    /// Deficit slots (one per missing vehicle) and surplus vehicles.
    fn imbalance(
        &self,
        idle: &[(DriverId, CellIndex)],
        unmatched_pickups: &[CellIndex],
    ) -> (Vec<CellIndex>, Vec<(DriverId, CellIndex)>) {
        let mut demand: BTreeMap<CellIndex, usize> = BTreeMap::new();
        for cell in unmatched_pickups
            .iter()
            .chain(self.recent.iter().map(|(_, cell)| cell))
        {
            *demand.entry(self.zone(*cell)).or_default() += 1;
        }
        let mut supply: BTreeMap<CellIndex, Vec<(DriverId, CellIndex)>> = BTreeMap::new();
        for &(driver, location) in idle {
            supply.entry(self.zone(location)).or_default().push((driver, location));
        }

        let mut slots = Vec::new();
        for (zone, wanted) in &demand {
            let present = supply.get(zone).map_or(0, Vec::len);
            for _ in present..*wanted {
                slots.push(*zone);
            }
        }
        let mut vehicles = Vec::new();
        for (zone, drivers) in &supply {
            let wanted = demand.get(zone).copied().unwrap_or(0);
            vehicles.extend(drivers.iter().skip(wanted).copied());
        }
        (slots, vehicles)
    }
}

impl Rebalancer for OptimizedRebalancer {
    fn name(&self) -> &'static str {
        "optimized"
    }

    fn on_request_received(&mut self, pickup: CellIndex, now_ms: u64) {
        self.recent.push_back((now_ms, pickup));
    }

    fn rebalance(
        &mut self,
        idle: &[(DriverId, CellIndex)],
        unmatched_pickups: &[CellIndex],
        now_ms: u64,
    ) -> Vec<RebalanceMove> {
        self.forget_before(now_ms);
        let (slots, vehicles) = self.imbalance(idle, unmatched_pickups);
        if slots.is_empty() || vehicles.is_empty() {
            return Vec::new();
        }
        let size = slots.len() * vehicles.len();
        if size > self.max_problem_size {
            warn!(
                vehicles = vehicles.len(),
                slots = slots.len(),
                max = self.max_problem_size,
                "rebalancing problem too large, skipping"
            );
            return Vec::new();
        }

        let started = Instant::now();
        // Kuhn-Munkres needs rows <= columns.
        let vehicles_are_rows = vehicles.len() <= slots.len();
        let cost = |v: usize, s: usize| {
            -(distance_km_between_cells(vehicles[v].1, slots[s]) * SCALE).round() as i64
        };
        let mut matrix = Vec::new();
        if vehicles_are_rows {
            for v in 0..vehicles.len() {
                matrix.push((0..slots.len()).map(|s| cost(v, s)).collect());
            }
        } else {
            for s in 0..slots.len() {
                matrix.push((0..vehicles.len()).map(|v| cost(v, s)).collect());
            }
        }
        if started.elapsed() > self.solver_timeout {
            warn!(elapsed_ms = started.elapsed().as_millis() as u64, "rebalancing timed out building costs");
            return Vec::new();
        }

        let (_total, assignment) = kuhn_munkres(&I64Weights(matrix));
        if started.elapsed() > self.solver_timeout {
            warn!(elapsed_ms = started.elapsed().as_millis() as u64, "rebalancing solver timed out");
            return Vec::new();
        }

        let moves: Vec<RebalanceMove> = assignment
            .into_iter()
            .enumerate()
            .map(|(row, col)| if vehicles_are_rows { (row, col) } else { (col, row) })
            .map(|(v, s)| {
                let (driver, location) = vehicles[v];
                let target = slots[s]
                    .center_child(location.resolution())
                    .unwrap_or(slots[s]);
                RebalanceMove { driver, target }
            })
            .collect();
        debug!(moves = moves.len(), "rebalancing solved");
        moves
    }
}
