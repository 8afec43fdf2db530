//! Moving idle vehicles toward demand.
//!
//! A controller runs its rebalancer after each matching pass, over the drivers
//! still idle and the pickups still unmatched. Moves are sent to drivers as a
//! one-item CRUISE proposition; the driver stays available meanwhile.

mod optimized;
mod random;

use h3o::{CellIndex, Resolution};
use serde::{Deserialize, Serialize};

use crate::ids::DriverId;

pub use optimized::OptimizedRebalancer;
pub use random::RandomRebalancer;

/// Send `driver` cruising toward `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalanceMove {
    pub driver: DriverId,
    pub target: CellIndex,
}

pub trait Rebalancer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called for every request the controller receives.
    fn on_request_received(&mut self, _pickup: CellIndex, _now_ms: u64) {}

    fn rebalance(
        &mut self,
        idle: &[(DriverId, CellIndex)],
        unmatched_pickups: &[CellIndex],
        now_ms: u64,
    ) -> Vec<RebalanceMove>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRebalancer;

impl Rebalancer for NoOpRebalancer {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn rebalance(
        &mut self,
        _idle: &[(DriverId, CellIndex)],
        _unmatched_pickups: &[CellIndex],
        _now_ms: u64,
    ) -> Vec<RebalanceMove> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RebalancerKind {
    #[default]
    NoOp,
    Random {
        /// Chance that an idle driver is moved on a given pass.
        probability: f64,
        /// How long received pickups stay in the demand history.
        history_ms: u64,
    },
    Optimized {
        /// H3 resolution of the zones demand and supply are counted in.
        zone_resolution: u8,
        history_ms: u64,
        /// Largest vehicles-by-zones problem attempted.
        max_problem_size: usize,
        solver_timeout_ms: u64,
    },
}

pub fn build_rebalancer(kind: &RebalancerKind, seed: u64) -> Box<dyn Rebalancer> {
    match *kind {
        RebalancerKind::NoOp => Box::new(NoOpRebalancer),
        RebalancerKind::Random {
            probability,
            history_ms,
        } => Box::new(RandomRebalancer::new(seed, probability, history_ms)),
        RebalancerKind::Optimized {
            zone_resolution,
            history_ms,
            max_problem_size,
            solver_timeout_ms,
        } => Box::new(OptimizedRebalancer::new(
            Resolution::try_from(zone_resolution).unwrap_or(Resolution::Seven),
            history_ms,
            max_problem_size,
            std::time::Duration::from_millis(solver_timeout_ms),
        )),
    }
}
