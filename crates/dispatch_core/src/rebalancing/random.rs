use std::collections::VecDeque;

use h3o::CellIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::ids::DriverId;

use super::{RebalanceMove, Rebalancer};

/// Sends idle drivers toward a randomly chosen recent pickup.
#[derive(Debug)]
pub struct RandomRebalancer {
    rng: StdRng,
    probability: f64,
    history_ms: u64,
    recent: VecDeque<(u64, CellIndex)>,
}

impl RandomRebalancer {
    pub fn new(seed: u64, probability: f64, history_ms: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            probability: probability.clamp(0.0, 1.0),
            history_ms,
            recent: VecDeque::new(),
        }
    }

    fn forget_before(&mut self, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.history_ms);
        while self.recent.front().is_some_and(|(at, _)| *at < cutoff) {
            self.recent.pop_front();
        }
    }
}

impl Rebalancer for RandomRebalancer {
    fn name(&self) -> &'static str {
        "random"
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
        let targets: Vec<CellIndex> = unmatched_pickups
            .iter()
            .copied()
            .chain(self.recent.iter().map(|(_, cell)| *cell))
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }
        let mut moves = Vec::new();
        for &(driver, location) in idle {
            if !self.rng.gen_bool(self.probability) {
                continue;
            }
            if let Some(&target) = targets.choose(&mut self.rng) {
                if target != location {
                    moves.push(RebalanceMove { driver, target });
                }
            }
        }
        moves
    }
}
