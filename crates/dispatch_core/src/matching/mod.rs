//! Matching strategies: turn the pending request queue and the driver
//! registry into a set of schedule assignments.
//!
//! Every strategy implements [`MatchingStrategy`] and is owned by a controller
//! as a boxed trait object built from [`MatchingStrategyKind`].

mod common;
pub mod greedy;
pub mod incremental;
mod pairing;
pub mod proximity;
pub mod rtv;
pub mod shared;
pub mod strategy;
pub mod types;

pub use common::{nearest_parking, MatchingParams};
pub use greedy::GreedyMatching;
pub use incremental::IncrementalMatching;
pub use pairing::best_pair_schedule;
pub use proximity::ProximityMatching;
pub use rtv::RtvGreedyMatching;
pub use shared::SharedMatching;
pub use strategy::{build_strategy, MatchingStrategy, MatchingStrategyKind};
pub use types::{Assignment, AssignmentKind};
