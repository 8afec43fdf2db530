pub mod clock;
pub mod controller;
pub mod driver;
pub mod ecs;
pub mod error;
pub mod feasibility;
pub mod ids;
pub mod matching;
pub mod message;
pub mod rebalancing;
pub mod registry;
pub mod routing;
pub mod runner;
pub mod scenario;
pub mod schedule;
pub mod spatial;
pub mod systems;
pub mod telemetry;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
