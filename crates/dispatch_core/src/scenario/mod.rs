//! Scenario setup: configuration, world construction and synthetic
//! fleet/demand generation.

mod build;
mod params;
mod synthetic;

pub use build::{
    build_world, build_world_with_route, schedule_requests, DriverSpawn, FleetSnapshotResource,
    PendingTripRequest, PendingTripRequests,
};
pub use params::{ControllerConfig, DispatchConfig, DriverAgentConfig};
pub use synthetic::{random_cell_in_bounds, random_destination, SyntheticParams, SyntheticScenario};
