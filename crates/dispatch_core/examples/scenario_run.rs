//! Run 300 requests against 50 drivers with the incremental strategy and
//! print the served trips.
//!
//! Run with: cargo run -p dispatch_core --example scenario_run

use dispatch_core::ids::ControllerId;
use dispatch_core::matching::MatchingStrategyKind;
use dispatch_core::runner::{on_driver_subscribe, run_ticks, simulation_schedule};
use dispatch_core::scenario::{
    build_world, schedule_requests, ControllerConfig, DispatchConfig, SyntheticParams,
    SyntheticScenario,
};
use dispatch_core::telemetry::DispatchTelemetry;

fn main() {
    const NUM_REQUESTS: usize = 300;
    const NUM_DRIVERS: usize = 50;
    const SIMULATION_MINS: u64 = 90;

    let controller = ControllerId(0);
    let config = DispatchConfig::default().with_seed(123).with_controllers(vec![
        ControllerConfig::new(controller).with_strategy(MatchingStrategyKind::Incremental),
    ]);
    let mut world = build_world(&config);
    let scenario = SyntheticScenario::generate(
        &SyntheticParams::default()
            .with_seed(123)
            .with_counts(NUM_DRIVERS, NUM_REQUESTS)
            .with_request_window_mins(60)
            .with_trip_cells(5, 30),
        &[controller],
    );
    for spawn in scenario.drivers {
        if let Err(err) = on_driver_subscribe(&mut world, spawn) {
            eprintln!("skipping driver: {err}");
        }
    }
    schedule_requests(&mut world, scenario.demand);

    let mut schedule = simulation_schedule();
    run_ticks(&mut world, &mut schedule, SIMULATION_MINS * 60);

    let telemetry = world.resource::<DispatchTelemetry>();
    let summary = telemetry.summary();
    println!(
        "--- Scenario run ({NUM_REQUESTS} requests, {NUM_DRIVERS} drivers, {SIMULATION_MINS} min, seed 123) ---"
    );
    println!("Assignments: {} ({} shared)", summary.assignments, summary.shared_assignments);
    println!("Completed trips: {}", summary.dropoffs);
    println!("Expired requests: {}", summary.expired_requests);

    const ONE_SEC_MS: u64 = 1000;
    const SAMPLE: usize = 20;
    for (i, trip) in telemetry.completed_trips.iter().take(SAMPLE).enumerate() {
        println!(
            "  {}  {} {}  time_to_pickup={} s  ride={} s",
            i + 1,
            trip.request,
            trip.driver,
            trip.time_to_pickup_ms() / ONE_SEC_MS,
            trip.ride_duration_ms() / ONE_SEC_MS,
        );
    }
    if telemetry.completed_trips.len() > SAMPLE {
        println!("  ... and {} more", telemetry.completed_trips.len() - SAMPLE);
    }
}
