//! Run a synthetic dispatch scenario and log the telemetry summary.
//!
//! Run with: cargo run -p dispatch_runner -- --drivers 50 --requests 300

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use bevy_ecs::prelude::World;
use clap::Parser;
use dispatch_core::controller::ControllerFleet;
use dispatch_core::ids::ControllerId;
use dispatch_core::runner::{on_driver_subscribe, run_ticks_with_hook, simulation_schedule};
use dispatch_core::scenario::{
    build_world, schedule_requests, DispatchConfig, SyntheticParams, SyntheticScenario,
};
use dispatch_core::telemetry::DispatchTelemetry;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dispatch_runner",
    about = "Run a synthetic mobility-on-demand dispatch scenario"
)]
struct Cli {
    /// JSON dispatch config; built-in defaults when omitted
    #[arg(long, env = "DISPATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Ticks to simulate
    #[arg(long, default_value_t = 3_600)]
    ticks: u64,
    /// Number of drivers to spawn
    #[arg(long, default_value_t = 50)]
    drivers: usize,
    /// Number of trip requests to issue
    #[arg(long, default_value_t = 300)]
    requests: usize,
    /// Minutes over which requests are issued
    #[arg(long, default_value_t = 60)]
    window_mins: u64,
    /// Overrides the seed from the config
    #[arg(long)]
    seed: Option<u64>,
    /// Ticks between progress lines
    #[arg(long, default_value_t = 600)]
    progress_every: u64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<DispatchConfig, Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => DispatchConfig::from_path(path)?,
        None => DispatchConfig::default(),
    };
    Ok(match cli.seed {
        Some(seed) => config.with_seed(seed),
        None => config,
    })
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config(cli)?;
    let mut world = build_world(&config);

    let controllers: Vec<ControllerId> = config.controllers.iter().map(|c| c.id).collect();
    let params = SyntheticParams::default()
        .with_seed(config.seed)
        .with_counts(cli.drivers, cli.requests)
        .with_request_window_mins(cli.window_mins);
    let scenario = SyntheticScenario::generate(&params, &controllers);
    info!(
        drivers = scenario.drivers.len(),
        requests = scenario.demand.len(),
        controllers = controllers.len(),
        ticks = cli.ticks,
        seed = config.seed,
        "scenario generated"
    );
    for spawn in scenario.drivers {
        on_driver_subscribe(&mut world, spawn)?;
    }
    schedule_requests(&mut world, scenario.demand);

    let mut schedule = simulation_schedule();
    let every = cli.progress_every.max(1);
    run_ticks_with_hook(&mut world, &mut schedule, cli.ticks, |world, tick| {
        if tick % every == 0 {
            log_progress(world, tick);
        }
    });

    let summary = world.resource::<DispatchTelemetry>().summary();
    let summary = serde_json::to_string(&summary)?;
    info!(%summary, "run finished");
    Ok(())
}

fn log_progress(world: &World, tick: u64) {
    let fleet = world.resource::<ControllerFleet>();
    let queued: usize = fleet.iter().map(|c| c.queue().len()).sum();
    let busy: usize = fleet.iter().map(|c| c.registry().busy_len()).sum();
    let available: usize = fleet.iter().map(|c| c.registry().available_len()).sum();
    let telemetry = world.resource::<DispatchTelemetry>();
    info!(
        tick,
        queued,
        busy,
        available,
        completed = telemetry.completed_trips.len(),
        expired = telemetry.expired.len(),
        "progress"
    );
}
