use std::path::Path;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::driver::CruisePolicy;
use crate::error::ConfigError;
use crate::feasibility::DEFAULT_SHARING_ALLOWANCE_SECS;
use crate::ids::ControllerId;
use crate::matching::{MatchingParams, MatchingStrategyKind};
use crate::rebalancing::RebalancerKind;
use crate::routing::RouteServiceKind;
use crate::schedule::ParkingFacility;

/// Default tick length: one second of simulated time.
const DEFAULT_TICK_MS: u64 = 1_000;

/// Settings for one dispatch controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub id: ControllerId,
    pub strategy: MatchingStrategyKind,
    pub rebalancer: RebalancerKind,
    /// A scheduling pass runs every this many ticks.
    pub schedule_computation_period_ticks: u64,
    pub max_waiting_secs: f64,
    pub ride_delay_secs: f64,
    /// Extra ride time granted to a rider sharing the vehicle.
    pub sharing_allowance_secs: f64,
    pub max_aggregated_requests: usize,
    /// Proximity only: how far a dropoff may be from the schedule's dropoffs.
    pub tolerated_extra_time_secs: f64,
    /// The rebalancer runs on every this many scheduling passes.
    pub rebalancing_period_passes: u64,
    pub parking: Vec<ParkingFacility>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            id: ControllerId(0),
            strategy: MatchingStrategyKind::default(),
            rebalancer: RebalancerKind::default(),
            schedule_computation_period_ticks: 5,
            max_waiting_secs: 600.0,
            ride_delay_secs: 1_800.0,
            sharing_allowance_secs: DEFAULT_SHARING_ALLOWANCE_SECS,
            max_aggregated_requests: 4,
            tolerated_extra_time_secs: 150.0,
            rebalancing_period_passes: 1,
            parking: Vec::new(),
        }
    }
}

impl ControllerConfig {
    pub fn new(id: ControllerId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: MatchingStrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_rebalancer(mut self, rebalancer: RebalancerKind) -> Self {
        self.rebalancer = rebalancer;
        self
    }

    pub fn with_period_ticks(mut self, ticks: u64) -> Self {
        self.schedule_computation_period_ticks = ticks;
        self
    }

    pub fn with_max_waiting_secs(mut self, secs: f64) -> Self {
        self.max_waiting_secs = secs;
        self
    }

    pub fn with_ride_delay_secs(mut self, secs: f64) -> Self {
        self.ride_delay_secs = secs;
        self
    }

    pub fn with_parking(mut self, parking: Vec<ParkingFacility>) -> Self {
        self.parking = parking;
        self
    }

    pub fn to_matching_params(&self) -> MatchingParams {
        MatchingParams {
            max_waiting_secs: self.max_waiting_secs,
            ride_delay_secs: self.ride_delay_secs,
            max_aggregated_requests: self.max_aggregated_requests,
            tolerated_extra_time_secs: self.tolerated_extra_time_secs,
            parking: self.parking.clone(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.schedule_computation_period_ticks == 0 {
            return invalid(format!("{}: schedule period must be at least one tick", self.id));
        }
        if self.rebalancing_period_passes == 0 {
            return invalid(format!("{}: rebalancing period must be at least one pass", self.id));
        }
        if !(self.max_waiting_secs > 0.0 && self.ride_delay_secs >= 0.0) {
            return invalid(format!("{}: waiting and delay limits must be positive", self.id));
        }
        if self.sharing_allowance_secs < 0.0 || self.tolerated_extra_time_secs < 0.0 {
            return invalid(format!("{}: time allowances must not be negative", self.id));
        }
        if self.max_aggregated_requests == 0 {
            return invalid(format!("{}: max_aggregated_requests must be positive", self.id));
        }
        if matches!(self.strategy, MatchingStrategyKind::GreedyAmod | MatchingStrategyKind::IncrementalAmod)
            && self.parking.is_empty()
        {
            return invalid(format!("{}: {:?} needs at least one parking facility", self.id, self.strategy));
        }
        if let RebalancerKind::Random { probability, .. } = self.rebalancer {
            if !(0.0..=1.0).contains(&probability) {
                return invalid(format!("{}: rebalancing probability {probability} outside [0, 1]", self.id));
            }
        }
        Ok(())
    }
}

/// How spawned driver agents behave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverAgentConfig {
    pub capacity: usize,
    pub cruise_when_idle: bool,
    pub cruise_radius_cells: u32,
    pub cruise_retry_attempts: u32,
}

impl Default for DriverAgentConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            cruise_when_idle: true,
            cruise_radius_cells: 3,
            cruise_retry_attempts: 5,
        }
    }
}

impl DriverAgentConfig {
    pub fn cruise_policy(&self) -> CruisePolicy {
        CruisePolicy {
            enabled: self.cruise_when_idle,
            radius_cells: self.cruise_radius_cells,
            attempts: self.cruise_retry_attempts,
        }
    }
}

/// Everything needed to build a dispatch world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
#[serde(default)]
pub struct DispatchConfig {
    pub tick_ms: u64,
    pub message_latency_ticks: u64,
    pub route: RouteServiceKind,
    pub controllers: Vec<ControllerConfig>,
    pub driver: DriverAgentConfig,
    pub seed: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            message_latency_ticks: 1,
            route: RouteServiceKind::default(),
            controllers: vec![ControllerConfig::default()],
            driver: DriverAgentConfig::default(),
            seed: 0,
        }
    }
}

impl DispatchConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tick_ms(mut self, tick_ms: u64) -> Self {
        self.tick_ms = tick_ms;
        self
    }

    pub fn with_message_latency_ticks(mut self, ticks: u64) -> Self {
        self.message_latency_ticks = ticks;
        self
    }

    pub fn with_route(mut self, route: RouteServiceKind) -> Self {
        self.route = route;
        self
    }

    pub fn with_controllers(mut self, controllers: Vec<ControllerConfig>) -> Self {
        self.controllers = controllers;
        self
    }

    pub fn with_driver(mut self, driver: DriverAgentConfig) -> Self {
        self.driver = driver;
        self
    }

    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".into()));
        }
        if self.message_latency_ticks == 0 {
            return Err(ConfigError::Invalid(
                "message latency must be at least one tick".into(),
            ));
        }
        if self.controllers.is_empty() {
            return Err(ConfigError::Invalid("at least one controller is required".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for controller in &self.controllers {
            if !seen.insert(controller.id) {
                return Err(ConfigError::Invalid(format!("duplicate controller {}", controller.id)));
            }
            controller.validate()?;
        }
        if self.driver.capacity == 0 {
            return Err(ConfigError::Invalid("driver capacity must be positive".into()));
        }
        match self.route {
            RouteServiceKind::H3Grid { speed_kmh } | RouteServiceKind::CachedH3Grid { speed_kmh, .. }
                if speed_kmh <= 0.0 =>
            {
                Err(ConfigError::Invalid("route speed must be positive".into()))
            }
            _ => Ok(()),
        }
    }
}
