#![allow(dead_code)]

use std::sync::Arc;

use bevy_ecs::prelude::World;
use dispatch_core::ids::ControllerId;
use dispatch_core::matching::MatchingStrategyKind;
use dispatch_core::rebalancing::RebalancerKind;
use dispatch_core::scenario::{
    build_world_with_route, ControllerConfig, DispatchConfig, DriverAgentConfig,
};
use dispatch_core::schedule::ParkingFacility;
use dispatch_core::test_helpers::MatrixRouteService;

/// Builder configuration for reproducible test worlds.
#[derive(Clone, Debug)]
pub struct TestWorldConfig {
    pub seed: u64,
    pub strategy: MatchingStrategyKind,
    pub rebalancer: RebalancerKind,
    pub period_ticks: u64,
    pub latency_ticks: u64,
    pub max_waiting_secs: f64,
    pub parking: Vec<ParkingFacility>,
    pub capacity: usize,
    pub cruise_when_idle: bool,
    pub route: MatrixRouteService,
}

impl Default for TestWorldConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            strategy: MatchingStrategyKind::Greedy,
            rebalancer: RebalancerKind::NoOp,
            period_ticks: 1,
            latency_ticks: 1,
            max_waiting_secs: 600.0,
            parking: Vec::new(),
            capacity: 4,
            cruise_when_idle: false,
            route: MatrixRouteService::uniform(30.0),
        }
    }
}

/// Populates a world with one controller and the shared dispatch resources.
#[derive(Debug, Default)]
pub struct TestWorldBuilder {
    config: TestWorldConfig,
}

impl TestWorldBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn with_strategy(mut self, strategy: MatchingStrategyKind) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn with_rebalancer(mut self, rebalancer: RebalancerKind) -> Self {
        self.config.rebalancer = rebalancer;
        self
    }

    /// Ticks between two scheduling passes.
    pub fn with_period_ticks(mut self, ticks: u64) -> Self {
        self.config.period_ticks = ticks;
        self
    }

    pub fn with_latency_ticks(mut self, ticks: u64) -> Self {
        self.config.latency_ticks = ticks;
        self
    }

    pub fn with_max_waiting_secs(mut self, secs: f64) -> Self {
        self.config.max_waiting_secs = secs;
        self
    }

    pub fn with_parking(mut self, parking: Vec<ParkingFacility>) -> Self {
        self.config.parking = parking;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn with_cruising(mut self, enabled: bool) -> Self {
        self.config.cruise_when_idle = enabled;
        self
    }

    pub fn with_route(mut self, route: MatrixRouteService) -> Self {
        self.config.route = route;
        self
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        let c = &self.config;
        let controller = ControllerConfig::new(CONTROLLER)
            .with_strategy(c.strategy)
            .with_rebalancer(c.rebalancer.clone())
            .with_period_ticks(c.period_ticks)
            .with_max_waiting_secs(c.max_waiting_secs)
            .with_parking(c.parking.clone());
        DispatchConfig::default()
            .with_seed(c.seed)
            .with_message_latency_ticks(c.latency_ticks)
            .with_controllers(vec![controller])
            .with_driver(DriverAgentConfig {
                capacity: c.capacity,
                cruise_when_idle: c.cruise_when_idle,
                ..DriverAgentConfig::default()
            })
    }

    pub fn build(self) -> World {
        let config = self.dispatch_config();
        build_world_with_route(&config, Arc::new(self.config.route))
    }
}

/// The single controller every test world carries.
pub const CONTROLLER: ControllerId = ControllerId(0);
