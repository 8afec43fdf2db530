//! The dispatch controller: owns the request queue and the driver registry,
//! runs the matching strategy on a fixed period and keeps its copy of every
//! driver schedule in step with the drivers through messages.

use std::collections::BTreeMap;

use bevy_ecs::prelude::Resource;
use h3o::CellIndex;
use tracing::{debug, error, info, warn};

use crate::driver::DriverStatus;
use crate::error::{DispatchError, DispatchResult};
use crate::feasibility::FeasibilityEvaluator;
use crate::ids::{ControllerId, DriverId};
use crate::matching::{build_strategy, Assignment, AssignmentKind, MatchingStrategy};
use crate::message::{ControllerMessage, DriverMessage, MessageBus};
use crate::rebalancing::{build_rebalancer, Rebalancer};
use crate::registry::{DriverRegistry, RequestQueue};
use crate::routing::RouteService;
use crate::scenario::ControllerConfig;
use crate::schedule::{Schedule, ScheduleItem, TripRequest};
use crate::telemetry::DispatchTelemetry;

/// What the world reports about one driver agent each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverSnapshot {
    pub location: CellIndex,
    pub status: DriverStatus,
    pub passenger_count: usize,
    /// The agent was asked to end its shift; its controllers may not know yet.
    pub ending_shift: bool,
}

/// Positions and states of every live driver agent.
#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    pub drivers: BTreeMap<DriverId, DriverSnapshot>,
}

impl FleetSnapshot {
    pub fn get(&self, id: DriverId) -> Option<&DriverSnapshot> {
        self.drivers.get(&id)
    }
}

pub struct ControllerContext<'a> {
    pub tick: u64,
    pub now_ms: u64,
    pub route: &'a dyn RouteService,
    pub bus: &'a mut MessageBus,
    pub fleet: &'a FleetSnapshot,
    pub telemetry: &'a mut DispatchTelemetry,
}

pub struct DispatchController {
    id: ControllerId,
    config: ControllerConfig,
    strategy: Box<dyn MatchingStrategy>,
    rebalancer: Box<dyn Rebalancer>,
    registry: DriverRegistry,
    queue: RequestQueue,
    ticks_since_pass: u64,
    passes_since_rebalance: u64,
    /// Rebalancing targets sent and not reached yet.
    cruise_moves: BTreeMap<DriverId, CellIndex>,
    computing: bool,
}

impl DispatchController {
    pub fn new(config: ControllerConfig, seed: u64) -> Self {
        let strategy = build_strategy(config.strategy, config.to_matching_params());
        let rebalancer = build_rebalancer(&config.rebalancer, seed ^ u64::from(config.id.0));
        Self::with_parts(config, strategy, rebalancer)
    }

    pub fn with_parts(
        config: ControllerConfig,
        strategy: Box<dyn MatchingStrategy>,
        rebalancer: Box<dyn Rebalancer>,
    ) -> Self {
        Self {
            id: config.id,
            config,
            strategy,
            rebalancer,
            registry: DriverRegistry::new(),
            queue: RequestQueue::new(),
            ticks_since_pass: 0,
            passes_since_rebalance: 0,
            cruise_moves: BTreeMap::new(),
            computing: false,
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn is_computing(&self) -> bool {
        self.computing
    }

    /// Drivers cruising toward a rebalancing target.
    pub fn cruise_moves(&self) -> &BTreeMap<DriverId, CellIndex> {
        &self.cruise_moves
    }

    /// Handle the inbox, refresh driver positions and run a scheduling pass
    /// when the period has elapsed.
    pub fn on_tick(&mut self, ctx: &mut ControllerContext<'_>) {
        for message in ctx.bus.take_for_controller(self.id, ctx.tick) {
            self.handle_message(ctx, message);
        }

        for (id, snapshot) in &ctx.fleet.drivers {
            self.registry.refresh(*id, snapshot.location, snapshot.status);
        }

        #[cfg(debug_assertions)]
        if let Err(err) = self.registry.check_invariants() {
            self.fatal("consistency check", &err);
        }

        self.ticks_since_pass += 1;
        if self.ticks_since_pass >= self.config.schedule_computation_period_ticks {
            self.ticks_since_pass = 0;
            self.run_pass(ctx);
        }
    }

    /// Accept a request straight from the outside world.
    pub fn on_trip_request(&mut self, request: TripRequest, now_ms: u64) {
        let pickup = request.pickup;
        let id = request.id;
        match self.queue.enqueue(request) {
            Ok(()) => {
                debug!(controller = %self.id, request = %id, "request queued");
                self.rebalancer.on_request_received(pickup, now_ms);
            }
            Err(err) => warn!(controller = %self.id, error = %err, "request dropped"),
        }
    }

    /// One scheduling round: expire stale requests, match, commit, rebalance.
    ///
    /// # Panics
    ///
    /// If called while a pass is already running.
    pub fn run_pass(&mut self, ctx: &mut ControllerContext<'_>) {
        assert!(!self.computing, "{} re-entered its scheduling pass", self.id);
        self.computing = true;

        self.expire_requests(ctx);

        let assignments = {
            let evaluator = FeasibilityEvaluator::new(ctx.route, ctx.now_ms)
                .with_sharing_allowance_secs(self.config.sharing_allowance_secs);
            self.strategy
                .compute_assignments(&self.queue, &self.registry, &evaluator)
        };
        if !assignments.is_empty() {
            debug!(
                controller = %self.id,
                strategy = self.strategy.name(),
                assignments = assignments.len(),
                queued = self.queue.len(),
                "scheduling pass"
            );
        }
        for assignment in assignments {
            self.commit(ctx, assignment);
        }

        self.passes_since_rebalance += 1;
        if self.passes_since_rebalance >= self.config.rebalancing_period_passes {
            self.passes_since_rebalance = 0;
            self.rebalance(ctx);
        }

        self.computing = false;
    }

    fn expire_requests(&mut self, ctx: &mut ControllerContext<'_>) {
        let max_wait_ms = (self.config.max_waiting_secs * 1_000.0) as u64;
        for request in self.queue.expire(ctx.now_ms, max_wait_ms) {
            let waited_ms = ctx.now_ms.saturating_sub(request.issued_at_ms);
            ctx.telemetry
                .record_expired(ctx.tick, self.id, request.id, waited_ms);
        }
    }

    fn commit(&mut self, ctx: &mut ControllerContext<'_>, assignment: Assignment) {
        let Assignment {
            driver,
            schedule,
            kind,
            new_requests,
        } = assignment;

        let capacity = self
            .registry
            .get(driver)
            .map_or(0, |record| record.capacity);
        if let Err(source) = schedule.validate(capacity) {
            self.fatal("commit", &DispatchError::MalformedSchedule { driver, source });
            return;
        }

        let registered = match kind {
            AssignmentKind::New => self.registry.mark_busy(driver, schedule.clone()),
            AssignmentKind::Update => self.registry.update_schedule(driver, schedule.clone()),
        };
        if let Err(err) = registered {
            self.fatal("commit", &err);
            return;
        }
        self.cruise_moves.remove(&driver);
        for request in &new_requests {
            if let Err(err) = self.queue.dequeue_matched(*request) {
                self.fatal("commit", &err);
            }
        }

        ctx.telemetry
            .record_assignment(ctx.tick, self.id, driver, kind, &new_requests, &schedule);
        let message = match kind {
            AssignmentKind::New => DriverMessage::ScheduleProposition {
                controller: self.id,
                schedule,
            },
            AssignmentKind::Update => DriverMessage::ScheduleUpdate {
                controller: self.id,
                schedule,
            },
        };
        ctx.bus.post_to_driver(driver, message, ctx.tick);
    }

    fn rebalance(&mut self, ctx: &mut ControllerContext<'_>) {
        let registry = &self.registry;
        self.cruise_moves.retain(|driver, target| {
            registry
                .get(*driver)
                .is_some_and(|record| record.location != *target)
                && registry.is_available(*driver)
        });

        let idle: Vec<(DriverId, CellIndex)> = self
            .registry
            .eligible_available()
            .filter(|record| !self.cruise_moves.contains_key(&record.id))
            .filter(|record| {
                ctx.fleet
                    .get(record.id)
                    .map_or(true, |s| s.passenger_count == 0 && !s.ending_shift)
            })
            .map(|record| (record.id, record.location))
            .collect();
        if idle.is_empty() {
            return;
        }
        let pickups = self.queue.pickups();
        let moves = self.rebalancer.rebalance(&idle, &pickups, ctx.now_ms);
        for movement in &moves {
            debug!(
                controller = %self.id,
                driver = %movement.driver,
                target = %movement.target,
                "rebalancing"
            );
            ctx.bus.post_to_driver(
                movement.driver,
                DriverMessage::ScheduleProposition {
                    controller: self.id,
                    schedule: Schedule::from_items([ScheduleItem::Cruise(movement.target)]),
                },
                ctx.tick,
            );
            self.cruise_moves.insert(movement.driver, movement.target);
        }
        ctx.telemetry.record_rebalancing(moves.len());
    }

    fn handle_message(&mut self, ctx: &mut ControllerContext<'_>, message: ControllerMessage) {
        let result = match message {
            ControllerMessage::TripRequest(request) => {
                self.on_trip_request(request, ctx.now_ms);
                Ok(())
            }
            ControllerMessage::DriverSubscribe(info) => {
                debug!(controller = %self.id, driver = %info.id, "driver subscribed");
                self.registry.subscribe(info)
            }
            ControllerMessage::DriverShiftEnd(driver) => self.on_shift_end(ctx, driver),
            ControllerMessage::DriverAvailable(driver) => self.on_available(ctx, driver),
            ControllerMessage::DriverScheduleStatus { driver, completed } => {
                self.on_item_completed(ctx, driver, &completed)
            }
            ControllerMessage::SchedulePropositionReply {
                driver,
                success,
                schedule,
            } => {
                if success {
                    Ok(())
                } else {
                    self.on_proposition_failed(ctx, driver, &schedule)
                }
            }
            ControllerMessage::SyncSchedule { driver, schedule } => {
                ctx.telemetry
                    .record_divergence(ctx.tick, self.id, driver, &schedule);
                self.registry
                    .update_schedule(driver, schedule)
                    .and_then(|()| self.release_if_leaving(ctx, driver))
            }
        };
        if let Err(err) = result {
            self.fatal("message handling", &err);
        }
    }

    fn on_shift_end(&mut self, ctx: &mut ControllerContext<'_>, driver: DriverId) -> DispatchResult<()> {
        if self.registry.request_shift_end(driver)? {
            self.release_if_leaving(ctx, driver)
        } else {
            info!(controller = %self.id, driver = %driver, "shift end deferred until schedule drains");
            Ok(())
        }
    }

    /// Only honoured when the controller copy is already empty: an update the
    /// driver has not seen yet keeps it busy.
    fn on_available(&mut self, ctx: &mut ControllerContext<'_>, driver: DriverId) -> DispatchResult<()> {
        let empty = self
            .registry
            .get(driver)
            .ok_or(DispatchError::NotSubscribed(driver))?
            .schedule
            .is_empty();
        if !empty {
            debug!(controller = %self.id, driver = %driver, "ignoring availability, update pending");
            return Ok(());
        }
        self.registry.mark_available(driver)?;
        self.release_if_leaving(ctx, driver)
    }

    fn on_item_completed(
        &mut self,
        ctx: &mut ControllerContext<'_>,
        driver: DriverId,
        item: &ScheduleItem,
    ) -> DispatchResult<()> {
        if let ScheduleItem::Cruise(_) = item {
            self.cruise_moves.remove(&driver);
        }
        if !self.registry.record_item_completed(driver, item)? {
            debug!(controller = %self.id, driver = %driver, item = %item, "completed item not in copy");
        }
        self.release_if_leaving(ctx, driver)
    }

    /// Put the unserved requests back in the queue, keeping their issue time,
    /// and free the driver.
    ///
    /// A rejected CRUISE move leaves the controller copy alone, and a reply
    /// from a driver that already unsubscribed only returns its requests.
    fn on_proposition_failed(
        &mut self,
        ctx: &mut ControllerContext<'_>,
        driver: DriverId,
        returned: &Schedule,
    ) -> DispatchResult<()> {
        ctx.telemetry
            .record_proposition_failure(ctx.tick, self.id, driver, returned);
        self.cruise_moves.remove(&driver);
        let mut unserved: Vec<TripRequest> = returned.pending_pickups().cloned().collect();
        if !self.registry.is_subscribed(driver) {
            debug!(controller = %self.id, driver = %driver, "rejection from unsubscribed driver");
            return self.requeue(unserved);
        }
        if returned.iter().all(ScheduleItem::is_terminal) {
            return self.release_if_leaving(ctx, driver);
        }
        if let Some(record) = self.registry.get(driver) {
            unserved.extend(record.schedule.pending_pickups().cloned());
        }
        self.requeue(unserved)?;
        self.registry.mark_available(driver)?;
        self.release_if_leaving(ctx, driver)
    }

    fn requeue(&mut self, requests: Vec<TripRequest>) -> DispatchResult<()> {
        for request in requests {
            if !self.queue.contains(request.id) {
                self.queue.enqueue(request)?;
            }
        }
        Ok(())
    }

    /// Unsubscribe a driver that asked to leave once its copy is empty.
    fn release_if_leaving(&mut self, ctx: &mut ControllerContext<'_>, driver: DriverId) -> DispatchResult<()> {
        let ready = self
            .registry
            .get(driver)
            .is_some_and(|record| record.shift_end_pending && record.schedule.is_empty());
        if !ready {
            return Ok(());
        }
        self.registry.unsubscribe(driver)?;
        self.cruise_moves.remove(&driver);
        info!(controller = %self.id, driver = %driver, tick = ctx.tick, "driver unsubscribed");
        ctx.bus.post_to_driver(
            driver,
            DriverMessage::UnsubscribeSuccessful(self.id),
            ctx.tick,
        );
        Ok(())
    }

    fn fatal(&self, context: &str, err: &DispatchError) {
        error!(controller = %self.id, context, error = %err, "dispatch invariant violated");
        debug_assert!(false, "{}: {context}: {err}", self.id);
    }
}

/// Every controller in the world, by id.
#[derive(Default, Resource)]
pub struct ControllerFleet {
    controllers: BTreeMap<ControllerId, DispatchController>,
}

impl ControllerFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, controller: DispatchController) {
        self.controllers.insert(controller.id(), controller);
    }

    pub fn get(&self, id: ControllerId) -> Option<&DispatchController> {
        self.controllers.get(&id)
    }

    pub fn get_mut(&mut self, id: ControllerId) -> DispatchResult<&mut DispatchController> {
        self.controllers
            .get_mut(&id)
            .ok_or(DispatchError::UnknownController(id))
    }

    pub fn ids(&self) -> Vec<ControllerId> {
        self.controllers.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DispatchController> {
        self.controllers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DispatchController> {
        self.controllers.values_mut()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebalancing::RebalancerKind;
    use crate::registry::DriverInfo;
    use crate::test_helpers::{cell_ring, request, request_at, test_cell, MatrixRouteService};

    const CTRL: ControllerId = ControllerId(0);

    struct Harness {
        controller: DispatchController,
        route: MatrixRouteService,
        bus: MessageBus,
        fleet: FleetSnapshot,
        telemetry: DispatchTelemetry,
        tick: u64,
    }

    impl Harness {
        fn new(config: ControllerConfig) -> Self {
            Self {
                controller: DispatchController::new(config, 0),
                route: MatrixRouteService::uniform(60.0),
                bus: MessageBus::new(1),
                fleet: FleetSnapshot::default(),
                telemetry: DispatchTelemetry::default(),
                tick: 0,
            }
        }

        fn deliver(&mut self, message: ControllerMessage) {
            self.bus.post_to_controller(CTRL, message, self.tick);
        }

        fn tick(&mut self) {
            self.tick += 1;
            let mut ctx = ControllerContext {
                tick: self.tick,
                now_ms: self.tick * 1_000,
                route: &self.route,
                bus: &mut self.bus,
                fleet: &self.fleet,
                telemetry: &mut self.telemetry,
            };
            self.controller.on_tick(&mut ctx);
        }

        fn outbox(&mut self, driver: DriverId) -> Vec<DriverMessage> {
            self.bus.take_for_driver(driver, u64::MAX)
        }
    }

    fn every_tick() -> ControllerConfig {
        ControllerConfig::new(CTRL).with_period_ticks(1)
    }

    fn subscribe(h: &mut Harness, id: u32) -> DriverId {
        let driver = DriverId(id);
        h.deliver(ControllerMessage::DriverSubscribe(DriverInfo {
            id: driver,
            capacity: 4,
            location: test_cell(),
        }));
        driver
    }

    #[test]
    fn pass_proposes_schedule_and_marks_driver_busy() {
        let [a, b] = cell_ring::<2>();
        let mut h = Harness::new(every_tick());
        let driver = subscribe(&mut h, 1);
        h.deliver(ControllerMessage::TripRequest(request(1, a, b)));
        h.tick();

        assert!(h.controller.queue().is_empty());
        assert!(!h.controller.registry().is_available(driver));
        assert_eq!(
            h.outbox(driver),
            vec![DriverMessage::ScheduleProposition {
                controller: CTRL,
                schedule: Schedule::solo(&request(1, a, b)),
            }]
        );
        assert_eq!(h.telemetry.assignments.len(), 1);
    }

    #[test]
    fn pass_runs_only_on_its_period() {
        let [a, b] = cell_ring::<2>();
        let mut h = Harness::new(ControllerConfig::new(CTRL).with_period_ticks(3));
        let driver = subscribe(&mut h, 1);
        h.deliver(ControllerMessage::TripRequest(request(1, a, b)));
        h.tick();
        h.tick();
        assert_eq!(h.controller.queue().len(), 1);
        h.tick();
        assert!(h.controller.queue().is_empty());
        assert_eq!(h.outbox(driver).len(), 1);
    }

    #[test]
    fn expired_requests_leave_the_queue_at_pass_start() {
        let [a, b] = cell_ring::<2>();
        let mut h = Harness::new(every_tick().with_max_waiting_secs(10.0));
        h.deliver(ControllerMessage::TripRequest(request_at(1, 0, a, b)));
        h.tick();
        assert_eq!(h.controller.queue().len(), 1);
        h.tick = 20;
        h.tick();
        assert!(h.controller.queue().is_empty());
        assert_eq!(h.telemetry.expired.len(), 1);
        assert_eq!(h.telemetry.expired[0].waited_ms, 21_000);
    }

    #[test]
    fn failed_proposition_requeues_requests_and_frees_driver() {
        let [a, b] = cell_ring::<2>();
        let r = request(1, a, b);
        let mut h = Harness::new(ControllerConfig::new(CTRL).with_period_ticks(2));
        let driver = subscribe(&mut h, 1);
        h.deliver(ControllerMessage::TripRequest(r.clone()));
        h.tick();
        h.tick();
        assert!(h.controller.queue().is_empty());

        h.deliver(ControllerMessage::SchedulePropositionReply {
            driver,
            success: false,
            schedule: Schedule::solo(&r),
        });
        h.tick();
        assert!(h.controller.queue().contains(r.id));
        assert_eq!(h.controller.queue().get(r.id).map(|q| q.issued_at_ms), Some(0));
        assert!(h.controller.registry().is_available(driver));
        assert_eq!(h.telemetry.proposition_failures, 1);
    }

    #[test]
    fn availability_is_ignored_while_copy_is_non_empty() {
        let [a, b] = cell_ring::<2>();
        let r = request(1, a, b);
        let mut h = Harness::new(every_tick());
        let driver = subscribe(&mut h, 1);
        h.deliver(ControllerMessage::TripRequest(r.clone()));
        h.tick();

        h.deliver(ControllerMessage::DriverAvailable(driver));
        h.tick();
        assert!(!h.controller.registry().is_available(driver));

        h.deliver(ControllerMessage::DriverScheduleStatus {
            driver,
            completed: ScheduleItem::Pickup(r.clone()),
        });
        h.deliver(ControllerMessage::DriverScheduleStatus {
            driver,
            completed: ScheduleItem::Dropoff(r),
        });
        h.deliver(ControllerMessage::DriverAvailable(driver));
        h.tick();
        assert!(h.controller.registry().is_available(driver));
    }

    #[test]
    fn shift_end_is_deferred_until_the_copy_drains() {
        let [a, b] = cell_ring::<2>();
        let r = request(1, a, b);
        let mut h = Harness::new(every_tick());
        let driver = subscribe(&mut h, 1);
        h.deliver(ControllerMessage::TripRequest(r.clone()));
        h.tick();
        h.outbox(driver);

        h.deliver(ControllerMessage::DriverShiftEnd(driver));
        h.tick();
        assert!(h.controller.registry().is_subscribed(driver));
        assert!(h.outbox(driver).is_empty());

        h.deliver(ControllerMessage::DriverScheduleStatus {
            driver,
            completed: ScheduleItem::Pickup(r.clone()),
        });
        h.deliver(ControllerMessage::DriverScheduleStatus {
            driver,
            completed: ScheduleItem::Dropoff(r),
        });
        h.tick();
        assert!(!h.controller.registry().is_subscribed(driver));
        assert_eq!(
            h.outbox(driver),
            vec![DriverMessage::UnsubscribeSuccessful(CTRL)]
        );
    }

    #[test]
    fn sync_schedule_is_adopted() {
        let [a, b, c, d] = cell_ring::<4>();
        let r1 = request(1, a, b);
        let r2 = request(2, c, d);
        let mut h = Harness::new(every_tick());
        let driver = subscribe(&mut h, 1);
        h.deliver(ControllerMessage::TripRequest(r1.clone()));
        h.tick();

        let synced = Schedule::from_items([
            ScheduleItem::Dropoff(r1),
            ScheduleItem::Pickup(r2.clone()),
            ScheduleItem::Dropoff(r2),
        ]);
        h.deliver(ControllerMessage::SyncSchedule {
            driver,
            schedule: synced.clone(),
        });
        h.tick();
        assert_eq!(
            h.controller.registry().get(driver).map(|r| &r.schedule),
            Some(&synced)
        );
        assert_eq!(h.telemetry.divergences, 1);
    }

    #[test]
    fn fleet_snapshot_refreshes_driver_positions() {
        let [a] = cell_ring::<1>();
        let mut h = Harness::new(ControllerConfig::new(CTRL).with_period_ticks(100));
        let driver = subscribe(&mut h, 1);
        h.tick();
        h.fleet.drivers.insert(
            driver,
            DriverSnapshot {
                location: a,
                status: DriverStatus::Parked,
                passenger_count: 0,
                ending_shift: false,
            },
        );
        h.tick();
        let record = h.controller.registry().get(driver).expect("subscribed");
        assert_eq!(record.location, a);
        assert_eq!(record.status, DriverStatus::Parked);
    }

    fn always_rebalance() -> ControllerConfig {
        every_tick().with_rebalancer(RebalancerKind::Random {
            probability: 1.0,
            history_ms: 600_000,
        })
    }

    fn cruise_to(target: CellIndex) -> DriverMessage {
        DriverMessage::ScheduleProposition {
            controller: CTRL,
            schedule: Schedule::from_items([ScheduleItem::Cruise(target)]),
        }
    }

    #[test]
    fn rejection_from_an_unsubscribed_driver_only_requeues() {
        let [a, b] = cell_ring::<2>();
        let r = request(1, a, b);
        let mut h = Harness::new(every_tick());
        let driver = subscribe(&mut h, 1);
        h.tick();
        h.deliver(ControllerMessage::DriverShiftEnd(driver));
        h.tick();
        assert!(!h.controller.registry().is_subscribed(driver));

        h.deliver(ControllerMessage::SchedulePropositionReply {
            driver,
            success: false,
            schedule: Schedule::from_items([ScheduleItem::Cruise(a)]),
        });
        h.deliver(ControllerMessage::SchedulePropositionReply {
            driver,
            success: false,
            schedule: Schedule::solo(&r),
        });
        h.route = MatrixRouteService::new();
        h.tick();

        assert!(h.controller.queue().contains(r.id));
        assert!(h.controller.registry().is_empty());
        assert_eq!(h.telemetry.proposition_failures, 2);
    }

    #[test]
    fn rejected_cruise_keeps_the_copy_of_a_busy_driver() {
        let [a, b, c] = cell_ring::<3>();
        let r = request(1, a, b);
        let mut h = Harness::new(every_tick());
        let driver = subscribe(&mut h, 1);
        h.deliver(ControllerMessage::TripRequest(r.clone()));
        h.tick();
        assert!(!h.controller.registry().is_available(driver));

        h.deliver(ControllerMessage::SchedulePropositionReply {
            driver,
            success: false,
            schedule: Schedule::from_items([ScheduleItem::Cruise(c)]),
        });
        h.tick();
        assert!(!h.controller.registry().is_available(driver));
        assert_eq!(
            h.controller.registry().get(driver).map(|record| &record.schedule),
            Some(&Schedule::solo(&r))
        );
        assert!(h.controller.queue().is_empty());
    }

    #[test]
    fn cruising_driver_is_not_retargeted_before_arriving() {
        let [a, b] = cell_ring::<2>();
        let mut h = Harness::new(always_rebalance());
        h.route = MatrixRouteService::new();
        let driver = subscribe(&mut h, 1);
        h.deliver(ControllerMessage::TripRequest(request(1, a, b)));
        h.tick();
        assert_eq!(h.outbox(driver), vec![cruise_to(a)]);
        assert_eq!(h.controller.cruise_moves().get(&driver), Some(&a));

        h.tick();
        h.tick();
        assert!(h.outbox(driver).is_empty());
        assert_eq!(h.telemetry.rebalancing_moves, 1);

        h.fleet.drivers.insert(
            driver,
            DriverSnapshot {
                location: a,
                status: DriverStatus::Cruising,
                passenger_count: 0,
                ending_shift: false,
            },
        );
        h.tick();
        assert!(h.controller.cruise_moves().is_empty());
        assert!(h.outbox(driver).is_empty());
    }

    #[test]
    fn drivers_ending_their_shift_are_not_rebalanced() {
        let [a, b] = cell_ring::<2>();
        let mut h = Harness::new(always_rebalance());
        h.route = MatrixRouteService::new();
        let driver = subscribe(&mut h, 1);
        h.fleet.drivers.insert(
            driver,
            DriverSnapshot {
                location: test_cell(),
                status: DriverStatus::Cruising,
                passenger_count: 0,
                ending_shift: true,
            },
        );
        h.deliver(ControllerMessage::TripRequest(request(1, a, b)));
        h.tick();
        assert!(h.outbox(driver).is_empty());
        assert_eq!(h.telemetry.rebalancing_moves, 0);
    }

    #[test]
    fn unknown_controller_is_an_error() {
        let mut fleet = ControllerFleet::new();
        assert!(fleet.is_empty());
        assert!(matches!(
            fleet.get_mut(ControllerId(9)),
            Err(DispatchError::UnknownController(ControllerId(9)))
        ));
    }

    #[test]
    #[should_panic(expected = "re-entered")]
    fn nested_pass_panics() {
        let mut h = Harness::new(every_tick());
        h.controller.computing = true;
        h.tick();
    }
}
