use std::collections::{BTreeMap, BTreeSet};

use bevy_ecs::prelude::Component;
use h3o::CellIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::ids::{ControllerId, DriverId, RequestId};
use crate::message::{ControllerMessage, DriverMessage, MessageBus};
use crate::registry::DriverInfo;
use crate::routing::RouteService;
use crate::schedule::{Schedule, ScheduleItem, ScheduleItemKind};
use crate::spatial::grid_disk_cached;
use crate::telemetry::{CompletedTripRecord, DispatchTelemetry};

use super::{DriverStatus, MobilityServiceDriver, VehicleMotion};

/// Everything a driver touches outside itself during one tick.
pub struct DriverContext<'a> {
    pub tick: u64,
    pub now_ms: u64,
    pub route: &'a dyn RouteService,
    pub bus: &'a mut MessageBus,
    pub telemetry: &'a mut DispatchTelemetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOutcome {
    Active,
    /// Every controller acknowledged the shift end; remove the agent.
    Departed,
}

/// How an idle driver wanders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CruisePolicy {
    pub enabled: bool,
    pub radius_cells: u32,
    /// Random targets tried before giving up for this tick.
    pub attempts: u32,
}

impl Default for CruisePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            radius_cells: 3,
            attempts: 5,
        }
    }
}

/// A driver serving on-demand requests for one or more controllers.
///
/// The driver keeps its own copy of its schedule. The front item is the one
/// being executed; controllers can only change the copy by message.
#[derive(Debug, Component)]
pub struct OnCallDriver {
    id: DriverId,
    capacity: usize,
    status: DriverStatus,
    controllers: Vec<ControllerId>,
    schedule: Schedule,
    /// Controller that sent the schedule being executed.
    owner: Option<ControllerId>,
    /// Riders aboard and when they were picked up.
    aboard: BTreeMap<RequestId, u64>,
    completed: BTreeSet<(ScheduleItemKind, RequestId)>,
    en_route: bool,
    parked: bool,
    shift_end_requested: bool,
    leaving: bool,
    awaiting_acks: BTreeSet<ControllerId>,
    cruise: CruisePolicy,
    rng: StdRng,
}

impl OnCallDriver {
    pub fn new(
        id: DriverId,
        capacity: usize,
        controllers: Vec<ControllerId>,
        cruise: CruisePolicy,
        seed: u64,
    ) -> Self {
        Self {
            id,
            capacity,
            status: DriverStatus::DriveStart,
            controllers,
            schedule: Schedule::new(),
            owner: None,
            aboard: BTreeMap::new(),
            completed: BTreeSet::new(),
            en_route: false,
            parked: false,
            shift_end_requested: false,
            leaving: false,
            awaiting_acks: BTreeSet::new(),
            cruise,
            rng: StdRng::seed_from_u64(seed ^ u64::from(id.0)),
        }
    }

    pub fn is_leaving(&self) -> bool {
        self.leaving
    }

    /// Asked to end the shift, whether or not the handshake has started.
    pub fn is_ending_shift(&self) -> bool {
        self.leaving || self.shift_end_requested
    }

    pub fn has_completed(&self, item: &ScheduleItem) -> bool {
        match item {
            ScheduleItem::Pickup(request) => self
                .completed
                .contains(&(ScheduleItemKind::Pickup, request.id)),
            ScheduleItem::Dropoff(request) => self
                .completed
                .contains(&(ScheduleItemKind::Dropoff, request.id)),
            ScheduleItem::Cruise(_) | ScheduleItem::Park(_) => false,
        }
    }

    /// Advance the agent by one tick: subscribe on the first tick, handle
    /// the inbox, perform stops on arrival, then wander or end the shift.
    pub fn update(
        &mut self,
        ctx: &mut DriverContext<'_>,
        motion: &mut impl VehicleMotion,
        inbox: Vec<DriverMessage>,
    ) -> DriverOutcome {
        if self.status == DriverStatus::DriveStart {
            self.subscribe_all(ctx, motion.current_location());
        }

        for message in inbox {
            self.handle_message(ctx, motion, message);
        }
        if self.status == DriverStatus::ShiftEnded {
            return DriverOutcome::Departed;
        }

        if self.en_route && motion.has_arrived() {
            self.en_route = false;
            let at_stop = self
                .schedule
                .front()
                .is_some_and(|item| item.location() == motion.current_location());
            // Otherwise the path broke off early; re-plan below.
            if at_stop {
                self.perform_colocated(ctx, motion);
            }
        }
        if !self.en_route && !self.schedule.is_empty() && !self.leaving {
            self.start_current_item(ctx, motion);
        }

        self.maybe_end_shift(ctx, motion);
        if self.status == DriverStatus::ShiftEnded {
            return DriverOutcome::Departed;
        }

        if self.schedule.is_empty()
            && !self.leaving
            && self.status == DriverStatus::Cruising
            && motion.has_arrived()
        {
            self.wander(ctx, motion);
        }
        DriverOutcome::Active
    }

    fn subscribe_all(&mut self, ctx: &mut DriverContext<'_>, location: CellIndex) {
        let info = DriverInfo {
            id: self.id,
            capacity: self.capacity,
            location,
        };
        for controller in &self.controllers {
            ctx.bus.post_to_controller(
                *controller,
                ControllerMessage::DriverSubscribe(info),
                ctx.tick,
            );
        }
        debug!(driver = %self.id, controllers = self.controllers.len(), "driver subscribed");
        self.status = DriverStatus::Cruising;
    }

    fn handle_message(
        &mut self,
        ctx: &mut DriverContext<'_>,
        motion: &mut impl VehicleMotion,
        message: DriverMessage,
    ) {
        match message {
            DriverMessage::ScheduleProposition {
                controller,
                schedule,
            } => self.on_proposition(ctx, motion, controller, schedule),
            DriverMessage::ScheduleUpdate {
                controller,
                schedule,
            } => self.on_update(ctx, motion, controller, schedule),
            DriverMessage::UnsubscribeSuccessful(controller) => {
                self.awaiting_acks.remove(&controller);
                self.controllers.retain(|c| *c != controller);
                if self.leaving && self.awaiting_acks.is_empty() {
                    info!(driver = %self.id, tick = ctx.tick, "shift ended");
                    self.status = DriverStatus::ShiftEnded;
                }
            }
            DriverMessage::ShiftEndRequested => {
                self.shift_end_requested = true;
            }
        }
    }

    fn on_proposition(
        &mut self,
        ctx: &mut DriverContext<'_>,
        motion: &mut impl VehicleMotion,
        controller: ControllerId,
        schedule: Schedule,
    ) {
        if self.leaving || self.shift_end_requested {
            debug!(driver = %self.id, "rejecting proposition while ending shift");
            self.reject(ctx, controller, schedule);
            return;
        }
        if self.schedule.iter().any(|item| !item.is_terminal()) {
            warn!(driver = %self.id, controller = %controller, "proposition received while serving riders");
            self.reject(ctx, controller, schedule);
            return;
        }
        self.schedule = schedule;
        self.owner = Some(controller);
        self.en_route = false;
        self.start_current_item(ctx, motion);
    }

    fn reject(&mut self, ctx: &mut DriverContext<'_>, controller: ControllerId, schedule: Schedule) {
        ctx.bus.post_to_controller(
            controller,
            ControllerMessage::SchedulePropositionReply {
                driver: self.id,
                success: false,
                schedule,
            },
            ctx.tick,
        );
    }

    /// Reconcile the full remaining schedule sent by a controller with the
    /// local copy.
    ///
    /// Items already performed are dropped; if any were, the copies had
    /// diverged and the controller is sent the reconciled copy. The item being
    /// executed keeps running when the update still contains it; otherwise
    /// the driver switches to the update's first item.
    fn on_update(
        &mut self,
        ctx: &mut DriverContext<'_>,
        motion: &mut impl VehicleMotion,
        controller: ControllerId,
        update: Schedule,
    ) {
        let idle = self.schedule.iter().all(ScheduleItem::is_terminal);
        if idle && (self.leaving || self.shift_end_requested) {
            self.reject(ctx, controller, update);
            return;
        }
        self.owner = Some(controller);
        let mut stale = 0;
        let mut fresh = Schedule::new();
        for item in &update {
            if self.has_completed(item) {
                stale += 1;
            } else {
                fresh.push(item.clone());
            }
        }

        // A terminal item in front yields to whatever the update puts first.
        let current = self
            .schedule
            .front()
            .filter(|item| !item.is_terminal())
            .cloned();
        let kept = current.and_then(|item| fresh.position(&item).map(|index| (item, index)));
        match kept {
            Some((item, index)) => {
                fresh.remove(index);
                fresh.insert(0, item);
                self.schedule = fresh;
                if !self.en_route {
                    self.start_current_item(ctx, motion);
                }
            }
            None => {
                debug!(driver = %self.id, "preempting current item");
                self.schedule = fresh;
                self.en_route = false;
                self.start_current_item(ctx, motion);
            }
        }

        if stale > 0 {
            warn!(
                driver = %self.id,
                controller = %controller,
                stale,
                "schedule update contained completed items"
            );
            ctx.bus.post_to_controller(
                controller,
                ControllerMessage::SyncSchedule {
                    driver: self.id,
                    schedule: self.schedule.clone(),
                },
                ctx.tick,
            );
        }
    }

    /// Start moving toward the front item, performing it (and every following
    /// item at the same place) right away when the vehicle is already there.
    fn start_current_item(&mut self, ctx: &mut DriverContext<'_>, motion: &mut impl VehicleMotion) {
        loop {
            let Some(front) = self.schedule.front() else {
                self.settle();
                return;
            };
            let target = front.location();
            let here = motion.current_location();
            if target == here {
                self.perform_colocated(ctx, motion);
                if self.schedule.is_empty() {
                    return;
                }
                continue;
            }
            match ctx.route.shortest_path(here, target) {
                Some(path) => {
                    self.status = self.status_for(front);
                    self.parked = false;
                    self.en_route = true;
                    motion.begin_moving_to(path);
                    return;
                }
                None => {
                    self.on_no_route(ctx, motion);
                    return;
                }
            }
        }
    }

    fn status_for(&self, item: &ScheduleItem) -> DriverStatus {
        match item {
            ScheduleItem::Pickup(_) if self.aboard.is_empty() => DriverStatus::DriveOnCall,
            ScheduleItem::Pickup(_) | ScheduleItem::Dropoff(_) => DriverStatus::DriveWithPassenger,
            ScheduleItem::Cruise(_) => DriverStatus::Cruising,
            ScheduleItem::Park(_) => DriverStatus::DriveToParking,
        }
    }

    fn on_no_route(&mut self, ctx: &mut DriverContext<'_>, motion: &mut impl VehicleMotion) {
        let Some(front) = self.schedule.front().cloned() else {
            return;
        };
        if front.is_terminal() {
            warn!(driver = %self.id, item = %front, "no route to terminal stop, dropping it");
            self.schedule.pop_front();
            self.settle();
            return;
        }
        if !self.aboard.is_empty() {
            // Riders aboard cannot be handed back; try again next tick.
            warn!(driver = %self.id, item = %front, "no route to next stop, retrying");
            return;
        }
        warn!(driver = %self.id, item = %front, "no route to next stop, returning schedule");
        let returned = std::mem::take(&mut self.schedule);
        if let Some(owner) = self.owner {
            self.reject(ctx, owner, returned);
        }
        motion.halt();
        self.settle();
    }

    fn perform_colocated(&mut self, ctx: &mut DriverContext<'_>, motion: &mut impl VehicleMotion) {
        let count = self.schedule.colocated_prefix_len();
        for _ in 0..count {
            let Some(item) = self.schedule.pop_front() else {
                break;
            };
            self.perform(ctx, motion, &item);
        }
        if self.schedule.is_empty() {
            self.settle();
            for controller in &self.controllers {
                ctx.bus.post_to_controller(
                    *controller,
                    ControllerMessage::DriverAvailable(self.id),
                    ctx.tick,
                );
            }
        }
    }

    fn perform(
        &mut self,
        ctx: &mut DriverContext<'_>,
        motion: &mut impl VehicleMotion,
        item: &ScheduleItem,
    ) {
        match item {
            ScheduleItem::Pickup(request) => {
                self.aboard.insert(request.id, ctx.now_ms);
                self.completed.insert((ScheduleItemKind::Pickup, request.id));
                ctx.telemetry.record_pickup(ctx.tick, self.id, request.id);
            }
            ScheduleItem::Dropoff(request) => {
                let pickup_at_ms = self.aboard.remove(&request.id).unwrap_or(ctx.now_ms);
                self.completed.insert((ScheduleItemKind::Dropoff, request.id));
                ctx.telemetry.record_dropoff(
                    ctx.tick,
                    CompletedTripRecord {
                        request: request.id,
                        driver: self.id,
                        requested_at_ms: request.issued_at_ms,
                        pickup_at_ms,
                        dropoff_at_ms: ctx.now_ms,
                    },
                );
            }
            ScheduleItem::Cruise(_) => {}
            ScheduleItem::Park(facility) => {
                motion.park_at(facility);
                self.parked = true;
            }
        }

        let status = ControllerMessage::DriverScheduleStatus {
            driver: self.id,
            completed: item.clone(),
        };
        match self.owner {
            Some(owner) => ctx.bus.post_to_controller(owner, status, ctx.tick),
            None => {
                for controller in &self.controllers {
                    ctx.bus.post_to_controller(*controller, status.clone(), ctx.tick);
                }
            }
        }
    }

    fn settle(&mut self) {
        if self.schedule.is_empty() {
            self.en_route = false;
            self.status = if self.parked {
                DriverStatus::Parked
            } else {
                DriverStatus::Cruising
            };
        }
    }

    fn maybe_end_shift(&mut self, ctx: &mut DriverContext<'_>, motion: &mut impl VehicleMotion) {
        if !self.shift_end_requested
            || self.leaving
            || !self.schedule.is_empty()
            || !self.status.is_idle()
        {
            return;
        }
        self.leaving = true;
        motion.halt();
        if self.controllers.is_empty() {
            self.status = DriverStatus::ShiftEnded;
            return;
        }
        for controller in &self.controllers {
            ctx.bus.post_to_controller(
                *controller,
                ControllerMessage::DriverShiftEnd(self.id),
                ctx.tick,
            );
        }
        self.awaiting_acks = self.controllers.iter().copied().collect();
        info!(driver = %self.id, tick = ctx.tick, "shift end requested from controllers");
    }

    /// Drive toward a random nearby cell, retrying other cells when no route
    /// exists.
    fn wander(&mut self, ctx: &mut DriverContext<'_>, motion: &mut impl VehicleMotion) {
        if !self.cruise.enabled || self.parked {
            return;
        }
        let here = motion.current_location();
        let candidates: Vec<CellIndex> = grid_disk_cached(here, self.cruise.radius_cells)
            .into_iter()
            .filter(|cell| *cell != here)
            .collect();
        for _ in 0..self.cruise.attempts {
            let Some(&target) = candidates.choose(&mut self.rng) else {
                return;
            };
            if let Some(path) = ctx.route.shortest_path(here, target) {
                motion.begin_moving_to(path);
                return;
            }
        }
        debug!(driver = %self.id, "no reachable cruise target");
    }
}

impl MobilityServiceDriver for OnCallDriver {
    fn driver_id(&self) -> DriverId {
        self.id
    }

    fn service_status(&self) -> DriverStatus {
        self.status
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn passenger_count(&self) -> usize {
        self.aboard.len()
    }

    fn current_schedule(&self) -> &Schedule {
        &self.schedule
    }

    fn subscribed_controllers(&self) -> &[ControllerId] {
        &self.controllers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        cell_ring, parking, request, test_cell, FakeMotion, MatrixRouteService,
    };

    const CTRL: ControllerId = ControllerId(0);

    struct Harness {
        driver: OnCallDriver,
        motion: FakeMotion,
        route: MatrixRouteService,
        bus: MessageBus,
        telemetry: DispatchTelemetry,
        tick: u64,
    }

    impl Harness {
        fn new() -> Self {
            let cruise = CruisePolicy {
                enabled: false,
                ..CruisePolicy::default()
            };
            Self {
                driver: OnCallDriver::new(DriverId(1), 4, vec![CTRL], cruise, 7),
                motion: FakeMotion::at(test_cell()),
                route: MatrixRouteService::uniform(60.0),
                bus: MessageBus::new(1),
                telemetry: DispatchTelemetry::default(),
                tick: 0,
            }
        }

        fn step(&mut self, inbox: Vec<DriverMessage>) -> DriverOutcome {
            self.tick += 1;
            let mut ctx = DriverContext {
                tick: self.tick,
                now_ms: self.tick * 1_000,
                route: &self.route,
                bus: &mut self.bus,
                telemetry: &mut self.telemetry,
            };
            self.driver.update(&mut ctx, &mut self.motion, inbox)
        }

        fn arrive(&mut self) -> DriverOutcome {
            self.motion.finish_path();
            self.step(Vec::new())
        }

        fn sent(&mut self) -> Vec<ControllerMessage> {
            self.bus.take_for_controller(CTRL, u64::MAX)
        }
    }

    fn proposition(schedule: Schedule) -> DriverMessage {
        DriverMessage::ScheduleProposition {
            controller: CTRL,
            schedule,
        }
    }

    fn update(schedule: Schedule) -> DriverMessage {
        DriverMessage::ScheduleUpdate {
            controller: CTRL,
            schedule,
        }
    }

    #[test]
    fn first_tick_subscribes_to_every_controller() {
        let mut h = Harness::new();
        h.step(Vec::new());
        assert_eq!(h.driver.service_status(), DriverStatus::Cruising);
        assert!(matches!(
            h.sent().as_slice(),
            [ControllerMessage::DriverSubscribe(info)] if info.id == DriverId(1)
        ));
    }

    #[test]
    fn executes_schedule_and_reports_each_stop() {
        let [a, b] = cell_ring::<2>();
        let r = request(1, a, b);
        let mut h = Harness::new();
        h.step(vec![proposition(Schedule::solo(&r))]);
        assert_eq!(h.driver.service_status(), DriverStatus::DriveOnCall);
        assert_eq!(h.motion.destination(), Some(a));

        h.arrive();
        assert_eq!(h.driver.service_status(), DriverStatus::DriveWithPassenger);
        assert_eq!(h.driver.passenger_count(), 1);
        assert_eq!(h.motion.destination(), Some(b));

        h.arrive();
        assert_eq!(h.driver.service_status(), DriverStatus::Cruising);
        assert!(h.driver.current_schedule().is_empty());

        let sent = h.sent();
        let kinds: Vec<&str> = sent
            .iter()
            .map(|m| match m {
                ControllerMessage::DriverSubscribe(_) => "subscribe",
                ControllerMessage::DriverScheduleStatus { .. } => "status",
                ControllerMessage::DriverAvailable(_) => "available",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["subscribe", "status", "status", "available"]);
        assert_eq!(h.telemetry.completed_trips.len(), 1);
    }

    #[test]
    fn update_containing_current_item_keeps_it_running() {
        let [a, b, c, d] = cell_ring::<4>();
        let r1 = request(1, a, b);
        let r2 = request(2, c, d);
        let mut h = Harness::new();
        h.step(vec![proposition(Schedule::solo(&r1))]);
        assert_eq!(h.motion.destination(), Some(a));
        let paths_before = h.motion.paths_started();

        let merged = Schedule::from_items([
            ScheduleItem::Pickup(r2.clone()),
            ScheduleItem::Pickup(r1.clone()),
            ScheduleItem::Dropoff(r1.clone()),
            ScheduleItem::Dropoff(r2.clone()),
        ]);
        h.step(vec![update(merged)]);

        assert_eq!(h.motion.paths_started(), paths_before);
        assert_eq!(h.motion.destination(), Some(a));
        assert_eq!(
            h.driver.current_schedule().items(),
            &[
                ScheduleItem::Pickup(r1.clone()),
                ScheduleItem::Pickup(r2.clone()),
                ScheduleItem::Dropoff(r1),
                ScheduleItem::Dropoff(r2),
            ]
        );
    }

    #[test]
    fn update_without_current_item_preempts() {
        let [a, b, c, d] = cell_ring::<4>();
        let r1 = request(1, a, b);
        let r2 = request(2, c, d);
        let mut h = Harness::new();
        h.step(vec![proposition(Schedule::solo(&r1))]);
        h.step(vec![update(Schedule::solo(&r2))]);

        assert_eq!(h.motion.destination(), Some(c));
        assert_eq!(h.driver.current_schedule(), &Schedule::solo(&r2));
        assert_eq!(h.driver.service_status(), DriverStatus::DriveOnCall);
    }

    #[test]
    fn update_replaces_a_terminal_item_in_front() {
        let [a, b, c] = cell_ring::<3>();
        let garage = parking(1, a);
        let r = request(1, b, c);
        let mut h = Harness::new();
        h.step(vec![proposition(Schedule::from_items([ScheduleItem::Park(garage)]))]);
        assert_eq!(h.driver.service_status(), DriverStatus::DriveToParking);

        let extended = Schedule::from_items([
            ScheduleItem::Pickup(r.clone()),
            ScheduleItem::Dropoff(r),
            ScheduleItem::Park(garage),
        ]);
        h.step(vec![update(extended.clone())]);
        assert_eq!(h.driver.current_schedule(), &extended);
        assert_eq!(h.motion.destination(), Some(b));
        assert_eq!(h.driver.service_status(), DriverStatus::DriveOnCall);
    }

    #[test]
    fn stale_items_are_stripped_and_synced_back() {
        let [a, b, c, d] = cell_ring::<4>();
        let r1 = request(1, a, b);
        let r2 = request(2, c, d);
        let mut h = Harness::new();
        h.step(vec![proposition(Schedule::solo(&r1))]);
        h.arrive();
        h.sent();

        // The controller has not yet heard about the pickup.
        let stale = Schedule::from_items([
            ScheduleItem::Pickup(r1.clone()),
            ScheduleItem::Pickup(r2.clone()),
            ScheduleItem::Dropoff(r1.clone()),
            ScheduleItem::Dropoff(r2.clone()),
        ]);
        h.step(vec![update(stale)]);

        // The dropoff being driven to stays in front.
        let expected = Schedule::from_items([
            ScheduleItem::Dropoff(r1),
            ScheduleItem::Pickup(r2.clone()),
            ScheduleItem::Dropoff(r2),
        ]);
        assert_eq!(h.driver.current_schedule(), &expected);
        assert_eq!(
            h.sent(),
            vec![ControllerMessage::SyncSchedule {
                driver: DriverId(1),
                schedule: expected,
            }]
        );
    }

    #[test]
    fn unreachable_first_stop_rejects_the_proposition() {
        let [a, b] = cell_ring::<2>();
        let r = request(1, a, b);
        let mut h = Harness::new();
        h.route = MatrixRouteService::new();
        h.step(Vec::new());
        h.sent();

        h.step(vec![proposition(Schedule::solo(&r))]);
        assert!(h.driver.current_schedule().is_empty());
        assert_eq!(
            h.sent(),
            vec![ControllerMessage::SchedulePropositionReply {
                driver: DriverId(1),
                success: false,
                schedule: Schedule::solo(&r),
            }]
        );
    }

    #[test]
    fn colocated_stops_are_performed_together_in_order() {
        // Assumption: consecutive items at one cell are served in a single
        // step, in schedule order.
        let [a, b] = cell_ring::<2>();
        let r1 = request(1, a, b);
        let r2 = request(2, a, b);
        let mut h = Harness::new();
        h.step(Vec::new());
        h.sent();
        let pooled = Schedule::from_items([
            ScheduleItem::Pickup(r1.clone()),
            ScheduleItem::Pickup(r2.clone()),
            ScheduleItem::Dropoff(r1.clone()),
            ScheduleItem::Dropoff(r2.clone()),
        ]);
        h.step(vec![proposition(pooled)]);
        h.arrive();
        assert_eq!(h.driver.passenger_count(), 2);
        assert_eq!(h.motion.destination(), Some(b));

        let completed: Vec<ScheduleItem> = h
            .sent()
            .into_iter()
            .filter_map(|m| match m {
                ControllerMessage::DriverScheduleStatus { completed, .. } => Some(completed),
                _ => None,
            })
            .collect();
        assert_eq!(
            completed,
            vec![ScheduleItem::Pickup(r1), ScheduleItem::Pickup(r2)]
        );
    }

    #[test]
    fn shift_end_waits_for_every_acknowledgement() {
        let mut h = Harness::new();
        h.step(Vec::new());
        h.sent();
        h.step(vec![DriverMessage::ShiftEndRequested]);
        assert!(h.driver.is_leaving());
        assert_eq!(h.sent(), vec![ControllerMessage::DriverShiftEnd(DriverId(1))]);

        let [a, b] = cell_ring::<2>();
        assert_eq!(
            h.step(vec![proposition(Schedule::solo(&request(1, a, b)))]),
            DriverOutcome::Active
        );
        assert!(matches!(
            h.sent().as_slice(),
            [ControllerMessage::SchedulePropositionReply { success: false, .. }]
        ));

        assert_eq!(
            h.step(vec![DriverMessage::UnsubscribeSuccessful(CTRL)]),
            DriverOutcome::Departed
        );
        assert_eq!(h.driver.service_status(), DriverStatus::ShiftEnded);
    }
}
