//! Messages exchanged between drivers and controllers, and the bus that
//! delivers them.
//!
//! Delivery is FIFO per recipient with a fixed latency of at least one tick,
//! so a message posted during tick `t` is seen no earlier than tick `t + 1`.

use std::collections::{BTreeMap, VecDeque};

use bevy_ecs::prelude::Resource;

use crate::ids::{ControllerId, DriverId};
use crate::registry::DriverInfo;
use crate::schedule::{Schedule, ScheduleItem, TripRequest};

/// Messages addressed to a controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerMessage {
    TripRequest(TripRequest),
    DriverSubscribe(DriverInfo),
    /// The driver wants to leave; the controller unsubscribes it once its
    /// schedule is empty and answers with `UnsubscribeSuccessful`.
    DriverShiftEnd(DriverId),
    DriverAvailable(DriverId),
    DriverScheduleStatus {
        driver: DriverId,
        completed: ScheduleItem,
    },
    /// Only sent on failure; success is implied.
    SchedulePropositionReply {
        driver: DriverId,
        success: bool,
        schedule: Schedule,
    },
    /// The driver's copy after it dropped stale items from an update.
    SyncSchedule {
        driver: DriverId,
        schedule: Schedule,
    },
}

/// Messages addressed to a driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverMessage {
    ScheduleProposition {
        controller: ControllerId,
        schedule: Schedule,
    },
    ScheduleUpdate {
        controller: ControllerId,
        schedule: Schedule,
    },
    UnsubscribeSuccessful(ControllerId),
    ShiftEndRequested,
}

#[derive(Debug, Clone)]
struct Envelope<M> {
    deliver_at: u64,
    payload: M,
}

/// FIFO inbox for one recipient.
#[derive(Debug, Clone)]
pub struct Mailbox<M> {
    queue: VecDeque<Envelope<M>>,
}

impl<M> Default for Mailbox<M> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
}

impl<M> Mailbox<M> {
    fn push(&mut self, deliver_at: u64, payload: M) {
        self.queue.push_back(Envelope {
            deliver_at,
            payload,
        });
    }

    /// Take every message due at or before `now_tick`, in send order.
    pub fn drain_ready(&mut self, now_tick: u64) -> Vec<M> {
        let mut ready = Vec::new();
        while self
            .queue
            .front()
            .is_some_and(|envelope| envelope.deliver_at <= now_tick)
        {
            if let Some(envelope) = self.queue.pop_front() {
                ready.push(envelope.payload);
            }
        }
        ready
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[derive(Debug, Resource)]
pub struct MessageBus {
    latency_ticks: u64,
    controllers: BTreeMap<ControllerId, Mailbox<ControllerMessage>>,
    drivers: BTreeMap<DriverId, Mailbox<DriverMessage>>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(1)
    }
}

impl MessageBus {
    pub fn new(latency_ticks: u64) -> Self {
        Self {
            latency_ticks: latency_ticks.max(1),
            controllers: BTreeMap::new(),
            drivers: BTreeMap::new(),
        }
    }

    pub fn latency_ticks(&self) -> u64 {
        self.latency_ticks
    }

    pub fn post_to_controller(&mut self, to: ControllerId, message: ControllerMessage, now_tick: u64) {
        self.controllers
            .entry(to)
            .or_default()
            .push(now_tick + self.latency_ticks, message);
    }

    pub fn post_to_driver(&mut self, to: DriverId, message: DriverMessage, now_tick: u64) {
        self.drivers
            .entry(to)
            .or_default()
            .push(now_tick + self.latency_ticks, message);
    }

    pub fn take_for_controller(&mut self, id: ControllerId, now_tick: u64) -> Vec<ControllerMessage> {
        self.controllers
            .get_mut(&id)
            .map(|mailbox| mailbox.drain_ready(now_tick))
            .unwrap_or_default()
    }

    pub fn take_for_driver(&mut self, id: DriverId, now_tick: u64) -> Vec<DriverMessage> {
        self.drivers
            .get_mut(&id)
            .map(|mailbox| mailbox.drain_ready(now_tick))
            .unwrap_or_default()
    }

    pub fn pending_for_controller(&self, id: ControllerId) -> usize {
        self.controllers.get(&id).map_or(0, Mailbox::len)
    }

    pub fn pending_for_driver(&self, id: DriverId) -> usize {
        self.drivers.get(&id).map_or(0, Mailbox::len)
    }

    /// Drop a departed driver's inbox.
    pub fn remove_driver(&mut self, id: DriverId) {
        self.drivers.remove(&id);
    }
}
