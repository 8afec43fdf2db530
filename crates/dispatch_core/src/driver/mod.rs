//! Vehicle agents.
//!
//! [`OnCallDriver`] executes the schedules controllers send it, reports every
//! completed stop and negotiates its shift end. Movement is delegated to a
//! [`VehicleMotion`] implementation so the agent logic does not depend on the
//! ECS components that move it.

mod on_call;

use h3o::CellIndex;

use crate::ids::{ControllerId, DriverId};
use crate::schedule::{ParkingFacility, Schedule};

pub use on_call::{CruisePolicy, DriverContext, DriverOutcome, OnCallDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverStatus {
    /// Spawned, not yet subscribed to any controller.
    DriveStart,
    /// Idle and free to wander.
    Cruising,
    /// Heading to a pickup with nobody aboard.
    DriveOnCall,
    DriveWithPassenger,
    DriveToParking,
    Parked,
    /// Unsubscribed everywhere; about to be removed.
    ShiftEnded,
}

impl DriverStatus {
    /// States in which a driver with an empty schedule may end its shift.
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Cruising | Self::Parked)
    }
}

/// What controllers may learn about a driver agent.
pub trait MobilityServiceDriver {
    fn driver_id(&self) -> DriverId;
    fn service_status(&self) -> DriverStatus;
    fn capacity(&self) -> usize;
    fn passenger_count(&self) -> usize;
    fn current_schedule(&self) -> &Schedule;
    fn subscribed_controllers(&self) -> &[ControllerId];
}

/// The vehicle body a driver steers.
pub trait VehicleMotion {
    fn current_location(&self) -> CellIndex;
    /// Follow `path` (which may start at the current cell) until its end.
    fn begin_moving_to(&mut self, path: Vec<CellIndex>);
    fn park_at(&mut self, facility: &ParkingFacility);
    /// No path left to follow.
    fn has_arrived(&self) -> bool;
    fn halt(&mut self);
}
