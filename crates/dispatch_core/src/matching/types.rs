use crate::ids::{DriverId, RequestId};
use crate::schedule::Schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentKind {
    /// The driver was available; committing proposes a fresh schedule.
    New,
    /// The driver was busy; committing replaces its schedule.
    Update,
}

/// A schedule a strategy wants to hand to a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub driver: DriverId,
    pub schedule: Schedule,
    pub kind: AssignmentKind,
    /// Queued requests this assignment takes out of the queue.
    pub new_requests: Vec<RequestId>,
}

impl Assignment {
    pub fn new_schedule(driver: DriverId, schedule: Schedule) -> Self {
        let new_requests = schedule.request_ids();
        Self {
            driver,
            schedule,
            kind: AssignmentKind::New,
            new_requests,
        }
    }

    pub fn update(driver: DriverId, schedule: Schedule, new_requests: Vec<RequestId>) -> Self {
        Self {
            driver,
            schedule,
            kind: AssignmentKind::Update,
            new_requests,
        }
    }
}
