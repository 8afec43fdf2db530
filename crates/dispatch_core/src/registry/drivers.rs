use std::collections::{BTreeMap, BTreeSet};

use h3o::CellIndex;

use crate::driver::DriverStatus;
use crate::error::{DispatchError, DispatchResult};
use crate::ids::DriverId;
use crate::schedule::{Schedule, ScheduleItem};

/// What a driver announces when it subscribes to a controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverInfo {
    pub id: DriverId,
    pub capacity: usize,
    pub location: CellIndex,
}

/// The controller's view of one subscribed driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverRecord {
    pub id: DriverId,
    pub capacity: usize,
    pub location: CellIndex,
    pub status: DriverStatus,
    /// The controller's copy of the driver's schedule. Empty means available.
    pub schedule: Schedule,
    /// The driver asked to end its shift and is unsubscribed as soon as its
    /// schedule drains.
    pub shift_end_pending: bool,
}

impl DriverRecord {
    fn new(info: DriverInfo) -> Self {
        Self {
            id: info.id,
            capacity: info.capacity,
            location: info.location,
            status: DriverStatus::Cruising,
            schedule: Schedule::new(),
            shift_end_pending: false,
        }
    }

    /// Can receive new work from the matching strategies.
    pub fn is_eligible(&self) -> bool {
        !self.shift_end_pending
    }
}

/// Subscribed drivers partitioned into available (empty schedule) and busy
/// (non-empty schedule).
///
/// The available list keeps the order in which drivers became available;
/// strategies scan it front to back and the first candidate wins ties.
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    records: BTreeMap<DriverId, DriverRecord>,
    available: Vec<DriverId>,
    busy: BTreeSet<DriverId>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, info: DriverInfo) -> DispatchResult<()> {
        if self.records.contains_key(&info.id) {
            return Err(DispatchError::AlreadySubscribed(info.id));
        }
        self.records.insert(info.id, DriverRecord::new(info));
        self.available.push(info.id);
        Ok(())
    }

    /// Remove a driver whose schedule is empty.
    pub fn unsubscribe(&mut self, id: DriverId) -> DispatchResult<DriverRecord> {
        let record = self.record(id)?;
        if !record.schedule.is_empty() {
            return Err(DispatchError::ScheduleNotEmpty {
                driver: id,
                remaining: record.schedule.len(),
            });
        }
        self.available.retain(|candidate| *candidate != id);
        self.busy.remove(&id);
        self.records
            .remove(&id)
            .ok_or(DispatchError::NotSubscribed(id))
    }

    /// Clear the driver's schedule and move it to the back of the available list.
    /// A driver that is already available keeps its position.
    pub fn mark_available(&mut self, id: DriverId) -> DispatchResult<()> {
        let record = self.record_mut(id)?;
        record.schedule.clear();
        if self.busy.remove(&id) {
            self.available.push(id);
        }
        Ok(())
    }

    /// Hand a fresh schedule to an available driver.
    pub fn mark_busy(&mut self, id: DriverId, schedule: Schedule) -> DispatchResult<()> {
        if schedule.is_empty() {
            return Err(DispatchError::EmptySchedule(id));
        }
        let is_available = self.available.contains(&id);
        let record = self.record_mut(id)?;
        if !is_available || !record.schedule.is_empty() {
            return Err(DispatchError::DriverNotAvailable(id));
        }
        record.schedule = schedule;
        self.available.retain(|candidate| *candidate != id);
        self.busy.insert(id);
        Ok(())
    }

    /// Replace the driver's schedule and move it to the partition that matches.
    pub fn update_schedule(&mut self, id: DriverId, schedule: Schedule) -> DispatchResult<()> {
        let record = self.record_mut(id)?;
        let now_empty = schedule.is_empty();
        record.schedule = schedule;
        self.place(id, now_empty);
        Ok(())
    }

    /// Apply a driver's completion report to the controller copy.
    ///
    /// Returns whether the item was still in the copy. A copy that empties
    /// this way makes the driver available.
    pub fn record_item_completed(
        &mut self,
        id: DriverId,
        item: &ScheduleItem,
    ) -> DispatchResult<bool> {
        let record = self.record_mut(id)?;
        let found = record.schedule.remove_item(item);
        let now_empty = record.schedule.is_empty();
        if found {
            self.place(id, now_empty);
        }
        Ok(found)
    }

    fn place(&mut self, id: DriverId, empty: bool) {
        if empty {
            if self.busy.remove(&id) {
                self.available.push(id);
            }
        } else if self.busy.insert(id) {
            self.available.retain(|candidate| *candidate != id);
        }
    }

    pub fn refresh(&mut self, id: DriverId, location: CellIndex, status: DriverStatus) {
        if let Some(record) = self.records.get_mut(&id) {
            record.location = location;
            record.status = status;
        }
    }

    /// Flag the driver for unsubscription. Returns `true` when its schedule is
    /// already empty and it can be unsubscribed right away.
    pub fn request_shift_end(&mut self, id: DriverId) -> DispatchResult<bool> {
        let record = self.record_mut(id)?;
        record.shift_end_pending = true;
        Ok(record.schedule.is_empty())
    }

    pub fn get(&self, id: DriverId) -> Option<&DriverRecord> {
        self.records.get(&id)
    }

    fn record(&self, id: DriverId) -> DispatchResult<&DriverRecord> {
        self.records.get(&id).ok_or(DispatchError::NotSubscribed(id))
    }

    fn record_mut(&mut self, id: DriverId) -> DispatchResult<&mut DriverRecord> {
        self.records
            .get_mut(&id)
            .ok_or(DispatchError::NotSubscribed(id))
    }

    pub fn is_subscribed(&self, id: DriverId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn is_available(&self, id: DriverId) -> bool {
        self.available.contains(&id)
    }

    /// Available drivers in availability order.
    pub fn available(&self) -> impl Iterator<Item = &DriverRecord> {
        self.available
            .iter()
            .filter_map(|id| self.records.get(id))
    }

    /// Available drivers that may receive new work.
    pub fn eligible_available(&self) -> impl Iterator<Item = &DriverRecord> {
        self.available().filter(|record| record.is_eligible())
    }

    /// Busy drivers in id order.
    pub fn busy(&self) -> impl Iterator<Item = &DriverRecord> {
        self.busy.iter().filter_map(|id| self.records.get(id))
    }

    pub fn eligible_busy(&self) -> impl Iterator<Item = &DriverRecord> {
        self.busy().filter(|record| record.is_eligible())
    }

    /// Every subscribed driver in id order.
    pub fn subscribed(&self) -> impl Iterator<Item = &DriverRecord> {
        self.records.values()
    }

    pub fn eligible(&self) -> impl Iterator<Item = &DriverRecord> {
        self.subscribed().filter(|record| record.is_eligible())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn available_len(&self) -> usize {
        self.available.len()
    }

    pub fn busy_len(&self) -> usize {
        self.busy.len()
    }

    /// Verify the partition: every subscribed driver is in exactly one of
    /// available/busy, available drivers have empty schedules and busy
    /// drivers non-empty ones.
    pub fn check_invariants(&self) -> DispatchResult<()> {
        let inconsistent = |msg: String| Err(DispatchError::RegistryInconsistent(msg));
        if self.available.len() + self.busy.len() != self.records.len() {
            return inconsistent(format!(
                "{} available + {} busy != {} subscribed",
                self.available.len(),
                self.busy.len(),
                self.records.len()
            ));
        }
        let mut seen = BTreeSet::new();
        for id in &self.available {
            if !seen.insert(*id) {
                return inconsistent(format!("{id} listed twice as available"));
            }
            if self.busy.contains(id) {
                return inconsistent(format!("{id} is both available and busy"));
            }
            match self.records.get(id) {
                None => return inconsistent(format!("{id} is available but not subscribed")),
                Some(record) if !record.schedule.is_empty() => {
                    return inconsistent(format!("{id} is available with a non-empty schedule"))
                }
                Some(_) => {}
            }
        }
        for id in &self.busy {
            match self.records.get(id) {
                None => return inconsistent(format!("{id} is busy but not subscribed")),
                Some(record) if record.schedule.is_empty() => {
                    return inconsistent(format!("{id} is busy with an empty schedule"))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
