//! Trip requests and the ordered stop lists that drivers execute.

use std::collections::BTreeSet;
use std::fmt;

use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{ParkingId, RequestId, RiderId};
use crate::spatial::{cell_serde, CentroidAccumulator};

/// Extra ride time a rider accepts over the direct trip when nothing else is set.
pub const DEFAULT_EXTRA_TRIP_TIME_SECS: f64 = 300.0;

/// A rider's request to travel from `pickup` to `dropoff`.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRequest {
    pub id: RequestId,
    pub rider: RiderId,
    pub issued_at_ms: u64,
    pub pickup: CellIndex,
    pub dropoff: CellIndex,
    /// Rider-declared tolerance on top of the direct travel time.
    pub extra_trip_time_secs: f64,
    /// Whether the rider accepts sharing the vehicle.
    pub shareable: bool,
}

impl TripRequest {
    pub fn new(
        id: RequestId,
        rider: RiderId,
        issued_at_ms: u64,
        pickup: CellIndex,
        dropoff: CellIndex,
    ) -> Self {
        Self {
            id,
            rider,
            issued_at_ms,
            pickup,
            dropoff,
            extra_trip_time_secs: DEFAULT_EXTRA_TRIP_TIME_SECS,
            shareable: true,
        }
    }

    pub fn with_extra_trip_time_secs(mut self, secs: f64) -> Self {
        self.extra_trip_time_secs = secs;
        self
    }

    pub fn with_shareable(mut self, shareable: bool) -> Self {
        self.shareable = shareable;
        self
    }

    pub fn issued_at_secs(&self) -> f64 {
        self.issued_at_ms as f64 / 1000.0
    }
}

/// A parking location drivers can be sent to once their work is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkingFacility {
    pub id: ParkingId,
    #[serde(with = "cell_serde")]
    pub location: CellIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScheduleItemKind {
    Pickup,
    Dropoff,
    Cruise,
    Park,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleItem {
    Pickup(TripRequest),
    Dropoff(TripRequest),
    Cruise(CellIndex),
    Park(ParkingFacility),
}

impl ScheduleItem {
    pub fn kind(&self) -> ScheduleItemKind {
        match self {
            Self::Pickup(_) => ScheduleItemKind::Pickup,
            Self::Dropoff(_) => ScheduleItemKind::Dropoff,
            Self::Cruise(_) => ScheduleItemKind::Cruise,
            Self::Park(_) => ScheduleItemKind::Park,
        }
    }

    pub fn location(&self) -> CellIndex {
        match self {
            Self::Pickup(request) => request.pickup,
            Self::Dropoff(request) => request.dropoff,
            Self::Cruise(cell) => *cell,
            Self::Park(facility) => facility.location,
        }
    }

    pub fn request(&self) -> Option<&TripRequest> {
        match self {
            Self::Pickup(request) | Self::Dropoff(request) => Some(request),
            Self::Cruise(_) | Self::Park(_) => None,
        }
    }

    pub fn request_id(&self) -> Option<RequestId> {
        self.request().map(|request| request.id)
    }

    /// Cruise and park items may only close a schedule.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cruise(_) | Self::Park(_))
    }
}

impl fmt::Display for ScheduleItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pickup(request) => write!(f, "PICKUP({})", request.id),
            Self::Dropoff(request) => write!(f, "DROPOFF({})", request.id),
            Self::Cruise(cell) => write!(f, "CRUISE({cell})"),
            Self::Park(facility) => write!(f, "PARK({})", facility.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("{item} appears more than once")]
    DuplicateItem { item: String },
    #[error("dropoff of {0} is scheduled before its pickup")]
    DropoffBeforePickup(RequestId),
    #[error("pickup of {0} has no matching dropoff")]
    MissingDropoff(RequestId),
    #[error("{aboard} riders aboard exceeds capacity {capacity}")]
    CapacityExceeded { aboard: usize, capacity: usize },
    #[error("terminal item at position {index} is not last")]
    TerminalNotLast { index: usize },
}

/// Ordered list of stops for one driver. The front item is the one being
/// executed.
///
/// The passenger count (one per DROPOFF item) and the dropoff centroid are
/// maintained incrementally on every mutation.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    items: Vec<ScheduleItem>,
    dropoffs: CentroidAccumulator,
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct trip for one request: pickup then dropoff.
    pub fn solo(request: &TripRequest) -> Self {
        Self::from_items([
            ScheduleItem::Pickup(request.clone()),
            ScheduleItem::Dropoff(request.clone()),
        ])
    }

    pub fn from_items(items: impl IntoIterator<Item = ScheduleItem>) -> Self {
        let mut schedule = Self::new();
        for item in items {
            schedule.push(item);
        }
        schedule
    }

    fn track_added(&mut self, item: &ScheduleItem) {
        if let ScheduleItem::Dropoff(request) = item {
            self.dropoffs.add(request.dropoff);
        }
    }

    fn track_removed(&mut self, item: &ScheduleItem) {
        if let ScheduleItem::Dropoff(request) = item {
            self.dropoffs.remove(request.dropoff);
        }
    }

    pub fn push(&mut self, item: ScheduleItem) {
        self.track_added(&item);
        self.items.push(item);
    }

    /// Insert at `index`, clamped to the end.
    pub fn insert(&mut self, index: usize, item: ScheduleItem) {
        self.track_added(&item);
        let index = index.min(self.items.len());
        self.items.insert(index, item);
    }

    pub fn remove(&mut self, index: usize) -> Option<ScheduleItem> {
        if index >= self.items.len() {
            return None;
        }
        let item = self.items.remove(index);
        self.track_removed(&item);
        Some(item)
    }

    /// Remove the first item equal to `item`; returns whether one was found.
    pub fn remove_item(&mut self, item: &ScheduleItem) -> bool {
        match self.position(item) {
            Some(index) => self.remove(index).is_some(),
            None => false,
        }
    }

    pub fn pop_front(&mut self) -> Option<ScheduleItem> {
        self.remove(0)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.dropoffs = CentroidAccumulator::default();
    }

    pub fn front(&self) -> Option<&ScheduleItem> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&ScheduleItem> {
        self.items.last()
    }

    pub fn get(&self, index: usize) -> Option<&ScheduleItem> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[ScheduleItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScheduleItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &ScheduleItem) -> bool {
        self.items.contains(item)
    }

    pub fn position(&self, item: &ScheduleItem) -> Option<usize> {
        self.items.iter().position(|candidate| candidate == item)
    }

    /// Riders this schedule is responsible for: one per DROPOFF item, whether
    /// they are already aboard or still waiting.
    pub fn passenger_count(&self) -> usize {
        self.dropoffs.count()
    }

    /// Cell nearest the mean dropoff position.
    pub fn dropoff_centroid(&self) -> Option<CellIndex> {
        self.dropoffs.centroid()
    }

    /// Index of the first CRUISE/PARK item, if any.
    pub fn terminal_index(&self) -> Option<usize> {
        self.items.iter().position(ScheduleItem::is_terminal)
    }

    pub fn terminal(&self) -> Option<&ScheduleItem> {
        self.terminal_index().and_then(|index| self.items.get(index))
    }

    /// Index of the first DROPOFF item, if any.
    pub fn first_dropoff_index(&self) -> Option<usize> {
        self.items
            .iter()
            .position(|item| matches!(item, ScheduleItem::Dropoff(_)))
    }

    /// Distinct requests referenced by the schedule, in first-appearance order.
    pub fn request_ids(&self) -> Vec<RequestId> {
        let mut seen = BTreeSet::new();
        self.items
            .iter()
            .filter_map(ScheduleItem::request_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Requests whose pickup is still part of the schedule.
    pub fn pending_pickups(&self) -> impl Iterator<Item = &TripRequest> {
        self.items.iter().filter_map(|item| match item {
            ScheduleItem::Pickup(request) => Some(request),
            _ => None,
        })
    }

    /// Number of leading items that share the front item's location.
    pub fn colocated_prefix_len(&self) -> usize {
        let Some(front) = self.front() else {
            return 0;
        };
        let location = front.location();
        self.items
            .iter()
            .take_while(|item| item.location() == location)
            .count()
    }

    /// Whether every request in the schedule accepts sharing.
    pub fn is_shareable(&self) -> bool {
        self.items
            .iter()
            .filter_map(ScheduleItem::request)
            .all(|request| request.shareable)
    }

    /// Check structural validity: no duplicates, pickups before dropoffs,
    /// every pickup dropped off, capacity respected at every prefix, and
    /// terminal items only at the end.
    ///
    /// A DROPOFF without a PICKUP in the schedule is a rider already aboard.
    pub fn validate(&self, capacity: usize) -> Result<(), ScheduleError> {
        let pickups: BTreeSet<RequestId> = self.pending_pickups().map(|r| r.id).collect();
        let mut aboard = self
            .items
            .iter()
            .filter(|item| match item {
                ScheduleItem::Dropoff(request) => !pickups.contains(&request.id),
                _ => false,
            })
            .count();
        if aboard > capacity {
            return Err(ScheduleError::CapacityExceeded { aboard, capacity });
        }

        let mut picked = BTreeSet::new();
        let mut dropped = BTreeSet::new();
        let last = self.items.len().saturating_sub(1);
        for (index, item) in self.items.iter().enumerate() {
            match item {
                ScheduleItem::Pickup(request) => {
                    if dropped.contains(&request.id) {
                        return Err(ScheduleError::DropoffBeforePickup(request.id));
                    }
                    if !picked.insert(request.id) {
                        return Err(ScheduleError::DuplicateItem {
                            item: item.to_string(),
                        });
                    }
                    aboard += 1;
                    if aboard > capacity {
                        return Err(ScheduleError::CapacityExceeded { aboard, capacity });
                    }
                }
                ScheduleItem::Dropoff(request) => {
                    if !dropped.insert(request.id) {
                        return Err(ScheduleError::DuplicateItem {
                            item: item.to_string(),
                        });
                    }
                    if pickups.contains(&request.id) && !picked.contains(&request.id) {
                        return Err(ScheduleError::DropoffBeforePickup(request.id));
                    }
                    aboard = aboard.saturating_sub(1);
                }
                ScheduleItem::Cruise(_) | ScheduleItem::Park(_) => {
                    if index != last {
                        return Err(ScheduleError::TerminalNotLast { index });
                    }
                }
            }
        }
        match picked.difference(&dropped).next() {
            Some(id) => Err(ScheduleError::MissingDropoff(*id)),
            None => Ok(()),
        }
    }
}

impl<'a> IntoIterator for &'a Schedule {
    type Item = &'a ScheduleItem;
    type IntoIter = std::slice::Iter<'a, ScheduleItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<ScheduleItem> for Schedule {
    fn from_iter<T: IntoIterator<Item = ScheduleItem>>(iter: T) -> Self {
        Self::from_items(iter)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (index, item) in self.items.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{item}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{request, test_cell, test_distant_cell, test_neighbor_cell};

    #[test]
    fn passenger_count_tracks_dropoffs() {
        let r1 = request(1, test_cell(), test_neighbor_cell());
        let r2 = request(2, test_cell(), test_distant_cell());
        let mut schedule = Schedule::solo(&r1);
        assert_eq!(schedule.passenger_count(), 1);
        schedule.insert(1, ScheduleItem::Pickup(r2.clone()));
        schedule.push(ScheduleItem::Dropoff(r2.clone()));
        assert_eq!(schedule.passenger_count(), 2);
        assert!(schedule.remove_item(&ScheduleItem::Dropoff(r1.clone())));
        assert_eq!(schedule.passenger_count(), 1);
        assert_eq!(schedule.dropoff_centroid(), Some(test_distant_cell()));
        schedule.clear();
        assert_eq!(schedule.passenger_count(), 0);
        assert_eq!(schedule.dropoff_centroid(), None);
    }

    #[test]
    fn validate_accepts_riders_already_aboard() {
        let r1 = request(1, test_cell(), test_neighbor_cell());
        let r2 = request(2, test_cell(), test_distant_cell());
        let schedule = Schedule::from_items([
            ScheduleItem::Dropoff(r1),
            ScheduleItem::Pickup(r2.clone()),
            ScheduleItem::Dropoff(r2),
        ]);
        assert_eq!(schedule.validate(2), Ok(()));
        assert_eq!(
            schedule.validate(1),
            Err(ScheduleError::CapacityExceeded {
                aboard: 2,
                capacity: 1
            })
        );
    }

    #[test]
    fn validate_rejects_bad_orderings() {
        let r1 = request(1, test_cell(), test_neighbor_cell());
        let reversed = Schedule::from_items([
            ScheduleItem::Dropoff(r1.clone()),
            ScheduleItem::Pickup(r1.clone()),
        ]);
        assert_eq!(
            reversed.validate(4),
            Err(ScheduleError::DropoffBeforePickup(r1.id))
        );

        let dangling = Schedule::from_items([ScheduleItem::Pickup(r1.clone())]);
        assert_eq!(
            dangling.validate(4),
            Err(ScheduleError::MissingDropoff(r1.id))
        );

        let doubled = Schedule::from_items([
            ScheduleItem::Pickup(r1.clone()),
            ScheduleItem::Pickup(r1.clone()),
            ScheduleItem::Dropoff(r1.clone()),
        ]);
        assert!(matches!(
            doubled.validate(4),
            Err(ScheduleError::DuplicateItem { .. })
        ));

        let early_cruise = Schedule::from_items([
            ScheduleItem::Cruise(test_cell()),
            ScheduleItem::Pickup(r1.clone()),
            ScheduleItem::Dropoff(r1),
        ]);
        assert_eq!(
            early_cruise.validate(4),
            Err(ScheduleError::TerminalNotLast { index: 0 })
        );
    }

    #[test]
    fn colocated_prefix_counts_items_at_front_location() {
        let r1 = request(1, test_cell(), test_neighbor_cell());
        let r2 = request(2, test_cell(), test_neighbor_cell());
        let schedule = Schedule::from_items([
            ScheduleItem::Pickup(r1.clone()),
            ScheduleItem::Pickup(r2.clone()),
            ScheduleItem::Dropoff(r1),
            ScheduleItem::Dropoff(r2),
        ]);
        assert_eq!(schedule.colocated_prefix_len(), 2);
        assert_eq!(schedule.request_ids(), vec![RequestId(1), RequestId(2)]);
        assert_eq!(Schedule::new().colocated_prefix_len(), 0);
    }

    #[test]
    fn display_lists_items_in_order() {
        let r1 = request(4, test_cell(), test_neighbor_cell());
        let schedule = Schedule::solo(&r1);
        assert_eq!(schedule.to_string(), "[PICKUP(req-4), DROPOFF(req-4)]");
    }
}
