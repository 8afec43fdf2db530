//! Dispatch telemetry and the audit trail.
//!
//! Every assignment, expiry, pickup, dropoff, proposition failure and
//! schedule divergence is recorded here and emitted as a `tracing` event on
//! the [`AUDIT_TARGET`] target.

use bevy_ecs::prelude::Resource;
use serde::Serialize;
use tracing::{info, warn};

use crate::ids::{ControllerId, DriverId, RequestId};
use crate::matching::AssignmentKind;
use crate::schedule::Schedule;

pub const AUDIT_TARGET: &str = "dispatch::audit";

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentRecord {
    pub tick: u64,
    pub controller: ControllerId,
    pub driver: DriverId,
    pub kind: AssignmentKind,
    pub requests: Vec<RequestId>,
    pub passengers: usize,
    pub schedule: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredRequestRecord {
    pub tick: u64,
    pub controller: ControllerId,
    pub request: RequestId,
    pub waited_ms: u64,
}

/// One served request, recorded at dropoff. Times are simulation milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTripRecord {
    pub request: RequestId,
    pub driver: DriverId,
    pub requested_at_ms: u64,
    pub pickup_at_ms: u64,
    pub dropoff_at_ms: u64,
}

impl CompletedTripRecord {
    pub fn time_to_pickup_ms(&self) -> u64 {
        self.pickup_at_ms.saturating_sub(self.requested_at_ms)
    }

    pub fn ride_duration_ms(&self) -> u64 {
        self.dropoff_at_ms.saturating_sub(self.pickup_at_ms)
    }
}

#[derive(Debug, Default, Resource)]
pub struct DispatchTelemetry {
    pub assignments: Vec<AssignmentRecord>,
    pub expired: Vec<ExpiredRequestRecord>,
    pub completed_trips: Vec<CompletedTripRecord>,
    pub pickups: usize,
    pub proposition_failures: usize,
    pub divergences: usize,
    pub rebalancing_moves: usize,
}

/// Aggregated counts for the end-of-run report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySummary {
    pub assignments: usize,
    pub shared_assignments: usize,
    pub expired_requests: usize,
    pub pickups: usize,
    pub dropoffs: usize,
    pub proposition_failures: usize,
    pub divergences: usize,
    pub rebalancing_moves: usize,
    pub mean_time_to_pickup_secs: Option<f64>,
    pub mean_ride_secs: Option<f64>,
}

impl DispatchTelemetry {
    pub fn record_assignment(
        &mut self,
        tick: u64,
        controller: ControllerId,
        driver: DriverId,
        kind: AssignmentKind,
        requests: &[RequestId],
        schedule: &Schedule,
    ) {
        let rendered = schedule.to_string();
        info!(
            target: AUDIT_TARGET,
            tick,
            controller = %controller,
            driver = %driver,
            kind = ?kind,
            requests = ?requests,
            schedule = %rendered,
            "assignment"
        );
        self.assignments.push(AssignmentRecord {
            tick,
            controller,
            driver,
            kind,
            requests: requests.to_vec(),
            passengers: schedule.passenger_count(),
            schedule: rendered,
        });
    }

    pub fn record_expired(
        &mut self,
        tick: u64,
        controller: ControllerId,
        request: RequestId,
        waited_ms: u64,
    ) {
        warn!(
            target: AUDIT_TARGET,
            tick,
            controller = %controller,
            request = %request,
            waited_ms,
            "request expired unmatched"
        );
        self.expired.push(ExpiredRequestRecord {
            tick,
            controller,
            request,
            waited_ms,
        });
    }

    pub fn record_pickup(&mut self, tick: u64, driver: DriverId, request: RequestId) {
        info!(target: AUDIT_TARGET, tick, driver = %driver, request = %request, "pickup");
        self.pickups += 1;
    }

    pub fn record_dropoff(&mut self, tick: u64, trip: CompletedTripRecord) {
        info!(
            target: AUDIT_TARGET,
            tick,
            driver = %trip.driver,
            request = %trip.request,
            ride_ms = trip.ride_duration_ms(),
            "dropoff"
        );
        self.completed_trips.push(trip);
    }

    pub fn record_proposition_failure(
        &mut self,
        tick: u64,
        controller: ControllerId,
        driver: DriverId,
        schedule: &Schedule,
    ) {
        warn!(
            target: AUDIT_TARGET,
            tick,
            controller = %controller,
            driver = %driver,
            schedule = %schedule,
            "schedule proposition failed"
        );
        self.proposition_failures += 1;
    }

    pub fn record_divergence(
        &mut self,
        tick: u64,
        controller: ControllerId,
        driver: DriverId,
        schedule: &Schedule,
    ) {
        warn!(
            target: AUDIT_TARGET,
            tick,
            controller = %controller,
            driver = %driver,
            schedule = %schedule,
            "adopting driver schedule after divergence"
        );
        self.divergences += 1;
    }

    pub fn record_rebalancing(&mut self, moves: usize) {
        self.rebalancing_moves += moves;
    }

    pub fn summary(&self) -> TelemetrySummary {
        let mean = |values: Vec<u64>| {
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<u64>() as f64 / values.len() as f64 / 1000.0)
            }
        };
        TelemetrySummary {
            assignments: self.assignments.len(),
            shared_assignments: self
                .assignments
                .iter()
                .filter(|record| record.passengers > 1)
                .count(),
            expired_requests: self.expired.len(),
            pickups: self.pickups,
            dropoffs: self.completed_trips.len(),
            proposition_failures: self.proposition_failures,
            divergences: self.divergences,
            rebalancing_moves: self.rebalancing_moves,
            mean_time_to_pickup_secs: mean(
                self.completed_trips
                    .iter()
                    .map(CompletedTripRecord::time_to_pickup_ms)
                    .collect(),
            ),
            mean_ride_secs: mean(
                self.completed_trips
                    .iter()
                    .map(CompletedTripRecord::ride_duration_ms)
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{request, test_cell, test_neighbor_cell};

    #[test]
    fn summary_counts_shared_assignments_and_trip_times() {
        let mut telemetry = DispatchTelemetry::default();
        let r1 = request(1, test_cell(), test_neighbor_cell());
        let r2 = request(2, test_cell(), test_neighbor_cell());
        let solo = Schedule::solo(&r1);
        let mut pooled = Schedule::solo(&r1);
        pooled.insert(1, crate::schedule::ScheduleItem::Pickup(r2.clone()));
        pooled.push(crate::schedule::ScheduleItem::Dropoff(r2));

        telemetry.record_assignment(1, ControllerId(0), DriverId(1), AssignmentKind::New, &[RequestId(1)], &solo);
        telemetry.record_assignment(
            2,
            ControllerId(0),
            DriverId(2),
            AssignmentKind::New,
            &[RequestId(1), RequestId(2)],
            &pooled,
        );
        telemetry.record_pickup(3, DriverId(1), RequestId(1));
        telemetry.record_dropoff(
            9,
            CompletedTripRecord {
                request: RequestId(1),
                driver: DriverId(1),
                requested_at_ms: 0,
                pickup_at_ms: 4_000,
                dropoff_at_ms: 10_000,
            },
        );
        telemetry.record_expired(10, ControllerId(0), RequestId(5), 700_000);

        let summary = telemetry.summary();
        assert_eq!(summary.assignments, 2);
        assert_eq!(summary.shared_assignments, 1);
        assert_eq!(summary.pickups, 1);
        assert_eq!(summary.dropoffs, 1);
        assert_eq!(summary.expired_requests, 1);
        assert_eq!(summary.mean_time_to_pickup_secs, Some(4.0));
        assert_eq!(summary.mean_ride_secs, Some(6.0));
    }
}
