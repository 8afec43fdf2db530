mod support;

use std::collections::BTreeSet;

use dispatch_core::ids::{ControllerId, DriverId, RequestId};
use dispatch_core::matching::MatchingStrategyKind;
use dispatch_core::message::MessageBus;
use dispatch_core::rebalancing::RebalancerKind;
use dispatch_core::runner::{on_driver_shift_end, on_driver_subscribe};
use dispatch_core::scenario::{
    build_world, schedule_requests, ControllerConfig, DispatchConfig, DriverSpawn,
    SyntheticParams, SyntheticScenario,
};
use dispatch_core::telemetry::DispatchTelemetry;
use dispatch_core::test_helpers::{cell_ring, parking, test_cell};
use support::entities::{
    completed_requests, controller, driver_count, driver_state, spawn_driver, submit_request,
};
use support::schedule::ScheduleRunner;
use support::world::{TestWorldBuilder, CONTROLLER};

const ALL_STRATEGIES: [MatchingStrategyKind; 7] = [
    MatchingStrategyKind::Greedy,
    MatchingStrategyKind::GreedyAmod,
    MatchingStrategyKind::Shared,
    MatchingStrategyKind::RtvGreedy,
    MatchingStrategyKind::Incremental,
    MatchingStrategyKind::IncrementalAmod,
    MatchingStrategyKind::Proximity,
];

#[test]
fn single_request_is_served_and_driver_freed() {
    let mut world = TestWorldBuilder::new().build();
    let mut runner = ScheduleRunner::new();
    let [pickup, dropoff] = cell_ring::<2>();
    spawn_driver(&mut world, 1, test_cell());
    submit_request(&mut world, 1, pickup, dropoff);

    let done = runner.run_until(&mut world, 300, |w| completed_requests(w).len() == 1);
    assert!(done.is_some(), "request was never served");
    runner.run(&mut world, 3);

    let ctrl = controller(&world);
    assert!(ctrl.registry().is_available(DriverId(1)));
    assert!(ctrl.queue().is_empty());
    assert_eq!(driver_state(&mut world, 1), Some((dropoff, 0)));

    let trip = &world.resource::<DispatchTelemetry>().completed_trips[0];
    assert_eq!(trip.driver, DriverId(1));
    assert!(trip.pickup_at_ms < trip.dropoff_at_ms);
}

#[test]
fn idle_driver_leaves_after_shift_end_handshake() {
    let mut world = TestWorldBuilder::new().build();
    let mut runner = ScheduleRunner::new();
    spawn_driver(&mut world, 1, test_cell());
    runner.run(&mut world, 3);
    assert!(controller(&world).registry().is_subscribed(DriverId(1)));

    on_driver_shift_end(&mut world, DriverId(1));
    let gone = runner.run_until(&mut world, 20, |w| driver_count(w) == 0);
    assert!(gone.is_some(), "driver never departed");
    assert!(controller(&world).registry().is_empty());
    assert_eq!(
        world.resource::<MessageBus>().pending_for_driver(DriverId(1)),
        0
    );
}

#[test]
fn driver_finishes_its_trip_before_leaving() {
    let mut world = TestWorldBuilder::new().build();
    let mut runner = ScheduleRunner::new();
    let [pickup, dropoff] = cell_ring::<2>();
    spawn_driver(&mut world, 1, pickup);
    submit_request(&mut world, 1, pickup, dropoff);
    runner.run(&mut world, 5);

    on_driver_shift_end(&mut world, DriverId(1));
    runner.run(&mut world, 5);
    assert_eq!(driver_count(&mut world), 1);

    let gone = runner.run_until(&mut world, 200, |w| driver_count(w) == 0);
    assert!(gone.is_some(), "driver never departed");
    assert_eq!(completed_requests(&world), vec![RequestId(1)]);
    assert!(!controller(&world).registry().is_subscribed(DriverId(1)));
}

#[test]
fn unknown_controller_rejects_driver() {
    let mut world = TestWorldBuilder::new().build();
    let spawn = DriverSpawn::new(DriverId(1), test_cell()).with_controllers(vec![ControllerId(9)]);
    assert!(on_driver_subscribe(&mut world, spawn).is_err());
    assert_eq!(driver_count(&mut world), 0);
}

// Riders waiting at the same corner are picked up in one stop, in schedule
// order, and never wait for a second arrival.
#[test]
fn colocated_pickups_happen_in_one_stop() {
    let mut world = TestWorldBuilder::new()
        .with_strategy(MatchingStrategyKind::Shared)
        .build();
    let mut runner = ScheduleRunner::new();
    let [pickup, dropoff] = cell_ring::<2>();
    spawn_driver(&mut world, 1, test_cell());
    submit_request(&mut world, 1, pickup, dropoff);
    submit_request(&mut world, 2, pickup, dropoff);

    let done = runner.run_until(&mut world, 300, |w| completed_requests(w).len() == 2);
    assert!(done.is_some(), "pooled requests were not served");

    let telemetry = world.resource::<DispatchTelemetry>();
    let trips = &telemetry.completed_trips;
    assert_eq!(trips[0].driver, trips[1].driver);
    assert_eq!(trips[0].pickup_at_ms, trips[1].pickup_at_ms);
    assert_eq!(trips[0].dropoff_at_ms, trips[1].dropoff_at_ms);
    assert_eq!(telemetry.summary().shared_assignments, 1);
}

#[test]
fn every_strategy_keeps_the_registry_consistent() {
    let cells = cell_ring::<20>();
    for kind in ALL_STRATEGIES {
        let mut world = TestWorldBuilder::new()
            .with_strategy(kind)
            .with_parking(vec![parking(1, test_cell())])
            .build();
        let mut runner = ScheduleRunner::new();
        for (i, cell) in cells[..3].iter().enumerate() {
            spawn_driver(&mut world, i as u32 + 1, *cell);
        }
        for i in 0..6u64 {
            submit_request(&mut world, i + 1, cells[3 + i as usize], cells[10 + i as usize]);
        }

        runner.run_checked(&mut world, 900, |w, tick| {
            if tick == 20 {
                for i in 6..9u64 {
                    submit_request(w, i + 1, cells[3 + i as usize], cells[10 + i as usize]);
                }
            }
            let ctrl = controller(w);
            if let Err(err) = ctrl.registry().check_invariants() {
                panic!("{kind:?} at tick {tick}: {err}");
            }
            for record in ctrl.registry().subscribed() {
                for id in record.schedule.request_ids() {
                    assert!(
                        !ctrl.queue().contains(id),
                        "{kind:?} at tick {tick}: {id} both queued and scheduled"
                    );
                }
            }
        });

        let telemetry = world.resource::<DispatchTelemetry>();
        let served: BTreeSet<RequestId> =
            telemetry.completed_trips.iter().map(|t| t.request).collect();
        let expired: BTreeSet<RequestId> = telemetry.expired.iter().map(|e| e.request).collect();
        assert!(served.is_disjoint(&expired), "{kind:?}");
        assert_eq!(served.len() + expired.len(), 9, "{kind:?}");
        assert!(!served.is_empty(), "{kind:?} served nothing");
        assert_eq!(served.len(), telemetry.completed_trips.len(), "{kind:?} served twice");
    }
}

fn random_rebalancer() -> RebalancerKind {
    RebalancerKind::Random {
        probability: 1.0,
        history_ms: 600_000,
    }
}

// The move is sent before the driver hears about its shift end, so it is
// rejected after the controller has already unsubscribed the driver.
#[test]
fn rebalancing_move_crossing_a_shift_end_is_absorbed() {
    let mut world = TestWorldBuilder::new()
        .with_rebalancer(random_rebalancer())
        .with_max_waiting_secs(10.0)
        .with_latency_ticks(2)
        .build();
    let mut runner = ScheduleRunner::new();
    let [pickup, dropoff] = cell_ring::<2>();
    spawn_driver(&mut world, 1, test_cell());
    runner.run(&mut world, 3);
    assert!(controller(&world).registry().is_subscribed(DriverId(1)));

    // Thirty seconds away with ten to spare: never matched.
    submit_request(&mut world, 1, pickup, dropoff);
    on_driver_shift_end(&mut world, DriverId(1));

    let gone = runner.run_until(&mut world, 20, |w| {
        assert!(controller(w).registry().check_invariants().is_ok());
        driver_count(w) == 0
    });
    assert!(gone.is_some(), "driver never departed");
    runner.run(&mut world, 3);

    assert!(controller(&world).registry().is_empty());
    assert!(controller(&world).cruise_moves().is_empty());
    let telemetry = world.resource::<DispatchTelemetry>();
    assert_eq!(telemetry.rebalancing_moves, 1);
    assert_eq!(telemetry.proposition_failures, 1);
    assert!(telemetry.completed_trips.is_empty());
}

#[test]
fn every_rebalancer_runs_alongside_shift_ends() {
    let cells = cell_ring::<20>();
    let rebalancers = [
        RebalancerKind::NoOp,
        random_rebalancer(),
        RebalancerKind::Optimized {
            zone_resolution: 10,
            history_ms: 600_000,
            max_problem_size: 1_000,
            solver_timeout_ms: 1_000,
        },
    ];
    for kind in rebalancers {
        let mut world = TestWorldBuilder::new()
            .with_rebalancer(kind.clone())
            .with_period_ticks(5)
            .build();
        let mut runner = ScheduleRunner::new();
        for (i, cell) in cells[..3].iter().enumerate() {
            spawn_driver(&mut world, i as u32 + 1, *cell);
        }
        for i in 0..6u64 {
            submit_request(&mut world, i + 1, cells[3 + i as usize], cells[10 + i as usize]);
        }

        runner.run_checked(&mut world, 900, |w, tick| {
            match tick {
                40 => on_driver_shift_end(w, DriverId(3)),
                150 => on_driver_shift_end(w, DriverId(2)),
                300 => {
                    for i in 6..8u64 {
                        submit_request(w, i + 1, cells[3 + i as usize], cells[12 + i as usize]);
                    }
                }
                _ => {}
            }
            if let Err(err) = controller(w).registry().check_invariants() {
                panic!("{kind:?} at tick {tick}: {err}");
            }
        });

        assert_eq!(driver_count(&mut world), 1, "{kind:?}");
        let ctrl = controller(&world);
        assert!(ctrl.registry().is_subscribed(DriverId(1)), "{kind:?}");
        assert_eq!(ctrl.registry().len(), 1, "{kind:?}");

        let telemetry = world.resource::<DispatchTelemetry>();
        assert_eq!(
            telemetry.completed_trips.len() + telemetry.expired.len(),
            8,
            "{kind:?}"
        );
        match kind {
            RebalancerKind::NoOp => assert_eq!(telemetry.rebalancing_moves, 0),
            _ => assert!(telemetry.rebalancing_moves > 0, "{kind:?} never moved a driver"),
        }
    }
}

#[test]
fn synthetic_fleet_serves_requests_on_the_h3_grid() {
    let config = DispatchConfig::default()
        .with_seed(5)
        .with_controllers(vec![ControllerConfig::new(CONTROLLER).with_period_ticks(5)]);
    let mut world = build_world(&config);
    let params = SyntheticParams::default()
        .with_seed(5)
        .with_counts(10, 30)
        .with_request_window_mins(10)
        .with_trip_cells(2, 6);
    let scenario = SyntheticScenario::generate(&params, &[CONTROLLER]);
    let fleet_size = scenario.drivers.len();
    for spawn in scenario.drivers {
        on_driver_subscribe(&mut world, spawn).expect("known controller");
    }
    schedule_requests(&mut world, scenario.demand);

    let mut runner = ScheduleRunner::new();
    runner.run_checked(&mut world, 1_800, |w, tick| {
        if tick % 60 == 0 {
            let ctrl = controller(w);
            assert!(ctrl.registry().check_invariants().is_ok(), "tick {tick}");
        }
    });

    let summary = world.resource::<DispatchTelemetry>().summary();
    assert!(summary.dropoffs > 0, "{summary:?}");
    assert!(summary.dropoffs + summary.expired_requests <= 30);
    assert_eq!(controller(&world).registry().len(), fleet_size);
}
