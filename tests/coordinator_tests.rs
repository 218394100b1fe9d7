//! End-to-end coordinator tests
//!
//! Planning passes, bookings, cancellations and the accessor views.

mod fixtures;

use std::collections::BTreeSet;
use std::thread;

use truckload_planner::config::{CapacityOptions, PlannerConfig};
use truckload_planner::error::ErrorKind;
use truckload_planner::model::{
    Coordinates, DateWindow, LoadId, RequestId, RequestStatus, SizeCategory, SizeMix, UnassignedReason,
};
use truckload_planner::traits::DistanceMatrixProvider;
use truckload_planner::{AssignmentCoordinator, BookingRequest};

use fixtures::*;

// ============================================================================
// Helpers
// ============================================================================

fn five_small_one_large() -> Vec<truckload_planner::Request> {
    use SizeCategory::*;
    requests_in(&MIDTOWN[..1], &[Small, Small, Small, Small, Small, Large])
}

fn coordinator(config: PlannerConfig, requests: Vec<truckload_planner::Request>) -> AssignmentCoordinator {
    AssignmentCoordinator::new(config, requests).unwrap()
}

fn status(coordinator: &AssignmentCoordinator, id: u64) -> RequestStatus {
    coordinator.snapshot().request(RequestId(id)).unwrap().status
}

struct FailingMatrix;

impl DistanceMatrixProvider for FailingMatrix {
    fn matrix_for(&self, _locations: &[Coordinates]) -> Vec<Vec<f64>> {
        Vec::new()
    }
}

// ============================================================================
// Planning passes
// ============================================================================

#[test]
fn test_five_small_one_large_fills_three_slots() {
    let coordinator = coordinator(PlannerConfig::default(), five_small_one_large());
    let report = coordinator.plan();

    assert_eq!(report.loads, 3);
    assert_eq!(report.scheduled_loads, 3);
    assert!(report.unassigned.is_empty());

    let assignments = coordinator.get_truck_assignments();
    let signatures: Vec<_> = assignments.iter().map(|a| a.load.signature).collect();
    assert_eq!(
        signatures,
        vec![SizeMix::new(3, 0, 0), SizeMix::new(2, 0, 0), SizeMix::new(0, 0, 1)]
    );

    let slots: Vec<String> = assignments
        .iter()
        .map(|a| a.slot.as_ref().unwrap().to_string())
        .collect();
    assert_eq!(
        slots,
        vec![
            "2024-01-15 09:00-11:00 Truck_1",
            "2024-01-15 09:00-11:00 Truck_2",
            "2024-01-15 11:00-13:00 Truck_1",
        ]
    );
    assert!(coordinator
        .get_all_requests()
        .iter()
        .all(|record| record.request.status == RequestStatus::Scheduled));
}

#[test]
fn test_full_pass_over_the_service_area() {
    let config = PlannerConfig::default();
    let coordinator = coordinator(config.clone(), omaha_batch());
    let report = coordinator.plan();

    assert_eq!(report.loads, 8);
    assert_eq!(report.scheduled_requests, 13);

    let state = coordinator.snapshot();
    let mut seen = BTreeSet::new();
    for load in state.loads() {
        assert!(
            config.capacity.profiles.iter().any(|p| load.signature.fits_within(p)),
            "{} exceeds every profile",
            load.signature
        );
        for request in &load.requests {
            assert!(seen.insert(*request), "request {request} is in two loads");
            assert_eq!(state.zone_of(*request), Some(&load.zone));
        }
    }
    assert_eq!(seen.len(), 13);

    let bound: Vec<_> = state.loads().filter_map(|load| state.slot_of(load.id)).collect();
    let distinct: BTreeSet<_> = bound.iter().collect();
    assert_eq!(bound.len(), distinct.len(), "two loads share a slot");
}

#[test]
fn test_replan_is_idempotent() {
    let coordinator = coordinator(PlannerConfig::default(), omaha_batch());
    coordinator.plan();
    let first = coordinator.snapshot();
    coordinator.plan();
    let second = coordinator.snapshot();

    assert_eq!(first.loads().collect::<Vec<_>>(), second.loads().collect::<Vec<_>>());
    assert_eq!(first.routes().collect::<Vec<_>>(), second.routes().collect::<Vec<_>>());
    assert_eq!(
        first.calendar().slots().collect::<Vec<_>>(),
        second.calendar().slots().collect::<Vec<_>>()
    );
    assert_eq!(second.version(), first.version() + 1);
}

#[test]
fn test_loads_without_a_slot_stay_assigned() {
    use SizeCategory::Large;
    let config = config_with_calendar(1, &["Truck_1"]);
    let coordinator = coordinator(config, requests_in(&MIDTOWN[..1], &[Large, Large, Large]));
    let report = coordinator.plan();

    assert_eq!(report.loads, 3);
    assert_eq!(report.scheduled_loads, 1);
    assert_eq!(status(&coordinator, 1), RequestStatus::Scheduled);
    assert_eq!(status(&coordinator, 2), RequestStatus::Assigned);
    assert_eq!(status(&coordinator, 3), RequestStatus::Assigned);
    assert!(report
        .unassigned
        .iter()
        .all(|entry| entry.reason == UnassignedReason::NoAvailability));
    assert_eq!(report.unassigned.len(), 2);
}

#[test]
fn test_unassignable_requests_stay_pending_and_visible() {
    use SizeCategory::*;
    let config = PlannerConfig {
        capacity: CapacityOptions {
            profiles: vec![SizeMix::new(3, 0, 0), SizeMix::new(0, 2, 0)],
            ..CapacityOptions::default()
        },
        ..PlannerConfig::default()
    };
    let coordinator = coordinator(config, requests_in(MIDTOWN, &[Small, Large, Medium]));
    coordinator.plan();

    assert_eq!(status(&coordinator, 2), RequestStatus::Pending);
    let summary = coordinator.get_dashboard_summary();
    assert_eq!(summary.count(RequestStatus::Pending), 1);
    assert_eq!(summary.count(RequestStatus::Scheduled), 2);
    assert_eq!(summary.unassigned.len(), 1);
    assert_eq!(summary.unassigned[0].request, RequestId(2));
    assert_eq!(summary.unassigned[0].reason, UnassignedReason::NoAdmissibleProfile);
}

#[test]
fn test_failing_matrix_provider_falls_back_to_haversine() {
    let baseline = coordinator(PlannerConfig::default(), omaha_batch());
    baseline.plan();

    let fallback = coordinator(PlannerConfig::default(), omaha_batch()).with_matrix_provider(FailingMatrix);
    fallback.plan();

    assert_eq!(baseline.get_optimal_routes(), fallback.get_optimal_routes());
}

// ============================================================================
// Booking
// ============================================================================

#[test]
fn test_booking_survives_replan() {
    let coordinator = coordinator(PlannerConfig::default(), five_small_one_large());
    coordinator.plan();

    let booking = coordinator
        .book_time_slot(6, "2024-01-16", "09:00-11:00", "68104", "large", "Benson, Omaha 68104")
        .unwrap();
    assert_eq!(booking.slot.to_string(), "2024-01-16 09:00-11:00 Truck_1");

    // The large item's planned load was emptied and dropped
    let state = coordinator.snapshot();
    assert!(state.load(LoadId::Planned(3)).is_none());
    assert_eq!(state.calendar().slots().filter(|slot| slot.is_occupied()).count(), 3);

    coordinator.plan();
    let state = coordinator.snapshot();
    assert_eq!(state.load_of(RequestId(6)), Some(LoadId::Booked(RequestId(6))));
    assert_eq!(state.slot_of(LoadId::Booked(RequestId(6))), Some(&booking.slot));
    assert_eq!(state.request(RequestId(6)).unwrap().status, RequestStatus::Scheduled);
    assert_eq!(state.loads().count(), 3);
    assert_eq!(state.bookings().count(), 1);
}

#[test]
fn test_rebooking_moves_the_booking() {
    let coordinator = coordinator(PlannerConfig::default(), five_small_one_large());
    coordinator.plan();

    let first = coordinator
        .book_time_slot(6, "2024-01-16", "09:00-11:00", "68104", "large", "")
        .unwrap();
    let second = coordinator
        .book_time_slot(6, "2024-01-17", "15:00-17:00", "68104", "large", "")
        .unwrap();

    let state = coordinator.snapshot();
    assert!(!state.calendar().slot(&first.slot).unwrap().is_occupied());
    assert!(state.calendar().slot(&second.slot).unwrap().is_occupied());
    assert_eq!(state.bookings().count(), 1);
}

#[test]
fn test_concurrent_bookings_for_one_slot() {
    use SizeCategory::Small;
    let coordinator = coordinator(config_with_calendar(1, &["Truck_1"]), requests_in(MIDTOWN, &[Small, Small]));

    let (a, b) = thread::scope(|scope| {
        let a = scope.spawn(|| coordinator.book_time_slot(1, "2024-01-15", "09:00-11:00", "68104", "small", ""));
        let b = scope.spawn(|| coordinator.book_time_slot(2, "2024-01-15", "09:00-11:00", "68104", "small", ""));
        (a.join().unwrap(), b.join().unwrap())
    });

    assert!(a.is_ok() != b.is_ok(), "exactly one booking must win");
    let (winner, loser) = if a.is_ok() { (1, b) } else { (2, a) };
    let kind = loser.unwrap_err().kind();
    assert!(matches!(kind, ErrorKind::NoAvailability | ErrorKind::SlotConflict));

    let state = coordinator.snapshot();
    let slot = state.calendar().slots().next().unwrap();
    assert_eq!(slot.occupant.unwrap().load, LoadId::Booked(RequestId(winner)));
}

#[test]
fn test_booking_an_explicit_occupied_slot_is_a_conflict() {
    let coordinator = coordinator(PlannerConfig::default(), five_small_one_large());
    coordinator.plan();
    let before = coordinator.snapshot();

    let err = coordinator
        .book(BookingRequest {
            request: RequestId(6),
            date: date(2024, 1, 15),
            window: window(9, 11),
            zone: "68104".parse().unwrap(),
            size: SizeCategory::Large,
            address: String::new(),
            truck: Some(truckload_planner::model::TruckId::new("Truck_1")),
        })
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SlotConflict);
    assert_eq!(coordinator.snapshot(), before);
}

#[test]
fn test_booking_validation_failures() {
    let mut requests = five_small_one_large();
    requests[0] = requests[0]
        .clone()
        .with_date_window(DateWindow::new(date(2024, 1, 15), date(2024, 1, 16)).unwrap());
    let coordinator = coordinator(PlannerConfig::default(), requests);
    coordinator.plan();

    let cases = [
        (99, "2024-01-16", "09:00-11:00", "68104", "small", ErrorKind::InvalidRequest),
        (1, "16/01/2024", "09:00-11:00", "68104", "small", ErrorKind::InvalidRequest),
        (1, "2024-01-16", "morning", "68104", "small", ErrorKind::InvalidRequest),
        (1, "2024-01-16", "09:00-11:00", "68134", "small", ErrorKind::InvalidRequest),
        (1, "2024-01-16", "09:00-11:00", "68104", "medium", ErrorKind::InvalidRequest),
        (1, "2024-01-18", "09:00-11:00", "68104", "small", ErrorKind::NoAvailability),
        (2, "2024-02-01", "09:00-11:00", "68104", "small", ErrorKind::NoAvailability),
        (2, "2024-01-16", "06:00-08:00", "68104", "small", ErrorKind::NoAvailability),
    ];
    for (id, day, slot, zone, size, expected) in cases {
        let err = coordinator.book_time_slot(id, day, slot, zone, size, "").unwrap_err();
        assert_eq!(err.kind(), expected, "{id} {day} {slot} {zone} {size}: {err}");
    }
    assert_eq!(coordinator.snapshot().bookings().count(), 0);
}

#[test]
fn test_booking_before_any_pass_checks_the_zip_zone() {
    let coordinator = coordinator(PlannerConfig::default(), five_small_one_large());

    let err = coordinator
        .book_time_slot(1, "2024-01-16", "09:00-11:00", "68134", "small", "")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    assert_eq!(coordinator.snapshot().zone_of(RequestId(1)), None);

    let booking = coordinator
        .book_time_slot(1, "2024-01-16", "09:00-11:00", "68104", "small", "")
        .unwrap();
    assert_eq!(booking.zone, "68104");

    // The booked zone agrees with what a pass assigns
    coordinator.plan();
    let state = coordinator.snapshot();
    assert_eq!(state.zone_of(RequestId(1)), state.zone_of(RequestId(2)));
}

#[test]
fn test_booking_before_any_pass_checks_the_cluster_zone() {
    let mut unzoned = request_at(1, SizeCategory::Small, &MIDTOWN[0]);
    unzoned.zip = None;
    let coordinator = coordinator(PlannerConfig::default(), vec![unzoned]);

    let err = coordinator
        .book_time_slot(1, "2024-01-16", "09:00-11:00", "68104", "small", "")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    coordinator
        .book_time_slot(1, "2024-01-16", "09:00-11:00", "cluster-0", "small", "")
        .unwrap();
}

#[test]
fn test_booking_a_size_without_profile_is_unassignable() {
    use SizeCategory::*;
    let config = PlannerConfig {
        capacity: CapacityOptions {
            profiles: vec![SizeMix::new(3, 0, 0)],
            ..CapacityOptions::default()
        },
        ..PlannerConfig::default()
    };
    let coordinator = coordinator(config, requests_in(MIDTOWN, &[Medium]));
    let err = coordinator
        .book_time_slot(1, "2024-01-15", "09:00-11:00", "68104", "medium", "")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnassignableCapacity);
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_cancel_manual_booking_frees_slot() {
    let coordinator = coordinator(PlannerConfig::default(), five_small_one_large());
    let booking = coordinator
        .book_time_slot(6, "2024-01-16", "09:00-11:00", "68104", "large", "")
        .unwrap();

    let load = coordinator.cancel_slot(&booking.slot).unwrap();
    assert_eq!(load, LoadId::Booked(RequestId(6)));

    let state = coordinator.snapshot();
    let slot = state.calendar().slot(&booking.slot).unwrap();
    assert!(slot.occupant.is_none());
    assert_eq!(state.request(RequestId(6)).unwrap().status, RequestStatus::Pending);
    assert_eq!(state.load_of(RequestId(6)), None);
    assert_eq!(state.bookings().count(), 0);
}

#[test]
fn test_cancel_planned_slot_unbinds_load() {
    let coordinator = coordinator(PlannerConfig::default(), five_small_one_large());
    coordinator.plan();
    let slot = coordinator.snapshot().slot_of(LoadId::Planned(1)).cloned().unwrap();

    assert_eq!(coordinator.cancel_slot(&slot).unwrap(), LoadId::Planned(1));

    let state = coordinator.snapshot();
    let load = state.load(LoadId::Planned(1)).unwrap();
    assert!(!load.finalized);
    assert_eq!(state.slot_of(LoadId::Planned(1)), None);
    for id in &load.requests {
        assert_eq!(state.request(*id).unwrap().status, RequestStatus::Assigned);
    }

    let summary = coordinator.get_dashboard_summary();
    let waiting: Vec<RequestId> = summary
        .unassigned
        .iter()
        .filter(|entry| entry.reason == UnassignedReason::NoAvailability)
        .map(|entry| entry.request)
        .collect();
    assert_eq!(waiting, load.requests);
}

#[test]
fn test_cancel_free_slot_is_rejected() {
    let coordinator = coordinator(PlannerConfig::default(), five_small_one_large());
    let slot = coordinator.get_calendar_data()[0].key.clone();
    let err = coordinator.cancel_slot(&slot).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
}

// ============================================================================
// Views
// ============================================================================

#[test]
fn test_dashboard_summary_totals() {
    let coordinator = coordinator(PlannerConfig::default(), omaha_batch());
    coordinator.plan();
    let summary = coordinator.get_dashboard_summary();

    assert_eq!(summary.total_requests, 13);
    assert_eq!(summary.count(RequestStatus::Scheduled), 13);
    assert_eq!(summary.by_size[&SizeCategory::Large], 3);
    assert_eq!(summary.total_loads, 8);
    assert_eq!(summary.scheduled_loads, 8);
    assert_eq!(summary.occupied_slots, 8);
    assert_eq!(summary.total_slots, 56);
    let utilisation: f64 = summary.truck_utilisation.values().sum();
    assert!((utilisation - 8.0 * 100.0 / 28.0).abs() < 1e-9);
    assert!(summary.total_round_trip_miles >= summary.total_distance_miles);
}

#[test]
fn test_zone_summary_per_zip() {
    let coordinator = coordinator(PlannerConfig::default(), omaha_batch());
    coordinator.plan();
    let zones = coordinator.get_zone_summary();

    let keys: Vec<String> = zones.iter().map(|zone| zone.zone.to_string()).collect();
    assert_eq!(keys, vec!["51501", "68104", "68111", "68124", "68134"]);
    let requests: usize = zones.iter().map(|zone| zone.requests).sum();
    assert_eq!(requests, 13);
    assert_eq!(zones[1].loads, 2);
    assert!(zones.iter().all(|zone| zone.loads == zone.scheduled_loads));
}

#[test]
fn test_routes_cover_each_load() {
    let coordinator = coordinator(PlannerConfig::default(), omaha_batch());
    coordinator.plan();

    let routes = coordinator.get_optimal_routes();
    let assignments = coordinator.get_truck_assignments();
    assert_eq!(routes.len(), assignments.len());
    for (route, assignment) in routes.iter().zip(&assignments) {
        assert_eq!(route.load, assignment.load.id);
        let mut routed = route.request_ids();
        let mut packed = assignment.load.requests.clone();
        routed.sort();
        packed.sort();
        assert_eq!(routed, packed);
    }
}

#[test]
fn test_new_requests_join_the_next_pass() {
    use SizeCategory::*;
    let coordinator = coordinator(PlannerConfig::default(), requests_in(MIDTOWN, &[Small]));
    coordinator.plan();

    let added = coordinator
        .add_requests(vec![request_at(50, Medium, &WEST[0])])
        .unwrap();
    assert_eq!(added, 1);
    assert_eq!(status(&coordinator, 50), RequestStatus::Pending);
    assert!(coordinator.add_requests(vec![request_at(50, Small, &WEST[0])]).is_err());

    coordinator.plan();
    assert_eq!(status(&coordinator, 50), RequestStatus::Scheduled);
}
