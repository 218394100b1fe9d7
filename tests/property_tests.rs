//! Property-based tests for the planner.
//!
//! # Invariants tested
//!
//! - **Profile fit:** every load's signature fits an admissible profile.
//! - **Conservation:** every request ends in exactly one load or is reported
//!   unassigned.
//! - **Partition:** zones cover all requests without overlap.
//! - **Route quality:** the sequenced distance never exceeds the input order's.
//! - **No double booking:** no two loads hold the same slot.

mod fixtures;

use std::collections::BTreeSet;

use proptest::prelude::*;
use truckload_planner::capacity::CapacityPlanner;
use truckload_planner::config::{CapacityOptions, CoordinateClustering, PlannerConfig, RoutingOptions, ZoningStrategy};
use truckload_planner::haversine::HaversineMatrix;
use truckload_planner::model::{Coordinates, LoadId, Request, RequestId, SizeCategory, Stop, ZoneKey};
use truckload_planner::sequencer::RouteSequencer;
use truckload_planner::zones::partition;
use truckload_planner::AssignmentCoordinator;

use fixtures::DEPOT;

fn size_strategy() -> impl Strategy<Value = SizeCategory> {
    prop_oneof![
        3 => Just(SizeCategory::Small),
        2 => Just(SizeCategory::Medium),
        1 => Just(SizeCategory::Large),
    ]
}

/// Requests scattered over the metro area.
fn requests_strategy(max: usize) -> impl Strategy<Value = Vec<Request>> {
    prop::collection::vec((size_strategy(), 41.10..41.40_f64, -96.20..-95.80_f64, 0..3_u8), 0..max).prop_map(
        |specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (size, lat, lng, zip))| {
                    let request = Request::new(i as u64 + 1, size, Coordinates::new(lat, lng));
                    match zip {
                        0 => request,
                        1 => request.with_zip("68104"),
                        _ => request.with_zip("68134"),
                    }
                })
                .collect()
        },
    )
}

fn clustering_strategy() -> impl Strategy<Value = ZoningStrategy> {
    prop_oneof![
        (1..6_usize).prop_map(|zones| ZoningStrategy::Coordinates(CoordinateClustering::Centroids {
            zones,
            max_iterations: 25
        })),
        (1.0..15.0_f64).prop_map(|max_miles| ZoningStrategy::Coordinates(CoordinateClustering::Radius { max_miles })),
        Just(ZoningStrategy::default()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn packing_respects_profiles_and_conserves_requests(
        requests in requests_strategy(30),
        limit in prop::option::of(1..6_usize),
        dispatch_partial_loads in any::<bool>(),
    ) {
        let options = CapacityOptions {
            max_loads_per_batch: limit,
            dispatch_partial_loads,
            ..CapacityOptions::default()
        };
        let refs: Vec<&Request> = requests.iter().collect();
        let outcome = CapacityPlanner::new(&options).pack(&ZoneKey::Cluster(0), &refs);

        let mut seen = BTreeSet::new();
        for load in &outcome.loads {
            prop_assert!(options.profiles.iter().any(|p| load.signature.fits_within(p)));
            prop_assert_eq!(usize::from(load.signature.total()), load.requests.len());
            for id in &load.requests {
                prop_assert!(seen.insert(*id), "request {} packed twice", id);
            }
        }
        for entry in &outcome.unassigned {
            prop_assert!(seen.insert(entry.request), "request {} both packed and unassigned", entry.request);
        }
        prop_assert_eq!(seen.len(), requests.len());
        if let Some(limit) = limit {
            prop_assert!(outcome.loads.len() <= limit);
        }
    }

    #[test]
    fn zones_partition_all_requests(
        requests in requests_strategy(40),
        strategy in clustering_strategy(),
    ) {
        let refs: Vec<&Request> = requests.iter().collect();
        let zones = partition(&refs, &strategy);

        let mut seen: BTreeSet<RequestId> = BTreeSet::new();
        for members in zones.zones().values() {
            prop_assert!(!members.is_empty());
            for id in members {
                prop_assert!(seen.insert(*id), "request {} in two zones", id);
            }
        }
        prop_assert_eq!(seen.len(), requests.len());
        prop_assert_eq!(&zones, &partition(&refs, &strategy));
    }

    #[test]
    fn sequencing_never_lengthens_the_input_order(requests in requests_strategy(12)) {
        let options = RoutingOptions::default();
        let sequencer = RouteSequencer::new(DEPOT.coords(), &HaversineMatrix, &options);
        let stops: Vec<Stop> = requests.iter().map(Stop::from).collect();
        let route = sequencer.sequence(LoadId::Planned(1), &stops);

        let input: f64 = stops
            .windows(2)
            .map(|leg| HaversineMatrix::distance_miles(leg[0].coordinates, leg[1].coordinates))
            .sum();
        prop_assert!(route.distance_miles <= input + 1e-9);
        prop_assert!(route.distance_miles >= 0.0);
        if stops.len() <= 1 {
            prop_assert_eq!(route.distance_miles, 0.0);
        }

        let mut routed = route.request_ids();
        routed.sort();
        let mut given: Vec<RequestId> = stops.iter().map(|stop| stop.request).collect();
        given.sort();
        prop_assert_eq!(routed, given);
    }

    #[test]
    fn planned_loads_never_share_a_slot(requests in requests_strategy(40)) {
        let total = requests.len();
        let coordinator = AssignmentCoordinator::new(PlannerConfig::default(), requests).unwrap();
        coordinator.plan();
        let state = coordinator.snapshot();

        let bound: Vec<_> = state.loads().filter_map(|load| state.slot_of(load.id)).collect();
        let distinct: BTreeSet<_> = bound.iter().collect();
        prop_assert_eq!(bound.len(), distinct.len());

        let occupied = state.calendar().slots().filter(|slot| slot.is_occupied()).count();
        prop_assert_eq!(occupied, bound.len());

        let placed: usize = state.loads().map(|load| load.requests.len()).sum();
        let pending = state
            .requests()
            .iter()
            .filter(|request| state.load_of(request.id).is_none())
            .count();
        prop_assert_eq!(placed + pending, total);
    }
}
