//! Route sequencer: order a load's stops.
//!
//! Nearest-neighbour construction from the depot followed by a bounded local
//! search (pairwise swaps and 2-opt segment reversal). Only strict
//! improvements are accepted, so the search always terminates and repeated
//! runs give the same order. With `pickups_first`, pickups and deliveries
//! are ordered as two consecutive groups and moves never cross between them.

use std::ops::Range;

use tracing::{debug, warn};

use crate::config::RoutingOptions;
use crate::haversine::HaversineMatrix;
use crate::model::{Coordinates, LoadId, RequestKind, Route, Stop};
use crate::traits::DistanceMatrixProvider;

/// Minimum gain for a move to count as an improvement.
const EPSILON: f64 = 1e-9;

pub struct RouteSequencer<'a> {
    depot: Coordinates,
    provider: &'a dyn DistanceMatrixProvider,
    options: &'a RoutingOptions,
}

impl<'a> RouteSequencer<'a> {
    pub fn new(depot: Coordinates, provider: &'a dyn DistanceMatrixProvider, options: &'a RoutingOptions) -> Self {
        Self {
            depot,
            provider,
            options,
        }
    }

    /// Order `stops` and measure the resulting route.
    pub fn sequence(&self, load: LoadId, stops: &[Stop]) -> Route {
        if stops.is_empty() {
            return Route {
                load,
                stops: Vec::new(),
                distance_miles: 0.0,
                round_trip_miles: 0.0,
                estimated_minutes: 0.0,
            };
        }

        let matrix = self.matrix(stops);
        // Matrix index 0 is the depot; stop i sits at index i + 1.
        let groups = self.groups(stops);
        let input: Vec<usize> = groups.concat();

        let mut order: Vec<usize> = Vec::with_capacity(stops.len());
        let mut segments: Vec<Range<usize>> = Vec::with_capacity(groups.len());
        for group in &groups {
            let from = order.last().copied().unwrap_or(0);
            let begin = order.len();
            order.extend(nearest_neighbour(&matrix, stops, from, group));
            segments.push(begin..order.len());
        }

        let mut cost = path_length(&matrix, &order);
        for pass in 0..self.options.improvement_passes {
            match improve(&matrix, &order, cost, &segments) {
                Some((better, better_cost)) => {
                    order = better;
                    cost = better_cost;
                }
                None => {
                    debug!(load = %load, passes = pass, "local search converged");
                    break;
                }
            }
        }

        let input_cost = path_length(&matrix, &input);
        if input_cost < cost {
            order = input;
            cost = input_cost;
        }

        let round_trip = matrix[0][order[0]] + cost + matrix[order[order.len() - 1]][0];
        let service: f64 = order.iter().map(|&i| self.service_minutes(&stops[i - 1])).sum();

        Route {
            load,
            stops: order.iter().map(|&i| stops[i - 1]).collect(),
            distance_miles: cost,
            round_trip_miles: round_trip,
            estimated_minutes: round_trip * self.options.minutes_per_mile + service,
        }
    }

    /// Matrix indices in input order, split into pickups then deliveries when
    /// pickups go first. Empty groups are dropped.
    fn groups(&self, stops: &[Stop]) -> Vec<Vec<usize>> {
        let indices = 1..=stops.len();
        if !self.options.pickups_first {
            return vec![indices.collect()];
        }
        let (pickups, deliveries): (Vec<usize>, Vec<usize>) =
            indices.partition(|&i| stops[i - 1].kind == RequestKind::Pickup);
        [pickups, deliveries]
            .into_iter()
            .filter(|group| !group.is_empty())
            .collect()
    }

    fn service_minutes(&self, stop: &Stop) -> f64 {
        match stop.kind {
            RequestKind::Pickup => self.options.pickup_service_minutes,
            RequestKind::Delivery => self.options.delivery_service_minutes,
        }
    }

    /// Depot-first matrix from the provider, or haversine when the provider
    /// fails or answers with the wrong shape.
    fn matrix(&self, stops: &[Stop]) -> Vec<Vec<f64>> {
        let locations: Vec<Coordinates> = std::iter::once(self.depot)
            .chain(stops.iter().map(|stop| stop.coordinates))
            .collect();
        let matrix = self.provider.matrix_for(&locations);
        if is_well_formed(&matrix, locations.len()) {
            matrix
        } else {
            warn!(
                locations = locations.len(),
                rows = matrix.len(),
                "distance matrix unusable, falling back to haversine"
            );
            HaversineMatrix.matrix_for(&locations)
        }
    }
}

fn is_well_formed(matrix: &[Vec<f64>], size: usize) -> bool {
    matrix.len() == size
        && matrix
            .iter()
            .all(|row| row.len() == size && row.iter().all(|d| d.is_finite() && *d >= 0.0))
}

/// Sum of stop-to-stop legs; the depot is not counted.
fn path_length(matrix: &[Vec<f64>], order: &[usize]) -> f64 {
    order.windows(2).map(|leg| matrix[leg[0]][leg[1]]).sum()
}

/// Greedy tour over `candidates` starting at matrix index `from`; equal
/// distances go to the lower request id.
fn nearest_neighbour(
    matrix: &[Vec<f64>],
    stops: &[Stop],
    from: usize,
    candidates: &[usize],
) -> Vec<usize> {
    let mut remaining = candidates.to_vec();
    let mut order = Vec::with_capacity(remaining.len());
    let mut current = from;

    while !remaining.is_empty() {
        let mut best = 0;
        for candidate in 1..remaining.len() {
            let (a, b) = (remaining[candidate], remaining[best]);
            let (da, db) = (matrix[current][a], matrix[current][b]);
            if da < db || (da == db && stops[a - 1].request < stops[b - 1].request) {
                best = candidate;
            }
        }
        current = remaining.remove(best);
        order.push(current);
    }
    order
}

/// First strictly improving swap or 2-opt move, scanning in a fixed order.
/// Moves stay inside one segment of `order`.
fn improve(
    matrix: &[Vec<f64>],
    order: &[usize],
    cost: f64,
    segments: &[Range<usize>],
) -> Option<(Vec<usize>, f64)> {
    for segment in segments {
        for i in segment.clone() {
            for j in (i + 1)..segment.end {
                let mut swapped = order.to_vec();
                swapped.swap(i, j);
                let swapped_cost = path_length(matrix, &swapped);
                if swapped_cost < cost - EPSILON {
                    return Some((swapped, swapped_cost));
                }

                if j > i + 1 {
                    let mut reversed = order.to_vec();
                    reversed[i..=j].reverse();
                    let reversed_cost = path_length(matrix, &reversed);
                    if reversed_cost < cost - EPSILON {
                        return Some((reversed, reversed_cost));
                    }
                }
            }
        }
    }
    None
}
