//! Zone clustering: partition requests into geographic zones.
//!
//! All strategies are deterministic for a fixed input order: k-means seeds by
//! farthest-point selection from the first request and breaks distance ties
//! towards the lower index, so no randomness is involved.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::{CoordinateClustering, ZoningStrategy};
use crate::haversine::HaversineMatrix;
use crate::model::{Coordinates, Request, RequestId, ZoneKey};

/// Zone key → request identifiers (in input order). Every request appears in
/// exactly one zone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZonePartition {
    zones: BTreeMap<ZoneKey, Vec<RequestId>>,
}

impl ZonePartition {
    pub fn zones(&self) -> &BTreeMap<ZoneKey, Vec<RequestId>> {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn zone_of(&self, request: RequestId) -> Option<&ZoneKey> {
        self.zones
            .iter()
            .find(|(_, members)| members.contains(&request))
            .map(|(zone, _)| zone)
    }

    pub fn into_inner(self) -> BTreeMap<ZoneKey, Vec<RequestId>> {
        self.zones
    }
}

/// Partition requests according to the configured strategy.
pub fn partition(requests: &[&Request], strategy: &ZoningStrategy) -> ZonePartition {
    let mut zones: BTreeMap<ZoneKey, Vec<RequestId>> = BTreeMap::new();

    let unzoned: Vec<&Request> = match strategy {
        ZoningStrategy::ZipCode { .. } => {
            let mut without_zip = Vec::new();
            for request in requests {
                match request.zip.as_deref().map(str::trim).filter(|zip| !zip.is_empty()) {
                    Some(zip) => zones.entry(ZoneKey::Zip(zip.to_string())).or_default().push(request.id),
                    None => without_zip.push(*request),
                }
            }
            without_zip
        }
        ZoningStrategy::Coordinates(_) => requests.to_vec(),
    };

    let method = match strategy {
        ZoningStrategy::ZipCode { fallback } => fallback,
        ZoningStrategy::Coordinates(method) => method,
    };
    let points: Vec<Coordinates> = unzoned.iter().map(|request| request.coordinates).collect();
    for (label, request) in cluster(&points, method).into_iter().zip(&unzoned) {
        zones.entry(ZoneKey::Cluster(label)).or_default().push(request.id);
    }

    debug!(requests = requests.len(), zones = zones.len(), "partitioned requests into zones");
    ZonePartition { zones }
}

/// Mean position of a set of points.
pub fn centroid(points: &[Coordinates]) -> Option<Coordinates> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat, lng) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lng), point| (lat + point.lat, lng + point.lng));
    Some(Coordinates::new(lat / n, lng / n))
}

/// Cluster label per point, numbered in order of first appearance.
fn cluster(points: &[Coordinates], method: &CoordinateClustering) -> Vec<u32> {
    let labels = match method {
        CoordinateClustering::Centroids { zones, max_iterations } => {
            centroid_labels(points, *zones, *max_iterations)
        }
        CoordinateClustering::Radius { max_miles } => radius_labels(points, *max_miles),
    };
    renumber(&labels)
}

fn centroid_labels(points: &[Coordinates], zones: usize, max_iterations: usize) -> Vec<usize> {
    if points.is_empty() {
        return Vec::new();
    }
    let k = zones.clamp(1, points.len());

    // Farthest-point seeding from the first point
    let mut centroids = vec![points[0]];
    while centroids.len() < k {
        let mut farthest = (0, -1.0);
        for (index, point) in points.iter().enumerate() {
            let (_, distance) = nearest(point, &centroids);
            if distance > farthest.1 {
                farthest = (index, distance);
            }
        }
        centroids.push(points[farthest.0]);
    }

    let mut labels: Vec<usize> = Vec::new();
    for _ in 0..max_iterations.max(1) {
        let next: Vec<usize> = points.iter().map(|point| nearest(point, &centroids).0).collect();
        if next == labels {
            break;
        }
        labels = next;

        for (label, center) in centroids.iter_mut().enumerate() {
            let members: Vec<Coordinates> = points
                .iter()
                .zip(&labels)
                .filter(|(_, assigned)| **assigned == label)
                .map(|(point, _)| *point)
                .collect();
            // Empty clusters keep their previous centroid
            if let Some(mean) = centroid(&members) {
                *center = mean;
            }
        }
    }
    labels
}

fn radius_labels(points: &[Coordinates], max_miles: f64) -> Vec<usize> {
    let mut leaders: Vec<Coordinates> = Vec::new();
    points
        .iter()
        .map(|point| match nearest_within(point, &leaders, max_miles) {
            Some(label) => label,
            None => {
                leaders.push(*point);
                leaders.len() - 1
            }
        })
        .collect()
}

/// Index and distance of the closest center; ties go to the lower index.
fn nearest(point: &Coordinates, centers: &[Coordinates]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (index, center) in centers.iter().enumerate() {
        let distance = HaversineMatrix::distance_miles(*point, *center);
        if distance < best.1 {
            best = (index, distance);
        }
    }
    best
}

fn nearest_within(point: &Coordinates, centers: &[Coordinates], max_miles: f64) -> Option<usize> {
    if centers.is_empty() {
        return None;
    }
    let (index, distance) = nearest(point, centers);
    (distance <= max_miles).then_some(index)
}

fn renumber(labels: &[usize]) -> Vec<u32> {
    let mut mapping: BTreeMap<usize, u32> = BTreeMap::new();
    labels
        .iter()
        .map(|label| {
            let next = mapping.len() as u32;
            *mapping.entry(*label).or_insert(next)
        })
        .collect()
}
