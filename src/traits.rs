//! Seams between the planner core and its collaborators.
//!
//! Distance lookups and raw request ingestion sit behind traits so the
//! planner can run against great-circle estimates, a road network, a CSV
//! export or an in-memory fixture.

use crate::error::StoreError;
use crate::ingest::RawRequest;
use crate::model::Coordinates;

/// Provides a distance matrix for a set of locations.
///
/// The matrix is indexed by the provided location order and holds miles.
/// An implementation that cannot answer returns an empty matrix; callers fall
/// back to great-circle distances.
pub trait DistanceMatrixProvider: Send + Sync {
    fn matrix_for(&self, locations: &[Coordinates]) -> Vec<Vec<f64>>;
}

/// Supplies raw, not yet validated request records.
pub trait RequestSource {
    fn fetch(&self) -> Result<Vec<RawRequest>, StoreError>;
}
