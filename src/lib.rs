//! truckload-planner
//!
//! Assigns furniture pickup/delivery requests to capacity-feasible truck
//! loads, groups them by zone, sequences each load into a route and books
//! the routes onto calendar time slots without double-booking.

pub mod calendar;
pub mod capacity;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod haversine;
pub mod ingest;
pub mod model;
pub mod osrm;
pub mod sequencer;
pub mod snapshot;
pub mod store;
pub mod traits;
pub mod zones;

pub use config::PlannerConfig;
pub use coordinator::{AssignmentCoordinator, BookingRequest, PlanReport};
pub use error::{ConfigError, ErrorKind, PlanningError, StoreError};
pub use model::{Request, RequestId, SizeCategory};
