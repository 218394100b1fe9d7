//! Planner configuration.
//!
//! Every tunable lives here: capacity profiles, zoning parameters, routing
//! costs and the calendar horizon. Defaults reproduce the furniture project's
//! operating rules.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{Coordinates, SizeMix, TimeWindow, TruckSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Warehouse where every route starts and ends.
    pub depot: Coordinates,
    pub capacity: CapacityOptions,
    pub zoning: ZoningStrategy,
    pub routing: RoutingOptions,
    pub calendar: CalendarConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            depot: Coordinates::new(41.2565, -95.9345),
            capacity: CapacityOptions::default(),
            zoning: ZoningStrategy::default(),
            routing: RoutingOptions::default(),
            calendar: CalendarConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.depot.is_valid() {
            return Err(ConfigError::Invalid(format!("depot {} is not a valid coordinate", self.depot)));
        }
        if self.capacity.profiles.is_empty() {
            return Err(ConfigError::Invalid("at least one capacity profile is required".into()));
        }
        if let Some(profile) = self.capacity.profiles.iter().find(|profile| profile.is_empty()) {
            return Err(ConfigError::Invalid(format!("capacity profile {profile} holds nothing")));
        }
        if self.capacity.max_loads_per_batch == Some(0) {
            return Err(ConfigError::Invalid("max_loads_per_batch must be positive".into()));
        }
        self.zoning.validate()?;
        self.routing.validate()?;
        self.calendar.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityOptions {
    /// Admissible load profiles; a load always fits within one of them.
    pub profiles: Vec<SizeMix>,
    /// Dispatch loads that never filled a profile (e.g. two small items).
    pub dispatch_partial_loads: bool,
    /// Upper bound on loads opened per zone batch.
    pub max_loads_per_batch: Option<usize>,
}

impl Default for CapacityOptions {
    fn default() -> Self {
        Self {
            profiles: vec![
                SizeMix::new(3, 0, 0),
                SizeMix::new(2, 1, 0),
                SizeMix::new(0, 2, 0),
                SizeMix::new(0, 0, 1),
            ],
            dispatch_partial_loads: true,
            max_loads_per_batch: None,
        }
    }
}

/// Coordinate-based clustering method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateClustering {
    /// Deterministic k-means with a fixed zone count.
    Centroids { zones: usize, max_iterations: usize },
    /// Leader clustering: no member is farther than `max_miles` from its zone's leader.
    Radius { max_miles: f64 },
}

impl CoordinateClustering {
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            CoordinateClustering::Centroids { zones: 0, .. } => {
                Err(ConfigError::Invalid("centroid clustering needs at least one zone".into()))
            }
            CoordinateClustering::Radius { max_miles } if !(*max_miles > 0.0) => {
                Err(ConfigError::Invalid("clustering radius must be positive".into()))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoningStrategy {
    /// One zone per zip code; requests without one are clustered by `fallback`.
    ZipCode { fallback: CoordinateClustering },
    /// Cluster every request by coordinates.
    Coordinates(CoordinateClustering),
}

impl Default for ZoningStrategy {
    fn default() -> Self {
        ZoningStrategy::ZipCode {
            fallback: CoordinateClustering::Centroids {
                zones: 3,
                max_iterations: 25,
            },
        }
    }
}

impl ZoningStrategy {
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ZoningStrategy::ZipCode { fallback } => fallback.validate(),
            ZoningStrategy::Coordinates(method) => method.validate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingOptions {
    /// Maximum local-improvement passes after nearest-neighbour construction.
    pub improvement_passes: usize,
    /// Driving time per mile (city traffic).
    pub minutes_per_mile: f64,
    pub pickup_service_minutes: f64,
    pub delivery_service_minutes: f64,
    /// Visit every pickup before any delivery.
    pub pickups_first: bool,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self {
            improvement_passes: 50,
            minutes_per_mile: 2.5,
            pickup_service_minutes: 30.0,
            delivery_service_minutes: 20.0,
            pickups_first: false,
        }
    }
}

impl RoutingOptions {
    fn validate(&self) -> Result<(), ConfigError> {
        let costs = [
            self.minutes_per_mile,
            self.pickup_service_minutes,
            self.delivery_service_minutes,
        ];
        if costs.iter().all(|cost| cost.is_finite() && *cost >= 0.0) {
            Ok(())
        } else {
            Err(ConfigError::Invalid("routing costs must be finite and non-negative".into()))
        }
    }
}

/// Scheduling horizon: every (date, window, truck) triple becomes a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub start_date: NaiveDate,
    pub days: u32,
    pub windows: Vec<TimeWindow>,
    pub trucks: Vec<TruckSpec>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap_or_default(),
            days: 7,
            windows: [(9, 11), (11, 13), (13, 15), (15, 17)]
                .into_iter()
                .filter_map(|(start, end)| TimeWindow::hours(start, end))
                .collect(),
            trucks: vec![TruckSpec::new("Truck_1"), TruckSpec::new("Truck_2")],
        }
    }
}

impl CalendarConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.days == 0 {
            return Err(ConfigError::Invalid("calendar horizon must span at least one day".into()));
        }
        if self.windows.is_empty() {
            return Err(ConfigError::Invalid("calendar needs at least one time window".into()));
        }
        if self.trucks.is_empty() {
            return Err(ConfigError::Invalid("calendar needs at least one truck".into()));
        }
        let mut ids: Vec<_> = self.trucks.iter().map(|truck| &truck.id).collect();
        ids.sort();
        ids.dedup();
        if ids.len() != self.trucks.len() {
            return Err(ConfigError::Invalid("truck identifiers must be unique".into()));
        }
        Ok(())
    }
}
