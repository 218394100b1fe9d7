//! Test fixtures for truckload-planner.
//!
//! Provides realistic test data including:
//! - Real Omaha / Council Bluffs locations grouped by area
//! - Builders for requests and small calendars

#![allow(dead_code)]

pub mod omaha_locations;

pub use omaha_locations::*;

use chrono::NaiveDate;
use truckload_planner::config::{CalendarConfig, PlannerConfig};
use truckload_planner::model::{Request, SizeCategory, TimeWindow, TruckSpec};

/// Request at a named location, tagged with its zip code.
pub fn request_at(id: u64, size: SizeCategory, location: &Location) -> Request {
    Request::new(id, size, location.coords())
        .with_zip(location.zip)
        .with_address(format!("{}, Omaha {}", location.name, location.zip))
}

/// `sizes.len()` requests cycling through `locations`, numbered from 1.
pub fn requests_in(locations: &[Location], sizes: &[SizeCategory]) -> Vec<Request> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, size)| request_at(i as u64 + 1, *size, &locations[i % locations.len()]))
        .collect()
}

/// A mixed batch spread over the whole service area.
pub fn omaha_batch() -> Vec<Request> {
    use SizeCategory::*;
    let sizes = [Small, Medium, Large, Small, Small, Medium];
    let mut requests = Vec::new();
    let mut next_id = 1;
    for area in [MIDTOWN, WEST, COUNCIL_BLUFFS] {
        for (location, size) in area.iter().zip(sizes) {
            requests.push(request_at(next_id, size, location));
            next_id += 1;
        }
    }
    requests
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn window(start: u32, end: u32) -> TimeWindow {
    TimeWindow::hours(start, end).unwrap()
}

/// Default config with a calendar of `days` days, one window and the given trucks.
pub fn config_with_calendar(days: u32, trucks: &[&str]) -> PlannerConfig {
    PlannerConfig {
        calendar: CalendarConfig {
            days,
            windows: vec![window(9, 11)],
            trucks: trucks.iter().map(|id| TruckSpec::new(*id)).collect(),
            ..CalendarConfig::default()
        },
        ..PlannerConfig::default()
    }
}
