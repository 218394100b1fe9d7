//! Flat CSV tables for the planning state.
//!
//! One file per table in a directory. Requests, calendar and bookings can be
//! read back; the route, truck and zone tables are reports only.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::calendar::Calendar;
use crate::error::StoreError;
use crate::model::{
    Booking, BookingSource, Coordinates, DateWindow, LoadId, Occupant, Request, RequestId, RequestKind,
    RequestStatus, SizeCategory, SlotKey, TimeSlot, TimeWindow, TruckId, TruckSpec,
};
use crate::snapshot::PlanSnapshot;

pub const REQUESTS: &str = "requests.csv";
pub const ROUTE_ASSIGNMENTS: &str = "route_assignments.csv";
pub const TRUCK_SUMMARY: &str = "truck_summary.csv";
pub const ZONE_SCHEDULE: &str = "zone_schedule.csv";
pub const CALENDAR: &str = "calendar.csv";
pub const BOOKINGS: &str = "bookings.csv";

#[derive(Debug, Clone)]
pub struct TableStore {
    dir: PathBuf,
}

impl TableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every table, replacing earlier exports.
    pub fn save(&self, snapshot: &PlanSnapshot, depot: Coordinates) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let records = snapshot.request_records();
        self.write_table(REQUESTS, records.iter().map(RequestRow::from_record))?;
        self.write_table(ROUTE_ASSIGNMENTS, route_rows(snapshot, depot))?;
        self.write_table(TRUCK_SUMMARY, truck_rows(snapshot))?;
        self.write_table(
            ZONE_SCHEDULE,
            snapshot.zone_summary().into_iter().map(|zone| ZoneRow {
                zone: zone.zone.to_string(),
                requests: zone.requests,
                loads: zone.loads,
                scheduled_loads: zone.scheduled_loads,
                distance_miles: zone.distance_miles,
                dates: zone.dates.join(";"),
            }),
        )?;
        self.write_table(CALENDAR, snapshot.calendar().slots().map(SlotRow::from))?;
        self.write_table(BOOKINGS, snapshot.bookings().map(BookingRow::from))?;

        info!(dir = %self.dir.display(), version = snapshot.version(), "exported planning tables");
        Ok(())
    }

    pub fn load_requests(&self) -> Result<Vec<Request>, StoreError> {
        let path = self.dir.join(REQUESTS);
        self.read_table::<RequestRow>(REQUESTS)?
            .into_iter()
            .map(|row| row.into_request().map_err(|reason| corrupt(&path, reason)))
            .collect()
    }

    /// Rebuild the calendar for a known fleet.
    pub fn load_calendar(&self, trucks: &[TruckSpec]) -> Result<Calendar, StoreError> {
        let path = self.dir.join(CALENDAR);
        let mut slots: Vec<TimeSlot> = Vec::new();
        for row in self.read_table::<SlotRow>(CALENDAR)? {
            let slot = row.into_slot().map_err(|reason| corrupt(&path, reason))?;
            if slots.iter().any(|existing| existing.key == slot.key) {
                return Err(corrupt(&path, format!("duplicate slot {}", slot.key)));
            }
            slots.push(slot);
        }
        Ok(Calendar::from_slots(trucks.to_vec(), slots))
    }

    pub fn load_bookings(&self) -> Result<Vec<Booking>, StoreError> {
        Ok(self
            .read_table::<BookingRow>(BOOKINGS)?
            .into_iter()
            .map(Booking::from)
            .collect())
    }

    fn write_table<T: Serialize>(&self, name: &str, rows: impl IntoIterator<Item = T>) -> Result<(), StoreError> {
        let path = self.dir.join(name);
        let csv_error = |source| StoreError::Csv {
            path: path.clone(),
            source,
        };
        let mut writer = csv::Writer::from_path(&path).map_err(csv_error)?;
        for row in rows {
            writer.serialize(row).map_err(csv_error)?;
        }
        writer.flush().map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })
    }

    fn read_table<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StoreError> {
        let path = self.dir.join(name);
        let csv_error = |source| StoreError::Csv {
            path: path.clone(),
            source,
        };
        let mut reader = csv::Reader::from_path(&path).map_err(csv_error)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row.map_err(csv_error)?);
        }
        Ok(rows)
    }
}

fn corrupt(path: &Path, reason: String) -> StoreError {
    StoreError::Corrupt {
        path: path.to_path_buf(),
        reason,
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct RequestRow {
    id: RequestId,
    kind: RequestKind,
    size: SizeCategory,
    latitude: f64,
    longitude: f64,
    zip: Option<String>,
    address: String,
    earliest_date: Option<NaiveDate>,
    latest_date: Option<NaiveDate>,
    requested_on: Option<NaiveDate>,
    status: RequestStatus,
    zone: Option<String>,
    load: Option<LoadId>,
}

impl RequestRow {
    fn from_record(record: &crate::snapshot::RequestRecord) -> Self {
        let request = &record.request;
        Self {
            id: request.id,
            kind: request.kind,
            size: request.size,
            latitude: request.coordinates.lat,
            longitude: request.coordinates.lng,
            zip: request.zip.clone(),
            address: request.address.clone(),
            earliest_date: request.date_window.map(|window| window.earliest()),
            latest_date: request.date_window.map(|window| window.latest()),
            requested_on: request.requested_on,
            status: request.status,
            zone: record.zone.as_ref().map(ToString::to_string),
            load: record.load,
        }
    }

    fn into_request(self) -> Result<Request, String> {
        let date_window = match (self.earliest_date, self.latest_date) {
            (None, None) => None,
            (Some(earliest), Some(latest)) => Some(
                DateWindow::new(earliest, latest)
                    .ok_or_else(|| format!("request {} has an inverted date window", self.id))?,
            ),
            _ => return Err(format!("request {} has half a date window", self.id)),
        };
        Ok(Request {
            id: self.id,
            kind: self.kind,
            size: self.size,
            coordinates: Coordinates::new(self.latitude, self.longitude),
            zip: self.zip,
            address: self.address,
            date_window,
            requested_on: self.requested_on,
            status: self.status,
        })
    }
}

/// One row per route point; every route starts and ends at the depot.
#[derive(Debug, Serialize)]
struct RouteRow {
    load: LoadId,
    zone: String,
    truck: Option<TruckId>,
    date: Option<NaiveDate>,
    window: Option<TimeWindow>,
    sequence: usize,
    point: &'static str,
    request: Option<RequestId>,
    kind: Option<RequestKind>,
    size: Option<SizeCategory>,
    latitude: f64,
    longitude: f64,
}

fn route_rows(snapshot: &PlanSnapshot, depot: Coordinates) -> Vec<RouteRow> {
    let mut rows = Vec::new();
    for route in snapshot.routes() {
        let zone = snapshot
            .load(route.load)
            .map(|load| load.zone.to_string())
            .unwrap_or_default();
        let slot = snapshot.slot_of(route.load);
        let row = |sequence, point, stop: Option<&crate::model::Stop>, at: Coordinates| RouteRow {
            load: route.load,
            zone: zone.clone(),
            truck: slot.map(|slot| slot.truck.clone()),
            date: slot.map(|slot| slot.date),
            window: slot.map(|slot| slot.window),
            sequence,
            point,
            request: stop.map(|stop| stop.request),
            kind: stop.map(|stop| stop.kind),
            size: stop.map(|stop| stop.size),
            latitude: at.lat,
            longitude: at.lng,
        };

        rows.push(row(0, "depot_start", None, depot));
        for (index, stop) in route.stops.iter().enumerate() {
            rows.push(row(index + 1, "stop", Some(stop), stop.coordinates));
        }
        rows.push(row(route.stops.len() + 1, "depot_end", None, depot));
    }
    rows
}

#[derive(Debug, Serialize)]
struct TruckRow {
    load: LoadId,
    zone: String,
    truck: Option<TruckId>,
    date: Option<NaiveDate>,
    window: Option<TimeWindow>,
    signature: String,
    profile: String,
    stops: usize,
    distance_miles: f64,
    round_trip_miles: f64,
    estimated_minutes: f64,
    finalized: bool,
}

fn truck_rows(snapshot: &PlanSnapshot) -> Vec<TruckRow> {
    snapshot
        .loads()
        .map(|load| {
            let slot = snapshot.slot_of(load.id);
            let route = snapshot.route(load.id);
            TruckRow {
                load: load.id,
                zone: load.zone.to_string(),
                truck: slot.map(|slot| slot.truck.clone()),
                date: slot.map(|slot| slot.date),
                window: slot.map(|slot| slot.window),
                signature: load.signature.to_string(),
                profile: load.profile.to_string(),
                stops: load.requests.len(),
                distance_miles: route.map_or(0.0, |route| route.distance_miles),
                round_trip_miles: route.map_or(0.0, |route| route.round_trip_miles),
                estimated_minutes: route.map_or(0.0, |route| route.estimated_minutes),
                finalized: load.finalized,
            }
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct ZoneRow {
    zone: String,
    requests: usize,
    loads: usize,
    scheduled_loads: usize,
    distance_miles: f64,
    dates: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SlotRow {
    date: NaiveDate,
    window: TimeWindow,
    truck: TruckId,
    occupied: bool,
    load: Option<LoadId>,
    source: Option<BookingSource>,
}

impl From<&TimeSlot> for SlotRow {
    fn from(slot: &TimeSlot) -> Self {
        Self {
            date: slot.key.date,
            window: slot.key.window,
            truck: slot.key.truck.clone(),
            occupied: slot.is_occupied(),
            load: slot.occupant.map(|occupant| occupant.load),
            source: slot.occupant.map(|occupant| occupant.source),
        }
    }
}

impl SlotRow {
    fn into_slot(self) -> Result<TimeSlot, String> {
        let key = SlotKey {
            date: self.date,
            window: self.window,
            truck: self.truck,
        };
        let occupant = match (self.occupied, self.load, self.source) {
            (false, None, None) => None,
            (true, Some(load), Some(source)) => Some(Occupant { load, source }),
            _ => return Err(format!("slot {key} has inconsistent occupancy")),
        };
        Ok(TimeSlot { key, occupant })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BookingRow {
    request: RequestId,
    date: NaiveDate,
    window: TimeWindow,
    truck: TruckId,
    zone: String,
    size: SizeCategory,
    address: String,
    created_at: DateTime<Utc>,
}

impl From<&Booking> for BookingRow {
    fn from(booking: &Booking) -> Self {
        Self {
            request: booking.request,
            date: booking.slot.date,
            window: booking.slot.window,
            truck: booking.slot.truck.clone(),
            zone: booking.zone.clone(),
            size: booking.size,
            address: booking.address.clone(),
            created_at: booking.created_at,
        }
    }
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Self {
            request: row.request,
            slot: SlotKey {
                date: row.date,
                window: row.window,
                truck: row.truck,
            },
            zone: row.zone,
            size: row.size,
            address: row.address,
            created_at: row.created_at,
        }
    }
}
