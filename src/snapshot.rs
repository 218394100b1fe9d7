//! Planning state and the read-only views derived from it.
//!
//! A [`PlanSnapshot`] is the complete, versioned state owned by the
//! coordinator. Readers receive clones, so every view is internally
//! consistent.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::calendar::Calendar;
use crate::model::{
    Booking, LoadId, Request, RequestId, RequestKind, RequestStatus, Route, SizeCategory, SlotKey, TruckId,
    TruckLoad, UnassignedRequest, ZoneKey,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PlanSnapshot {
    pub(crate) version: u64,
    /// Input order; statuses are the only mutable part.
    pub(crate) requests: Vec<Request>,
    pub(crate) index: BTreeMap<RequestId, usize>,
    pub(crate) zones: BTreeMap<RequestId, ZoneKey>,
    pub(crate) loads: BTreeMap<LoadId, TruckLoad>,
    pub(crate) routes: BTreeMap<LoadId, Route>,
    pub(crate) calendar: Calendar,
    pub(crate) unassigned: Vec<UnassignedRequest>,
    pub(crate) bookings: BTreeMap<RequestId, Booking>,
}

impl PlanSnapshot {
    pub(crate) fn new(requests: Vec<Request>, calendar: Calendar) -> Self {
        let index = requests
            .iter()
            .enumerate()
            .map(|(position, request)| (request.id, position))
            .collect();
        Self {
            version: 0,
            requests,
            index,
            zones: BTreeMap::new(),
            loads: BTreeMap::new(),
            routes: BTreeMap::new(),
            calendar,
            unassigned: Vec::new(),
            bookings: BTreeMap::new(),
        }
    }

    /// Incremented by every committed mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn request(&self, id: RequestId) -> Option<&Request> {
        self.index.get(&id).map(|&position| &self.requests[position])
    }

    pub(crate) fn request_mut(&mut self, id: RequestId) -> Option<&mut Request> {
        self.index.get(&id).map(|&position| &mut self.requests[position])
    }

    pub(crate) fn set_status(&mut self, ids: &[RequestId], status: RequestStatus) {
        for id in ids {
            if let Some(request) = self.request_mut(*id) {
                request.status = status;
            }
        }
    }

    pub fn zone_of(&self, id: RequestId) -> Option<&ZoneKey> {
        self.zones.get(&id)
    }

    pub fn loads(&self) -> impl Iterator<Item = &TruckLoad> {
        self.loads.values()
    }

    pub fn load(&self, id: LoadId) -> Option<&TruckLoad> {
        self.loads.get(&id)
    }

    /// Load currently holding `request`.
    pub fn load_of(&self, request: RequestId) -> Option<LoadId> {
        self.loads
            .values()
            .find(|load| load.requests.contains(&request))
            .map(|load| load.id)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn route(&self, load: LoadId) -> Option<&Route> {
        self.routes.get(&load)
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn slot_of(&self, load: LoadId) -> Option<&SlotKey> {
        self.calendar.slot_of(load)
    }

    pub fn unassigned(&self) -> &[UnassignedRequest] {
        &self.unassigned
    }

    pub fn bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.values()
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    pub fn request_records(&self) -> Vec<RequestRecord> {
        let mut placement: BTreeMap<RequestId, LoadId> = BTreeMap::new();
        for load in self.loads.values() {
            placement.extend(load.requests.iter().map(|request| (*request, load.id)));
        }
        self.requests
            .iter()
            .map(|request| {
                let load = placement.get(&request.id).copied();
                RequestRecord {
                    request: request.clone(),
                    zone: self.zones.get(&request.id).cloned(),
                    load,
                    slot: load.and_then(|load| self.slot_of(load)).cloned(),
                }
            })
            .collect()
    }

    pub fn truck_assignments(&self) -> Vec<TruckAssignment> {
        self.loads
            .values()
            .map(|load| TruckAssignment {
                load: load.clone(),
                slot: self.slot_of(load.id).cloned(),
            })
            .collect()
    }

    pub fn dashboard_summary(&self) -> DashboardSummary {
        let mut summary = DashboardSummary {
            version: self.version,
            total_requests: self.requests.len(),
            ..DashboardSummary::default()
        };
        for request in &self.requests {
            *summary.by_status.entry(request.status).or_default() += 1;
            *summary.by_size.entry(request.size).or_default() += 1;
            *summary.by_kind.entry(request.kind).or_default() += 1;
            if let Some(zone) = self.zones.get(&request.id) {
                *summary.by_zone.entry(zone.to_string()).or_default() += 1;
            }
        }
        summary.total_loads = self.loads.len();
        summary.scheduled_loads = self
            .loads
            .keys()
            .filter(|load| self.slot_of(**load).is_some())
            .count();
        for route in self.routes.values() {
            summary.total_distance_miles += route.distance_miles;
            summary.total_round_trip_miles += route.round_trip_miles;
            summary.total_estimated_minutes += route.estimated_minutes;
        }
        summary.total_slots = self.calendar.slots().count();
        summary.occupied_slots = self.calendar.slots().filter(|slot| slot.is_occupied()).count();
        summary.truck_utilisation = self.calendar.utilisation();
        summary.bookings = self.bookings.len();
        summary.unassigned = self.unassigned.clone();
        summary
    }

    /// Per-zone totals, in zone key order.
    pub fn zone_summary(&self) -> Vec<ZoneSummary> {
        let mut zones: BTreeMap<&ZoneKey, ZoneSummary> = BTreeMap::new();
        for zone in self.zones.values() {
            zones.entry(zone).or_insert_with(|| ZoneSummary::new(zone.clone())).requests += 1;
        }
        for load in self.loads.values() {
            let entry = zones
                .entry(&load.zone)
                .or_insert_with(|| ZoneSummary::new(load.zone.clone()));
            entry.loads += 1;
            if let Some(slot) = self.slot_of(load.id) {
                entry.scheduled_loads += 1;
                entry.dates.push(slot.date.to_string());
            }
            if let Some(route) = self.routes.get(&load.id) {
                entry.distance_miles += route.distance_miles;
            }
        }
        zones
            .into_values()
            .map(|mut summary| {
                summary.dates.sort();
                summary.dates.dedup();
                summary
            })
            .collect()
    }
}

/// One row of the request table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    #[serde(flatten)]
    pub request: Request,
    pub zone: Option<ZoneKey>,
    pub load: Option<LoadId>,
    pub slot: Option<SlotKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TruckAssignment {
    pub load: TruckLoad,
    pub slot: Option<SlotKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub version: u64,
    pub total_requests: usize,
    pub by_status: BTreeMap<RequestStatus, usize>,
    pub by_size: BTreeMap<SizeCategory, usize>,
    pub by_kind: BTreeMap<RequestKind, usize>,
    pub by_zone: BTreeMap<String, usize>,
    pub total_loads: usize,
    pub scheduled_loads: usize,
    pub total_distance_miles: f64,
    pub total_round_trip_miles: f64,
    pub total_estimated_minutes: f64,
    pub total_slots: usize,
    pub occupied_slots: usize,
    /// Percent of each truck's slots that are occupied.
    pub truck_utilisation: BTreeMap<TruckId, f64>,
    pub bookings: usize,
    pub unassigned: Vec<UnassignedRequest>,
}

impl DashboardSummary {
    pub fn count(&self, status: RequestStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSummary {
    pub zone: ZoneKey,
    pub requests: usize,
    pub loads: usize,
    pub scheduled_loads: usize,
    pub distance_miles: f64,
    /// Distinct service dates, ascending.
    pub dates: Vec<String>,
}

impl ZoneSummary {
    fn new(zone: ZoneKey) -> Self {
        Self {
            zone,
            requests: 0,
            loads: 0,
            scheduled_loads: 0,
            distance_miles: 0.0,
            dates: Vec::new(),
        }
    }
}
