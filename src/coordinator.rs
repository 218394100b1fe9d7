//! Assignment coordinator: runs planning passes and owns the planning state.
//!
//! The state lives behind a `parking_lot::RwLock`. Accessors take the read
//! lock and see one consistent version. Mutations (plan, book, cancel) take
//! the write lock, work on a copy, and commit only when they succeed; a failed
//! call leaves the state untouched.

use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::calendar::Calendar;
use crate::capacity::CapacityPlanner;
use crate::config::PlannerConfig;
use crate::error::{PlanningError, StoreError};
use crate::haversine::HaversineMatrix;
use crate::model::{
    Booking, BookingSource, DateWindow, LoadId, Occupant, Request, RequestId, RequestStatus, Route, SizeCategory,
    SizeMix, SlotKey, Stop, TimeSlot, TimeWindow, TruckId, TruckLoad, UnassignedReason, UnassignedRequest, ZoneKey,
};
use crate::sequencer::RouteSequencer;
use crate::snapshot::{DashboardSummary, PlanSnapshot, RequestRecord, TruckAssignment, ZoneSummary};
use crate::store::TableStore;
use crate::traits::DistanceMatrixProvider;
use crate::zones;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Outcome of one planning pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanReport {
    pub version: u64,
    pub loads: usize,
    pub scheduled_loads: usize,
    pub scheduled_requests: usize,
    pub unassigned: Vec<UnassignedRequest>,
}

/// A booking with typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub request: RequestId,
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub zone: ZoneKey,
    pub size: SizeCategory,
    pub address: String,
    /// Specific truck; `None` takes the first capable free truck.
    pub truck: Option<TruckId>,
}

pub struct AssignmentCoordinator {
    config: PlannerConfig,
    matrix: Box<dyn DistanceMatrixProvider>,
    state: RwLock<PlanSnapshot>,
}

impl AssignmentCoordinator {
    /// Build a coordinator over validated requests. Every request starts
    /// pending; nothing is planned until [`plan`](Self::plan) runs.
    pub fn new(config: PlannerConfig, requests: Vec<Request>) -> Result<Self, PlanningError> {
        config
            .validate()
            .map_err(|err| PlanningError::invalid(None, err.to_string()))?;
        let requests = checked_requests(requests, &BTreeSet::new())?;
        let calendar = Calendar::new(&config.calendar);

        Ok(Self {
            config,
            matrix: Box::new(HaversineMatrix),
            state: RwLock::new(PlanSnapshot::new(requests, calendar)),
        })
    }

    /// Swap the distance source (e.g. an OSRM client).
    pub fn with_matrix_provider(mut self, provider: impl DistanceMatrixProvider + 'static) -> Self {
        self.matrix = Box::new(provider);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Consistent copy of the whole state.
    pub fn snapshot(&self) -> PlanSnapshot {
        self.state.read().clone()
    }

    /// Add newly arrived requests; they are picked up by the next pass.
    pub fn add_requests(&self, requests: Vec<Request>) -> Result<usize, PlanningError> {
        let mut state = self.state.write();
        let known: BTreeSet<RequestId> = state.index.keys().copied().collect();
        let requests = checked_requests(requests, &known)?;

        let mut next = state.clone();
        for request in requests {
            next.index.insert(request.id, next.requests.len());
            next.requests.push(request);
        }
        let added = next.requests.len() - state.requests.len();
        next.version += 1;
        *state = next;
        Ok(added)
    }

    // ========================================================================
    // Planning pass
    // ========================================================================

    /// Recompute zones, loads, routes and planned slots from scratch.
    ///
    /// Manual bookings and their slots are kept; everything a previous pass
    /// produced is discarded first, so two passes over unchanged input give
    /// the same plan.
    pub fn plan(&self) -> PlanReport {
        let mut state = self.state.write();
        let mut next = state.clone();
        self.replan(&mut next);
        next.version += 1;

        let report = PlanReport {
            version: next.version,
            loads: next.loads.len(),
            scheduled_loads: next.loads.keys().filter(|id| next.slot_of(**id).is_some()).count(),
            scheduled_requests: next
                .requests
                .iter()
                .filter(|request| request.status == RequestStatus::Scheduled)
                .count(),
            unassigned: next.unassigned.clone(),
        };
        info!(
            version = report.version,
            loads = report.loads,
            scheduled = report.scheduled_loads,
            unassigned = report.unassigned.len(),
            "planning pass complete"
        );
        *state = next;
        report
    }

    fn replan(&self, state: &mut PlanSnapshot) {
        let released = state.calendar.release_planned();
        state.loads.retain(|id, _| matches!(id, LoadId::Booked(_)));
        state.routes.retain(|id, _| matches!(id, LoadId::Booked(_)));
        state.unassigned.clear();
        debug!(released, "released planned slots");

        let open: Vec<&Request> = state
            .requests
            .iter()
            .filter(|request| !state.bookings.contains_key(&request.id))
            .collect();
        let open_ids: Vec<RequestId> = open.iter().map(|request| request.id).collect();
        let partition = zones::partition(&open, &self.config.zoning);

        // Pack each zone independently; collect keeps zone order
        let planner = CapacityPlanner::new(&self.config.capacity);
        let zoned: Vec<(ZoneKey, Vec<&Request>)> = partition
            .zones()
            .iter()
            .map(|(zone, members)| {
                let members = members.iter().filter_map(|id| state.request(*id)).collect();
                (zone.clone(), members)
            })
            .collect();
        let packed: Vec<_> = zoned
            .par_iter()
            .map(|(zone, members)| planner.pack(zone, members))
            .collect();

        let mut loads: Vec<TruckLoad> = Vec::new();
        let mut unassigned: Vec<UnassignedRequest> = Vec::new();
        for outcome in packed {
            unassigned.extend(outcome.unassigned);
            for load in outcome.loads {
                let number = loads.len() as u32 + 1;
                loads.push(load.into_load(LoadId::Planned(number)));
            }
        }
        for request in &unassigned {
            warn!(request = %request.request, reason = %request.reason, "request left unassigned");
        }

        let sequencer = self.sequencer();
        let current: &PlanSnapshot = state;
        let routes: Vec<Route> = loads
            .par_iter()
            .map(|load| sequencer.sequence(load.id, &stops(current, &load.requests)))
            .collect();

        for (zone, members) in partition.into_inner() {
            for id in members {
                state.zones.insert(id, zone.clone());
            }
        }
        state.set_status(&open_ids, RequestStatus::Pending);

        for (mut load, route) in loads.into_iter().zip(routes) {
            match state.calendar.allocate(&load, BookingSource::Planned) {
                Ok(slot) => {
                    debug!(load = %load.id, slot = %slot, "load scheduled");
                    load.finalized = true;
                    state.set_status(&load.requests, RequestStatus::Scheduled);
                }
                Err(err) => {
                    warn!(load = %load.id, error = %err, "load has no time slot");
                    state.set_status(&load.requests, RequestStatus::Assigned);
                    unassigned.extend(load.requests.iter().map(|request| UnassignedRequest {
                        request: *request,
                        reason: UnassignedReason::NoAvailability,
                    }));
                }
            }
            state.routes.insert(load.id, route);
            state.loads.insert(load.id, load);
        }
        state.unassigned = unassigned;
    }

    fn sequencer(&self) -> RouteSequencer<'_> {
        RouteSequencer::new(self.config.depot, self.matrix.as_ref(), &self.config.routing)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn get_dashboard_summary(&self) -> DashboardSummary {
        self.state.read().dashboard_summary()
    }

    pub fn get_all_requests(&self) -> Vec<RequestRecord> {
        self.state.read().request_records()
    }

    pub fn get_truck_assignments(&self) -> Vec<TruckAssignment> {
        self.state.read().truck_assignments()
    }

    pub fn get_optimal_routes(&self) -> Vec<Route> {
        self.state.read().routes().cloned().collect()
    }

    pub fn get_calendar_data(&self) -> Vec<TimeSlot> {
        self.state.read().calendar().slots().cloned().collect()
    }

    pub fn get_zone_summary(&self) -> Vec<ZoneSummary> {
        self.state.read().zone_summary()
    }

    /// Write the current state as CSV tables.
    pub fn export(&self, store: &TableStore) -> Result<(), StoreError> {
        store.save(&self.state.read(), self.config.depot)
    }

    // ========================================================================
    // Booking
    // ========================================================================

    /// Book a slot from loosely typed fields, as submitted by the booking form.
    pub fn book_time_slot(
        &self,
        request_id: u64,
        date: &str,
        time_slot: &str,
        zone: &str,
        size: &str,
        address: &str,
    ) -> Result<Booking, PlanningError> {
        let request = RequestId(request_id);
        let invalid = |reason: String| PlanningError::invalid(Some(request), reason);

        let date = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
            .map_err(|_| invalid(format!("date `{date}` is not YYYY-MM-DD")))?;
        let window = time_slot.parse::<TimeWindow>().map_err(|err| invalid(err.to_string()))?;
        let zone = zone.parse::<ZoneKey>().map_err(|err| invalid(err.to_string()))?;
        let size = size.parse::<SizeCategory>().map_err(|err| invalid(err.to_string()))?;

        self.book(BookingRequest {
            request,
            date,
            window,
            zone,
            size,
            address: address.trim().to_string(),
            truck: None,
        })
    }

    /// Claim a slot for one request, re-validating it against the current
    /// state. A request already in a load leaves that load first.
    pub fn book(&self, booking: BookingRequest) -> Result<Booking, PlanningError> {
        let mut state = self.state.write();
        let mut next = state.clone();

        let result = self.apply_booking(&mut next, &booking);
        match result {
            Ok(confirmation) => {
                next.version += 1;
                *state = next;
                info!(request = %booking.request, slot = %confirmation.slot, "slot booked");
                Ok(confirmation)
            }
            Err(err) => {
                warn!(request = %booking.request, error = %err, "booking rejected");
                Err(err)
            }
        }
    }

    fn apply_booking(&self, state: &mut PlanSnapshot, booking: &BookingRequest) -> Result<Booking, PlanningError> {
        let id = booking.request;
        let request = state
            .request(id)
            .ok_or_else(|| PlanningError::invalid(Some(id), "unknown request"))?
            .clone();

        if request.size != booking.size {
            return Err(PlanningError::invalid(
                Some(id),
                format!("size {} does not match requested {}", booking.size, request.size),
            ));
        }
        let zone = match state.zone_of(id) {
            Some(zone) => Some(zone.clone()),
            None => self.prospective_zone(state, id),
        };
        if let Some(zone) = zone.filter(|zone| *zone != booking.zone) {
            return Err(PlanningError::invalid(
                Some(id),
                format!("zone {} does not match assigned zone {zone}", booking.zone),
            ));
        }
        if let Some(window) = request.date_window.filter(|window| !window.contains(booking.date)) {
            return Err(PlanningError::no_availability(format!(
                "{} is outside the requested dates {}..={}",
                booking.date,
                window.earliest(),
                window.latest()
            )));
        }

        let mix = SizeMix::of(request.size);
        let planner = CapacityPlanner::new(&self.config.capacity);
        let Some((profile, _)) = planner.best_profile(&mix) else {
            return Err(PlanningError::UnassignableCapacity {
                request: id,
                size: request.size,
                reason: UnassignedReason::NoAdmissibleProfile,
            });
        };

        if !state.calendar.contains_date(booking.date) {
            return Err(PlanningError::no_availability(format!(
                "{} is outside the calendar",
                booking.date
            )));
        }
        if !state.calendar.has_window(&booking.window) {
            return Err(PlanningError::no_availability(format!(
                "window {} is not offered",
                booking.window
            )));
        }

        self.detach(state, id);

        let slot = match &booking.truck {
            Some(truck) => {
                let capable = state.calendar.truck(truck).is_some_and(|spec| spec.can_carry(&mix));
                if !capable {
                    return Err(PlanningError::no_availability(format!("truck {truck} cannot carry {mix}")));
                }
                SlotKey {
                    date: booking.date,
                    window: booking.window,
                    truck: truck.clone(),
                }
            }
            None => state
                .calendar
                .find_free(booking.date, &booking.window, &mix)
                .ok_or_else(|| {
                    PlanningError::no_availability(format!(
                        "no capable truck free on {} {}",
                        booking.date, booking.window
                    ))
                })?,
        };

        let load_id = LoadId::Booked(id);
        state.calendar.book(
            &slot,
            Occupant {
                load: load_id,
                source: BookingSource::Manual,
            },
        )?;

        let load = TruckLoad {
            id: load_id,
            zone: booking.zone.clone(),
            requests: vec![id],
            signature: mix,
            profile,
            date_window: Some(DateWindow::single(booking.date)),
            finalized: true,
        };
        let route = self.sequencer().sequence(load_id, &[Stop::from(&request)]);
        state.loads.insert(load_id, load);
        state.routes.insert(load_id, route);
        state.zones.insert(id, booking.zone.clone());
        state.unassigned.retain(|entry| entry.request != id);
        state.set_status(&[id], RequestStatus::Scheduled);

        let confirmation = Booking {
            request: id,
            slot,
            zone: booking.zone.to_string(),
            size: request.size,
            address: booking.address.clone(),
            created_at: Utc::now(),
        };
        state.bookings.insert(id, confirmation.clone());
        Ok(confirmation)
    }

    /// Zone the next pass would give an unzoned request, clustering it with
    /// the other requests that are not manually booked.
    fn prospective_zone(&self, state: &PlanSnapshot, id: RequestId) -> Option<ZoneKey> {
        let open: Vec<&Request> = state
            .requests
            .iter()
            .filter(|request| !state.bookings.contains_key(&request.id))
            .collect();
        zones::partition(&open, &self.config.zoning).zone_of(id).cloned()
    }

    /// Remove a request from whatever load holds it. A load left empty is
    /// dropped with its slot; otherwise its route is recomputed.
    fn detach(&self, state: &mut PlanSnapshot, id: RequestId) {
        let Some(load_id) = state.load_of(id) else {
            return;
        };
        state.bookings.remove(&id);

        let remaining: Vec<RequestId> = state
            .loads
            .get(&load_id)
            .map(|load| load.requests.iter().copied().filter(|member| *member != id).collect())
            .unwrap_or_default();

        if remaining.is_empty() {
            if let Some(slot) = state.slot_of(load_id).cloned() {
                state.calendar.release(&slot);
            }
            state.loads.remove(&load_id);
            state.routes.remove(&load_id);
            debug!(load = %load_id, "load emptied and dropped");
            return;
        }

        let members: Vec<&Request> = remaining.iter().filter_map(|member| state.request(*member)).collect();
        let signature: SizeMix = members.iter().map(|member| member.size).collect();
        let date_window = common_window(&members);
        let profile = CapacityPlanner::new(&self.config.capacity)
            .best_profile(&signature)
            .map(|(profile, _)| profile);
        let route = self.sequencer().sequence(load_id, &stops(state, &remaining));

        if let Some(load) = state.loads.get_mut(&load_id) {
            load.requests = remaining;
            load.signature = signature;
            load.date_window = date_window;
            if let Some(profile) = profile {
                load.profile = profile;
            }
        }
        state.routes.insert(load_id, route);
        debug!(load = %load_id, request = %id, "request detached from load");
    }

    /// Free a slot. A manual booking's request returns to pending; a planned
    /// load keeps its members, who go back to assigned.
    pub fn cancel_slot(&self, slot: &SlotKey) -> Result<LoadId, PlanningError> {
        let mut state = self.state.write();
        let mut next = state.clone();

        let occupant = match next.calendar.slot(slot) {
            None => return Err(PlanningError::invalid(None, format!("slot {slot} is outside the calendar"))),
            Some(TimeSlot { occupant: None, .. }) => {
                return Err(PlanningError::invalid(None, format!("slot {slot} is not booked")));
            }
            Some(TimeSlot {
                occupant: Some(occupant),
                ..
            }) => *occupant,
        };
        next.calendar.release(slot);

        match occupant.load {
            LoadId::Booked(request) => {
                next.loads.remove(&occupant.load);
                next.routes.remove(&occupant.load);
                next.bookings.remove(&request);
                next.set_status(&[request], RequestStatus::Pending);
            }
            LoadId::Planned(_) => {
                let members = match next.loads.get_mut(&occupant.load) {
                    Some(load) => {
                        load.finalized = false;
                        load.requests.clone()
                    }
                    None => Vec::new(),
                };
                next.set_status(&members, RequestStatus::Assigned);
                next.unassigned.retain(|entry| !members.contains(&entry.request));
                next.unassigned.extend(members.iter().map(|request| UnassignedRequest {
                    request: *request,
                    reason: UnassignedReason::NoAvailability,
                }));
            }
        }

        next.version += 1;
        *state = next;
        info!(slot = %slot, load = %occupant.load, "slot cancelled");
        Ok(occupant.load)
    }
}

/// Reject duplicates and invalid coordinates, and reset statuses.
fn checked_requests(requests: Vec<Request>, known: &BTreeSet<RequestId>) -> Result<Vec<Request>, PlanningError> {
    let mut seen = known.clone();
    requests
        .into_iter()
        .map(|mut request| {
            if !seen.insert(request.id) {
                return Err(PlanningError::invalid(Some(request.id), "duplicate request id"));
            }
            if !request.coordinates.is_valid() {
                return Err(PlanningError::invalid(
                    Some(request.id),
                    format!("coordinates {} are out of range", request.coordinates),
                ));
            }
            request.status = RequestStatus::Pending;
            Ok(request)
        })
        .collect()
}

fn stops(state: &PlanSnapshot, members: &[RequestId]) -> Vec<Stop> {
    members
        .iter()
        .filter_map(|id| state.request(*id))
        .map(Stop::from)
        .collect()
}

fn common_window(members: &[&Request]) -> Option<DateWindow> {
    members
        .iter()
        .filter_map(|member| member.date_window)
        .reduce(|a, b| a.intersection(&b).unwrap_or(a))
}
