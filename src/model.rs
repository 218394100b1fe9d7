//! Planning domain types: requests, truck loads, routes and calendar slots.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a textual enum value (size, kind, zone, window) cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what} `{value}`")]
pub struct ParseValueError {
    pub what: &'static str,
    pub value: String,
}

impl ParseValueError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Unique identifier of a pickup/delivery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How much truck space a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
}

impl SizeCategory {
    pub const ALL: [SizeCategory; 3] = [SizeCategory::Small, SizeCategory::Medium, SizeCategory::Large];

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeCategory::Small => "small",
            SizeCategory::Medium => "medium",
            SizeCategory::Large => "large",
        }
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeCategory {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(SizeCategory::Small),
            "medium" => Ok(SizeCategory::Medium),
            "large" => Ok(SizeCategory::Large),
            _ => Err(ParseValueError::new("size category", value)),
        }
    }
}

/// Whether the truck collects furniture from a donor or drops it at a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Pickup,
    Delivery,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Pickup => "pickup",
            RequestKind::Delivery => "delivery",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = ParseValueError;

    /// Unspecified requests are treated as deliveries.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pickup" | "pick up" | "pick-up" => Ok(RequestKind::Pickup),
            "delivery" | "unspecified" | "" => Ok(RequestKind::Delivery),
            _ => Err(ParseValueError::new("request kind", value)),
        }
    }
}

/// Lifecycle of a request. Only the coordinator moves a request between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Not part of any load (new, unassignable, or carried forward).
    Pending,
    /// Packed into a load that holds no time slot.
    Assigned,
    /// Packed into a load bound to a time slot.
    Scheduled,
}

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Inclusive range of dates on which a request may be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    earliest: NaiveDate,
    latest: NaiveDate,
}

impl DateWindow {
    /// Returns `None` when `latest` precedes `earliest`.
    pub fn new(earliest: NaiveDate, latest: NaiveDate) -> Option<Self> {
        (earliest <= latest).then_some(Self { earliest, latest })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            earliest: date,
            latest: date,
        }
    }

    pub fn earliest(&self) -> NaiveDate {
        self.earliest
    }

    pub fn latest(&self) -> NaiveDate {
        self.latest
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.earliest <= date && date <= self.latest
    }

    pub fn intersection(&self, other: &Self) -> Option<Self> {
        Self::new(self.earliest.max(other.earliest), self.latest.min(other.latest))
    }
}

/// A cleaned pickup/delivery request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub kind: RequestKind,
    pub size: SizeCategory,
    pub coordinates: Coordinates,
    pub zip: Option<String>,
    pub address: String,
    pub date_window: Option<DateWindow>,
    /// Date the request came in; earlier requests are packed first.
    pub requested_on: Option<NaiveDate>,
    pub status: RequestStatus,
}

impl Request {
    pub fn new(id: u64, size: SizeCategory, coordinates: Coordinates) -> Self {
        Self {
            id: RequestId(id),
            kind: RequestKind::Delivery,
            size,
            coordinates,
            zip: None,
            address: String::new(),
            date_window: None,
            requested_on: None,
            status: RequestStatus::Pending,
        }
    }

    pub fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_zip(mut self, zip: impl Into<String>) -> Self {
        self.zip = Some(zip.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_date_window(mut self, window: DateWindow) -> Self {
        self.date_window = Some(window);
        self
    }

    pub fn with_requested_on(mut self, date: NaiveDate) -> Self {
        self.requested_on = Some(date);
        self
    }
}

// ============================================================================
// Capacity
// ============================================================================

/// Count of small/medium/large items.
///
/// Used both as the capacity signature of a load and as an admissible
/// capacity profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeMix {
    pub small: u8,
    pub medium: u8,
    pub large: u8,
}

impl SizeMix {
    pub const fn new(small: u8, medium: u8, large: u8) -> Self {
        Self { small, medium, large }
    }

    pub fn of(size: SizeCategory) -> Self {
        Self::default().with(size).unwrap_or_default()
    }

    pub fn count(&self, size: SizeCategory) -> u8 {
        match size {
            SizeCategory::Small => self.small,
            SizeCategory::Medium => self.medium,
            SizeCategory::Large => self.large,
        }
    }

    pub fn total(&self) -> u16 {
        u16::from(self.small) + u16::from(self.medium) + u16::from(self.large)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// The mix with one more item of `size`, or `None` on overflow.
    pub fn with(&self, size: SizeCategory) -> Option<Self> {
        let mut next = *self;
        let slot = match size {
            SizeCategory::Small => &mut next.small,
            SizeCategory::Medium => &mut next.medium,
            SizeCategory::Large => &mut next.large,
        };
        *slot = slot.checked_add(1)?;
        Some(next)
    }

    /// True when every count is at most the profile's count.
    pub fn fits_within(&self, profile: &SizeMix) -> bool {
        self.small <= profile.small && self.medium <= profile.medium && self.large <= profile.large
    }

    /// Size categories present in this mix.
    pub fn sizes(&self) -> impl Iterator<Item = SizeCategory> + '_ {
        SizeCategory::ALL.into_iter().filter(|size| self.count(*size) > 0)
    }
}

impl fmt::Display for SizeMix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}S+{}M+{}L", self.small, self.medium, self.large)
    }
}

impl FromIterator<SizeCategory> for SizeMix {
    fn from_iter<I: IntoIterator<Item = SizeCategory>>(iter: I) -> Self {
        iter.into_iter()
            .fold(SizeMix::default(), |mix, size| mix.with(size).unwrap_or(mix))
    }
}

// ============================================================================
// Zones, trucks and loads
// ============================================================================

/// Geographic grouping key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ZoneKey {
    /// All requests sharing a zip code.
    Zip(String),
    /// A coordinate cluster, numbered in order of first appearance.
    Cluster(u32),
}

const CLUSTER_PREFIX: &str = "cluster-";

impl fmt::Display for ZoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneKey::Zip(zip) => f.write_str(zip),
            ZoneKey::Cluster(label) => write!(f, "{CLUSTER_PREFIX}{label}"),
        }
    }
}

impl FromStr for ZoneKey {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ParseValueError::new("zone", value));
        }
        match value.strip_prefix(CLUSTER_PREFIX) {
            Some(label) => label
                .parse()
                .map(ZoneKey::Cluster)
                .map_err(|_| ParseValueError::new("zone", value)),
            None => Ok(ZoneKey::Zip(value.to_string())),
        }
    }
}

impl From<ZoneKey> for String {
    fn from(zone: ZoneKey) -> Self {
        zone.to_string()
    }
}

impl TryFrom<String> for ZoneKey {
    type Error = ParseValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Identifier of a truck in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TruckId(pub String);

impl TruckId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TruckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A truck and the size categories it is equipped to carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruckSpec {
    pub id: TruckId,
    #[serde(default = "all_sizes")]
    pub carries: Vec<SizeCategory>,
}

fn all_sizes() -> Vec<SizeCategory> {
    SizeCategory::ALL.to_vec()
}

impl TruckSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: TruckId::new(id),
            carries: all_sizes(),
        }
    }

    pub fn carrying(mut self, sizes: &[SizeCategory]) -> Self {
        self.carries = sizes.to_vec();
        self
    }

    /// Check if the truck can carry every size present in the mix.
    pub fn can_carry(&self, mix: &SizeMix) -> bool {
        mix.sizes().all(|size| self.carries.contains(&size))
    }
}

/// Identifier of a truck load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum LoadId {
    /// Produced by a planning pass, numbered from 1 in pass order.
    Planned(u32),
    /// Created by a manual booking for a single request.
    Booked(RequestId),
}

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadId::Planned(number) => write!(f, "LOAD-{number}"),
            LoadId::Booked(request) => write!(f, "BOOKED-{request}"),
        }
    }
}

impl FromStr for LoadId {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let parsed = if let Some(number) = value.strip_prefix("LOAD-") {
            number.parse().ok().map(LoadId::Planned)
        } else if let Some(request) = value.strip_prefix("BOOKED-") {
            request.parse().ok().map(|id| LoadId::Booked(RequestId(id)))
        } else {
            None
        };
        parsed.ok_or_else(|| ParseValueError::new("load id", value))
    }
}

impl From<LoadId> for String {
    fn from(id: LoadId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for LoadId {
    type Error = ParseValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A capacity-feasible bundle of requests for one truck trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruckLoad {
    pub id: LoadId,
    pub zone: ZoneKey,
    pub requests: Vec<RequestId>,
    /// Items currently held; always fits within `profile`.
    pub signature: SizeMix,
    /// The admissible profile this load is filled towards.
    pub profile: SizeMix,
    /// Dates every member accepts; `None` means unconstrained.
    pub date_window: Option<DateWindow>,
    /// Set once the load is bound to a time slot; closed to new requests.
    pub finalized: bool,
}

/// Why a request was left out of every load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnassignedReason {
    /// No admissible profile holds an item of this size.
    NoAdmissibleProfile,
    /// A new load was needed but the batch load limit was reached.
    BatchLimitReached,
    /// The load it joined never filled a profile and partial loads are held back.
    PartialLoadCarried,
    /// Packed, but no time slot could take the load.
    NoAvailability,
}

impl fmt::Display for UnassignedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnassignedReason::NoAdmissibleProfile => "no admissible profile",
            UnassignedReason::BatchLimitReached => "batch load limit reached",
            UnassignedReason::PartialLoadCarried => "partial load carried forward",
            UnassignedReason::NoAvailability => "no time slot available",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnassignedRequest {
    pub request: RequestId,
    pub reason: UnassignedReason,
}

// ============================================================================
// Routes
// ============================================================================

/// One stop on a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub request: RequestId,
    pub kind: RequestKind,
    pub size: SizeCategory,
    pub coordinates: Coordinates,
}

impl From<&Request> for Stop {
    fn from(request: &Request) -> Self {
        Self {
            request: request.id,
            kind: request.kind,
            size: request.size,
            coordinates: request.coordinates,
        }
    }
}

/// Ordered visiting sequence for one load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub load: LoadId,
    pub stops: Vec<Stop>,
    /// Sum of stop-to-stop legs; zero for 0 or 1 stops.
    pub distance_miles: f64,
    /// Depot to first stop, through all stops, and back to the depot.
    pub round_trip_miles: f64,
    pub estimated_minutes: f64,
}

impl Route {
    pub fn request_ids(&self) -> Vec<RequestId> {
        self.stops.iter().map(|stop| stop.request).collect()
    }
}

// ============================================================================
// Calendar
// ============================================================================

/// Time-of-day window of a slot, e.g. `09:00-11:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TimeWindow {
    start: NaiveTime,
    end: NaiveTime,
}

const TIME_FORMAT: &str = "%H:%M";

impl TimeWindow {
    /// Returns `None` unless `start` is strictly before `end`.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Window from whole hours; `None` for out-of-range or inverted hours.
    pub fn hours(start: u32, end: u32) -> Option<Self> {
        Self::new(
            NaiveTime::from_hms_opt(start, 0, 0)?,
            NaiveTime::from_hms_opt(end, 0, 0)?,
        )
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format(TIME_FORMAT),
            self.end.format(TIME_FORMAT)
        )
    }
}

impl FromStr for TimeWindow {
    type Err = ParseValueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseValueError::new("time window", value);
        let (start, end) = value.split_once('-').ok_or_else(invalid)?;
        let start = NaiveTime::parse_from_str(start.trim(), TIME_FORMAT).map_err(|_| invalid())?;
        let end = NaiveTime::parse_from_str(end.trim(), TIME_FORMAT).map_err(|_| invalid())?;
        Self::new(start, end).ok_or_else(invalid)
    }
}

impl From<TimeWindow> for String {
    fn from(window: TimeWindow) -> Self {
        window.to_string()
    }
}

impl TryFrom<String> for TimeWindow {
    type Error = ParseValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Calendar coordinate of a slot. Ordered by date, then window, then truck.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub truck: TruckId,
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.date, self.window, self.truck)
    }
}

/// Whether a slot was taken by a planning pass or by an external booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingSource {
    Planned,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub load: LoadId,
    pub source: BookingSource,
}

/// A bookable (date, window, truck) unit of calendar capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub key: SlotKey,
    pub occupant: Option<Occupant>,
}

impl TimeSlot {
    pub fn free(key: SlotKey) -> Self {
        Self { key, occupant: None }
    }

    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }
}

/// Record of a slot claimed through the booking operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub request: RequestId,
    pub slot: SlotKey,
    pub zone: String,
    pub size: SizeCategory,
    pub address: String,
    pub created_at: DateTime<Utc>,
}
