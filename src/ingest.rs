//! Ingestion boundary: raw request records in, validated [`Request`]s out.
//!
//! Raw records are loosely typed (everything is optional text, as exported
//! by the intake spreadsheet). Validation either produces a typed request or
//! rejects the record with an invalid-request error; nothing malformed gets
//! past this module.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PlanningError, StoreError};
use crate::model::{Coordinates, DateWindow, Request, RequestId, RequestKind, RequestStatus, SizeCategory};
use crate::traits::RequestSource;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A request record as it arrives from the cleaning step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRequest {
    pub id: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub size: Option<String>,
    pub request_type: Option<String>,
    pub zip: Option<String>,
    pub address: Option<String>,
    pub earliest_date: Option<String>,
    pub latest_date: Option<String>,
    pub requested_on: Option<String>,
}

/// Zip code centroids used when a record carries no coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ZipDirectory {
    centroids: BTreeMap<String, Coordinates>,
}

impl Default for ZipDirectory {
    /// Omaha / Council Bluffs service area.
    fn default() -> Self {
        Self::new([
            ("68104", Coordinates::new(41.3114, -95.9208)),
            ("68111", Coordinates::new(41.3456, -95.9017)),
            ("68134", Coordinates::new(41.2072, -96.1003)),
            ("68106", Coordinates::new(41.2033, -95.9778)),
            ("68127", Coordinates::new(41.1544, -96.0142)),
            ("68130", Coordinates::new(40.8136, -96.6917)),
            ("68137", Coordinates::new(41.1836, -95.8975)),
            ("68108", Coordinates::new(41.2203, -95.8608)),
            ("68114", Coordinates::new(41.2203, -95.8608)),
            ("68124", Coordinates::new(41.2500, -96.0500)),
            ("68132", Coordinates::new(41.2203, -95.8608)),
            ("68131", Coordinates::new(41.2978, -96.0419)),
            ("51501", Coordinates::new(41.2619, -95.8608)),
        ])
    }
}

impl ZipDirectory {
    pub fn new<Z: Into<String>>(entries: impl IntoIterator<Item = (Z, Coordinates)>) -> Self {
        Self {
            centroids: entries.into_iter().map(|(zip, point)| (zip.into(), point)).collect(),
        }
    }

    pub fn lookup(&self, zip: &str) -> Option<Coordinates> {
        self.centroids.get(zip.trim()).copied()
    }

    /// First token of a free-text address that is a known zip code.
    pub fn zip_in_address<'a>(&self, address: &'a str) -> Option<&'a str> {
        address
            .split_whitespace()
            .map(|part| part.trim_matches(|c: char| c == ',' || c == '.'))
            .find(|part| self.centroids.contains_key(*part))
    }
}

/// Result of ingesting a batch of raw records.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub accepted: Vec<Request>,
    pub rejected: Vec<PlanningError>,
}

/// Validate a batch, keeping input order and rejecting duplicate identifiers.
pub fn ingest(raws: impl IntoIterator<Item = RawRequest>, zips: &ZipDirectory) -> IngestOutcome {
    let mut outcome = IngestOutcome::default();
    let mut seen: BTreeSet<RequestId> = BTreeSet::new();

    for raw in raws {
        let validated = validate(&raw, zips).and_then(|request| {
            if seen.insert(request.id) {
                Ok(request)
            } else {
                Err(PlanningError::invalid(Some(request.id), "duplicate request id"))
            }
        });
        match validated {
            Ok(request) => outcome.accepted.push(request),
            Err(err) => {
                warn!(error = %err, "rejected request record");
                outcome.rejected.push(err);
            }
        }
    }

    debug!(
        accepted = outcome.accepted.len(),
        rejected = outcome.rejected.len(),
        "ingested request batch"
    );
    outcome
}

/// Validate a single raw record.
pub fn validate(raw: &RawRequest, zips: &ZipDirectory) -> Result<Request, PlanningError> {
    let id_text = text(&raw.id).ok_or_else(|| PlanningError::invalid(None, "missing request id"))?;
    let id = id_text
        .parse::<u64>()
        .map(RequestId)
        .map_err(|_| PlanningError::invalid(None, format!("request id `{id_text}` is not a number")))?;
    let invalid = |reason: String| PlanningError::invalid(Some(id), reason);

    let size = text(&raw.size)
        .ok_or_else(|| invalid("missing size category".into()))?
        .parse::<SizeCategory>()
        .map_err(|err| invalid(err.to_string()))?;

    let kind = text(&raw.request_type)
        .map(str::parse::<RequestKind>)
        .transpose()
        .map_err(|err| invalid(err.to_string()))?
        .unwrap_or(RequestKind::Delivery);

    let address = text(&raw.address).unwrap_or_default().to_string();
    let zip = text(&raw.zip)
        .or_else(|| zips.zip_in_address(&address))
        .map(str::to_string);

    let coordinates = match (text(&raw.latitude), text(&raw.longitude)) {
        (Some(lat), Some(lng)) => {
            let lat = lat.parse::<f64>().map_err(|_| invalid(format!("latitude `{lat}` is not a number")))?;
            let lng = lng.parse::<f64>().map_err(|_| invalid(format!("longitude `{lng}` is not a number")))?;
            Coordinates::new(lat, lng)
        }
        (None, None) => zip
            .as_deref()
            .and_then(|zip| zips.lookup(zip))
            .ok_or_else(|| invalid("missing coordinates and no known zip code".into()))?,
        _ => return Err(invalid("latitude and longitude must be given together".into())),
    };
    if !coordinates.is_valid() {
        return Err(invalid(format!("coordinates {coordinates} are out of range")));
    }

    let earliest = parse_date(&raw.earliest_date).map_err(invalid)?;
    let latest = parse_date(&raw.latest_date).map_err(invalid)?;
    let date_window = match (earliest, latest) {
        (None, None) => None,
        (earliest, latest) => Some(
            DateWindow::new(earliest.unwrap_or(NaiveDate::MIN), latest.unwrap_or(NaiveDate::MAX))
                .ok_or_else(|| invalid("date window ends before it starts".into()))?,
        ),
    };

    Ok(Request {
        id,
        kind,
        size,
        coordinates,
        zip,
        address,
        date_window,
        requested_on: parse_date(&raw.requested_on).map_err(invalid)?,
        status: RequestStatus::Pending,
    })
}

fn text(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

fn parse_date(field: &Option<String>) -> Result<Option<NaiveDate>, String> {
    text(field)
        .map(|value| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .map_err(|_| format!("date `{value}` is not YYYY-MM-DD"))
        })
        .transpose()
}

/// Reads raw request records from a CSV export with a header row.
#[derive(Debug, Clone)]
pub struct CsvRequestSource {
    path: PathBuf,
}

impl CsvRequestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RequestSource for CsvRequestSource {
    fn fetch(&self) -> Result<Vec<RawRequest>, StoreError> {
        let csv_error = |source| StoreError::Csv {
            path: self.path.clone(),
            source,
        };
        let mut reader = csv::Reader::from_path(&self.path).map_err(csv_error)?;
        let mut records = Vec::new();
        for record in reader.deserialize() {
            records.push(record.map_err(csv_error)?);
        }
        Ok(records)
    }
}
