//! Error types for planning, persistence and configuration.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::model::{LoadId, RequestId, SizeCategory, SlotKey, UnassignedReason};

/// The four caller-visible planning failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnassignableCapacity,
    NoAvailability,
    InvalidRequest,
    SlotConflict,
}

/// Recoverable planning and booking failures.
///
/// Every operation that returns one of these leaves the planning state exactly
/// as it was before the call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanningError {
    /// The request fits no admissible load this pass.
    #[error("request {request} ({size}) cannot be loaded: {reason}")]
    UnassignableCapacity {
        request: RequestId,
        size: SizeCategory,
        reason: UnassignedReason,
    },
    /// No time slot satisfies the constraints.
    #[error("no time slot available: {detail}")]
    NoAvailability { detail: String },
    /// Malformed or inconsistent input.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        request: Option<RequestId>,
        reason: String,
    },
    /// The targeted slot is already held by another load.
    #[error("slot {slot} is already held by {occupant}")]
    SlotConflict { slot: SlotKey, occupant: LoadId },
}

impl PlanningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlanningError::UnassignableCapacity { .. } => ErrorKind::UnassignableCapacity,
            PlanningError::NoAvailability { .. } => ErrorKind::NoAvailability,
            PlanningError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            PlanningError::SlotConflict { .. } => ErrorKind::SlotConflict,
        }
    }

    pub(crate) fn invalid(request: Option<RequestId>, reason: impl Into<String>) -> Self {
        PlanningError::InvalidRequest {
            request,
            reason: reason.into(),
        }
    }

    pub(crate) fn no_availability(detail: impl Into<String>) -> Self {
        PlanningError::NoAvailability {
            detail: detail.into(),
        }
    }
}

/// Failures reading or writing planning tables.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O failure on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV failure on {}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    /// A row parsed but violates a data model invariant.
    #[error("corrupt record in {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
}

/// Failures loading or validating a [`crate::config::PlannerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
