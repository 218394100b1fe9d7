//! OSRM HTTP adapter for road-network distance matrices.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::Coordinates;
use crate::traits::DistanceMatrixProvider;

const METRES_PER_MILE: f64 = 1609.344;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Table service URL asking for distances between all locations.
    pub fn table_url(&self, locations: &[Coordinates]) -> String {
        let coords = locations
            .iter()
            .map(|point| format!("{:.6},{:.6}", point.lng, point.lat))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/table/v1/{}/{}?annotations=distance",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            coords
        )
    }
}

impl DistanceMatrixProvider for OsrmClient {
    fn matrix_for(&self, locations: &[Coordinates]) -> Vec<Vec<f64>> {
        if locations.is_empty() {
            return Vec::new();
        }

        let response = self
            .client
            .get(self.table_url(locations))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<OsrmTableResponse>());

        match response {
            Ok(body) => body.into_miles().unwrap_or_else(|| {
                warn!(locations = locations.len(), "OSRM table has unroutable pairs");
                Vec::new()
            }),
            Err(err) => {
                warn!(error = %err, "OSRM table request failed");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    distances: Option<Vec<Vec<Option<f64>>>>,
}

impl OsrmTableResponse {
    /// Converts metres to miles; `None` if any pair is unroutable.
    fn into_miles(self) -> Option<Vec<Vec<f64>>> {
        self.distances?
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|value| value.map(|metres| metres / METRES_PER_MILE))
                    .collect::<Option<Vec<_>>>()
            })
            .collect()
    }
}
