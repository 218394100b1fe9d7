//! Omaha / Council Bluffs addresses for realistic test fixtures.
//!
//! Points sit near the zip code centroids of the service area.

use truckload_planner::model::Coordinates;

/// A named location with coordinates and its zip code.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub zip: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, zip: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, zip, lat, lng }
    }

    pub fn coords(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }
}

pub const DEPOT: Location = Location::new("Warehouse", "68105", 41.2565, -95.9345);

// ============================================================================
// Midtown / North Omaha
// ============================================================================

pub const MIDTOWN: &[Location] = &[
    Location::new("Benson", "68104", 41.2850, -95.9540),
    Location::new("Dundee", "68104", 41.2610, -95.9890),
    Location::new("Keystone", "68104", 41.3080, -95.9770),
    Location::new("Fontenelle Park", "68111", 41.2920, -95.9480),
    Location::new("Miller Park", "68111", 41.3270, -95.9550),
    Location::new("Florence", "68111", 41.3390, -95.9620),
];

// ============================================================================
// West Omaha
// ============================================================================

pub const WEST: &[Location] = &[
    Location::new("Millard", "68134", 41.2060, -96.1220),
    Location::new("Boys Town", "68134", 41.2600, -96.1330),
    Location::new("Westroads", "68124", 41.2640, -96.0690),
    Location::new("Rockbrook", "68124", 41.2400, -96.0490),
];

// ============================================================================
// Council Bluffs
// ============================================================================

pub const COUNCIL_BLUFFS: &[Location] = &[
    Location::new("Bayliss Park", "51501", 41.2600, -95.8500),
    Location::new("Lake Manawa", "51501", 41.2180, -95.8590),
    Location::new("Fairmount Park", "51501", 41.2500, -95.8320),
];
