//! Parcel model
//!
//! A parcel is the durable land-tract entity. The GIS pipeline only ever
//! writes its geometry and sync provenance; every other business field is
//! owned by the application's CRUD layer.

use chrono::{DateTime, Utc};
use geojson::GeoJson;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Ordered acquisition pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParcelStatus {
    Prospecting,
    FirstContact,
    Negotiation,
    DueDiligence,
    Contract,
    Acquired,
    Discarded,
}

impl ParcelStatus {
    /// All stages in pipeline order
    pub const ALL: [ParcelStatus; 7] = [
        ParcelStatus::Prospecting,
        ParcelStatus::FirstContact,
        ParcelStatus::Negotiation,
        ParcelStatus::DueDiligence,
        ParcelStatus::Contract,
        ParcelStatus::Acquired,
        ParcelStatus::Discarded,
    ];

    /// Entry stage for parcels created by a sync run
    pub const ENTRY: ParcelStatus = ParcelStatus::Prospecting;

    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelStatus::Prospecting => "prospecting",
            ParcelStatus::FirstContact => "first_contact",
            ParcelStatus::Negotiation => "negotiation",
            ParcelStatus::DueDiligence => "due_diligence",
            ParcelStatus::Contract => "contract",
            ParcelStatus::Acquired => "acquired",
            ParcelStatus::Discarded => "discarded",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            ParcelStatus::Prospecting => "Prospecting",
            ParcelStatus::FirstContact => "First contact",
            ParcelStatus::Negotiation => "Negotiation",
            ParcelStatus::DueDiligence => "Due diligence",
            ParcelStatus::Contract => "Contract",
            ParcelStatus::Acquired => "Acquired",
            ParcelStatus::Discarded => "Discarded",
        }
    }
}

impl Default for ParcelStatus {
    fn default() -> Self {
        Self::ENTRY
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParcelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParcelStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown parcel status: {}", s))
    }
}

/// Parcel row as seen by the GIS services
///
/// `status` stays a raw string: the CRUD layer may hold values this crate
/// does not know, and those must survive a sync untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parcel {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    /// GeoJSON geometry, or a Feature/FeatureCollection wrapping one
    pub geometry: Option<GeoJson>,
    pub area_hectares: Option<f64>,
    pub price: Option<f64>,
    pub owner_name: Option<String>,
    pub is_priority: bool,
    /// Remote file this parcel was last synchronized from
    pub kmz_file_id: Option<String>,
    /// Stable placemark id inside that file
    pub kmz_placemark_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Parcel {
    /// Parsed lifecycle stage, `None` for values unknown to this crate
    pub fn parsed_status(&self) -> Option<ParcelStatus> {
        self.status.parse().ok()
    }
}

/// Parcel created by a sync run
#[derive(Debug, Clone)]
pub struct NewParcel {
    pub name: String,
    pub status: ParcelStatus,
    pub geometry: geojson::Geometry,
    pub kmz_file_id: Option<String>,
    pub kmz_placemark_id: Option<String>,
    pub synced_at: DateTime<Utc>,
}

/// The only fields a sync run may change on an existing parcel
#[derive(Debug, Clone)]
pub struct SyncGeometryUpdate {
    pub geometry: geojson::Geometry,
    pub kmz_file_id: Option<String>,
    /// `None` keeps the stored placemark id
    pub kmz_placemark_id: Option<String>,
    pub synced_at: DateTime<Utc>,
}
