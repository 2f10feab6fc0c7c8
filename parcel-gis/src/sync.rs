//! End-to-end sync runs
//!
//! One run: resolve the source reference, load the credential, fetch the
//! file, unwrap the KMZ (or accept raw KML), parse placemarks and reconcile
//! them against the parcel store. The credential lives for the duration of
//! the run only.

use chrono::Utc;
use geojson::{feature::Id, Feature, FeatureCollection, JsonObject};
use parcel_common::db::{settings, ParcelStore};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use crate::fetch::{FetchError, FetchOutcome, FileFetcher, FileReference};
use crate::geometry::parse_coordinates;
use crate::google::{CredentialSource, ServiceCredential, TokenError};
use crate::kml::{parse_placemarks, Placemark};
use crate::kmz::{decode_kml_bytes, extract_kml, is_zip, ArchiveError};
use crate::reconcile::{reconcile, ReconcileError, ReconcileSummary};

/// Errors that abort a whole sync run
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No KMZ file configured: pass a fileId or set the default sync file")]
    MissingFileId,

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("No placemarks with coordinates found in the KML document")]
    NoPlacemarks,

    #[error("Service credential rejected: {0}")]
    Credential(#[source] TokenError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("Settings lookup failed: {0}")]
    Settings(#[from] parcel_common::Error),
}

/// Outcome of a completed sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
    pub imported: usize,
    pub updated: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl SyncReport {
    fn from_summary(summary: &ReconcileSummary) -> Self {
        let errors = summary.errors();
        let message = format!(
            "Synchronized {} placemarks: {} imported, {} updated, {} failed",
            summary.total(),
            summary.created(),
            summary.updated(),
            errors.len()
        );

        Self {
            success: true,
            message,
            imported: summary.created(),
            updated: summary.updated(),
            total: summary.total(),
            errors: (!errors.is_empty()).then_some(errors),
            warning: None,
        }
    }

    fn not_binary(reason: String) -> Self {
        Self {
            success: true,
            message: "Nothing to synchronize".to_string(),
            imported: 0,
            updated: 0,
            total: 0,
            errors: None,
            warning: Some(reason),
        }
    }
}

/// Placemarks of one file as GeoJSON, without touching the store
#[derive(Debug, Clone)]
pub struct GeoJsonPreview {
    /// `None` when the reference is not binary content
    pub collection: Option<FeatureCollection>,
    pub placemarks: usize,
    pub warning: Option<String>,
}

/// KML text, or the reason there is none
enum LoadedDocument {
    Kml(String),
    NotBinary(String),
}

/// Pick the file to sync: the request's value, else the persisted default
pub async fn resolve_reference(
    db: &SqlitePool,
    requested: Option<&str>,
) -> Result<FileReference, SyncError> {
    if let Some(reference) = requested.and_then(FileReference::parse) {
        return Ok(reference);
    }

    settings::get_kmz_sync_file_id(db)
        .await?
        .and_then(|id| FileReference::parse(&id))
        .ok_or(SyncError::MissingFileId)
}

/// Turn downloaded bytes into KML text
///
/// Zip containers are unwrapped; anything else must already be a KML
/// document.
pub fn document_text(bytes: &[u8]) -> Result<String, ArchiveError> {
    if is_zip(bytes) {
        return extract_kml(bytes);
    }

    let text = decode_kml_bytes(bytes);
    if text.to_ascii_lowercase().contains("<kml") {
        Ok(text)
    } else {
        Err(ArchiveError::NotAnArchive)
    }
}

/// Runs the fetch → parse → reconcile pipeline
#[derive(Clone)]
pub struct SyncPipeline {
    fetcher: FileFetcher,
    credentials: CredentialSource,
}

impl SyncPipeline {
    pub fn new(fetcher: FileFetcher, credentials: CredentialSource) -> Self {
        Self {
            fetcher,
            credentials,
        }
    }

    /// Fetch the referenced file and reconcile its placemarks into `store`
    pub async fn run(
        &self,
        store: &dyn ParcelStore,
        reference: &FileReference,
    ) -> Result<SyncReport, SyncError> {
        info!(file = reference.label(), "KMZ sync started");

        let kml = match self.load_document(reference).await? {
            LoadedDocument::Kml(kml) => kml,
            LoadedDocument::NotBinary(reason) => {
                info!(file = reference.label(), %reason, "KMZ sync skipped");
                return Ok(SyncReport::not_binary(reason));
            }
        };

        let placemarks = parse_placemarks(&kml);
        if placemarks.is_empty() {
            return Err(SyncError::NoPlacemarks);
        }

        let source_file_id = reference.file_id.as_deref().or(reference.url.as_deref());
        let summary = reconcile(store, &placemarks, source_file_id, Utc::now()).await?;
        let report = SyncReport::from_summary(&summary);

        info!(
            file = reference.label(),
            imported = report.imported,
            updated = report.updated,
            total = report.total,
            "KMZ sync finished"
        );

        Ok(report)
    }

    /// Fetch and parse the referenced file into a FeatureCollection
    ///
    /// Placemarks whose coordinates do not parse are left out.
    pub async fn preview(&self, reference: &FileReference) -> Result<GeoJsonPreview, SyncError> {
        let kml = match self.load_document(reference).await? {
            LoadedDocument::Kml(kml) => kml,
            LoadedDocument::NotBinary(reason) => {
                return Ok(GeoJsonPreview {
                    collection: None,
                    placemarks: 0,
                    warning: Some(reason),
                })
            }
        };

        let placemarks = parse_placemarks(&kml);
        if placemarks.is_empty() {
            return Err(SyncError::NoPlacemarks);
        }

        let features: Vec<Feature> = placemarks.iter().filter_map(to_feature).collect();
        let skipped = placemarks.len() - features.len();
        let warning = (skipped > 0)
            .then(|| format!("{} placemarks skipped: no valid coordinates", skipped));

        Ok(GeoJsonPreview {
            collection: Some(FeatureCollection {
                bbox: None,
                features,
                foreign_members: None,
            }),
            placemarks: placemarks.len(),
            warning,
        })
    }

    async fn load_document(&self, reference: &FileReference) -> Result<LoadedDocument, SyncError> {
        let (credential, credential_error) = self.load_credential();

        let fetched = self.fetcher.fetch(reference, credential.as_ref()).await;
        let outcome = match (fetched, credential_error) {
            (Ok(outcome), _) => outcome,
            // A broken credential only matters once every public path failed too
            (Err(FetchError::DownloadFailed { .. }), Some(e)) => {
                return Err(SyncError::Credential(e))
            }
            (Err(FetchError::Token(e)), _) => return Err(SyncError::Credential(e)),
            (Err(e), _) => return Err(e.into()),
        };

        match outcome {
            FetchOutcome::Content(bytes) => Ok(LoadedDocument::Kml(document_text(&bytes)?)),
            FetchOutcome::NotBinary { reason } => Ok(LoadedDocument::NotBinary(reason)),
        }
    }

    fn load_credential(&self) -> (Option<ServiceCredential>, Option<TokenError>) {
        match self.credentials.load() {
            Ok(credential) => (credential, None),
            Err(e) => {
                warn!(error = %e, "Service credential unusable, trying public download only");
                (None, Some(e))
            }
        }
    }
}

fn to_feature(placemark: &Placemark) -> Option<Feature> {
    let geometry = parse_coordinates(&placemark.coordinates).ok()?;

    let mut properties = JsonObject::new();
    properties.insert("name".to_string(), JsonValue::String(placemark.name.clone()));
    if let Some(id) = &placemark.external_id {
        properties.insert("id".to_string(), JsonValue::String(id.clone()));
    }

    Some(Feature {
        bbox: None,
        geometry: Some(geometry),
        id: placemark.external_id.clone().map(Id::String),
        properties: Some(properties),
        foreign_members: None,
    })
}
