//! Placemark reconciliation against stored parcels
//!
//! Placemarks are processed one at a time, in document order. Two placemarks
//! sharing a name would race to create duplicates if upserts ran
//! concurrently, since the store has no compare-and-swap.
//!
//! Every placemark produces an [`ItemOutcome`]; a bad placemark or a failed
//! write is recorded and the loop moves on. Only an unreachable store before
//! the batch starts fails the whole call.

use chrono::{DateTime, Utc};
use parcel_common::db::ParcelStore;
use parcel_common::models::{NewParcel, SyncGeometryUpdate};
use parcel_common::ParcelStatus;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::geometry::parse_coordinates;
use crate::kml::Placemark;

/// Fatal reconciliation errors
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Parcel store unavailable: {0}")]
    StoreUnavailable(#[source] parcel_common::Error),
}

/// Result for one placemark
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Created { parcel_id: Uuid, name: String },
    Updated { parcel_id: Uuid, name: String },
    Failed { name: String, reason: String },
}

/// Per-item results of one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    pub outcomes: Vec<ItemOutcome>,
}

impl ReconcileSummary {
    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Created { .. }))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Updated { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// `"<placemark>: <reason>"` for each failure
    pub fn errors(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ItemOutcome::Failed { name, reason } => Some(format!("{}: {}", name, reason)),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(o)).count()
    }
}

/// Upsert every placemark into the store
pub async fn reconcile(
    store: &dyn ParcelStore,
    placemarks: &[Placemark],
    source_file_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ReconcileSummary, ReconcileError> {
    store.ping().await.map_err(ReconcileError::StoreUnavailable)?;

    let mut summary = ReconcileSummary {
        outcomes: Vec::with_capacity(placemarks.len()),
    };

    for placemark in placemarks {
        let outcome = reconcile_one(store, placemark, source_file_id, now).await;
        match &outcome {
            ItemOutcome::Failed { name, reason } => {
                warn!(placemark = %name, %reason, "Placemark not synchronized");
            }
            other => debug!(?other, "Placemark synchronized"),
        }
        summary.outcomes.push(outcome);
    }

    info!(
        created = summary.created(),
        updated = summary.updated(),
        failed = summary.failed(),
        "Reconciliation finished"
    );

    Ok(summary)
}

async fn reconcile_one(
    store: &dyn ParcelStore,
    placemark: &Placemark,
    source_file_id: Option<&str>,
    now: DateTime<Utc>,
) -> ItemOutcome {
    let failed = |reason: String| ItemOutcome::Failed {
        name: placemark.name.clone(),
        reason,
    };

    let geometry = match parse_coordinates(&placemark.coordinates) {
        Ok(geometry) => geometry,
        Err(e) => return failed(e.to_string()),
    };

    // A placemark with a stable id may only claim a name-matched parcel that
    // no other placemark owns yet
    let existing = match placemark.external_id.as_deref() {
        Some(external_id) => match store.find_by_placemark_id(external_id).await {
            Ok(Some(parcel)) => Ok(Some(parcel)),
            Ok(None) => store.find_unlinked_by_name(&placemark.name).await,
            Err(e) => Err(e),
        },
        None => store.find_by_name(&placemark.name).await,
    };

    let existing = match existing {
        Ok(existing) => existing,
        Err(e) => return failed(format!("lookup failed: {}", e)),
    };

    match existing {
        Some(parcel) => {
            let update = SyncGeometryUpdate {
                geometry,
                kmz_file_id: source_file_id.map(str::to_string),
                kmz_placemark_id: placemark.external_id.clone(),
                synced_at: now,
            };
            match store.update_sync_geometry(parcel.id, &update).await {
                Ok(()) => ItemOutcome::Updated {
                    parcel_id: parcel.id,
                    name: placemark.name.clone(),
                },
                Err(e) => failed(format!("update failed: {}", e)),
            }
        }
        None => {
            let new_parcel = NewParcel {
                name: placemark.name.clone(),
                status: ParcelStatus::ENTRY,
                geometry,
                kmz_file_id: source_file_id.map(str::to_string),
                kmz_placemark_id: placemark.external_id.clone(),
                synced_at: now,
            };
            match store.insert(&new_parcel).await {
                Ok(parcel_id) => ItemOutcome::Created {
                    parcel_id,
                    name: placemark.name.clone(),
                },
                Err(e) => failed(format!("insert failed: {}", e)),
            }
        }
    }
}
