//! Parcel repository
//!
//! The GIS pipeline sees the parcels table through [`ParcelStore`]: lookups
//! by stable placemark id or exact name, sync inserts, geometry-only updates
//! and the feed query. Business columns (status, price, owner, ...) are
//! read here but only ever written by the CRUD layer.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use geojson::GeoJson;
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::models::{NewParcel, Parcel, SyncGeometryUpdate};
use crate::{Error, Result};

/// Datastore operations used by the sync pipeline and the feed
#[async_trait]
pub trait ParcelStore: Send + Sync {
    /// Cheap reachability check, run before a sync batch starts
    async fn ping(&self) -> Result<()>;

    /// Fetch one parcel by id
    async fn get(&self, id: Uuid) -> Result<Option<Parcel>>;

    /// Look up by stable external placemark id
    async fn find_by_placemark_id(&self, placemark_id: &str) -> Result<Option<Parcel>>;

    /// Look up by exact, case-sensitive name; oldest parcel wins on duplicates
    async fn find_by_name(&self, name: &str) -> Result<Option<Parcel>>;

    /// Exact name lookup restricted to parcels not yet linked to a placemark
    async fn find_unlinked_by_name(&self, name: &str) -> Result<Option<Parcel>>;

    /// Insert a parcel created by a sync run
    async fn insert(&self, parcel: &NewParcel) -> Result<Uuid>;

    /// Overwrite geometry and sync provenance, nothing else
    async fn update_sync_geometry(&self, id: Uuid, update: &SyncGeometryUpdate) -> Result<()>;

    /// All parcels with non-null geometry, by name
    async fn list_with_geometry(&self) -> Result<Vec<Parcel>>;
}

/// Raw parcels row
#[derive(Debug, sqlx::FromRow)]
struct ParcelRow {
    id: String,
    name: String,
    status: String,
    geometry: Option<String>,
    area_hectares: Option<f64>,
    price: Option<f64>,
    owner_name: Option<String>,
    is_priority: i64,
    kmz_file_id: Option<String>,
    kmz_placemark_id: Option<String>,
    last_synced_at: Option<String>,
    created_at: String,
    updated_at: String,
}

const SELECT_COLUMNS: &str = "SELECT id, name, status, geometry, area_hectares, price, owner_name, \
     is_priority, kmz_file_id, kmz_placemark_id, last_synced_at, created_at, updated_at \
     FROM parcels";

impl TryFrom<ParcelRow> for Parcel {
    type Error = Error;

    fn try_from(row: ParcelRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| Error::InvalidInput(format!("Bad parcel id {}: {}", row.id, e)))?;

        // A CRUD-layer row with unreadable geometry is treated as having none
        let geometry = match row.geometry.as_deref() {
            Some(text) if !text.trim().is_empty() => match text.parse::<GeoJson>() {
                Ok(geojson) => Some(geojson),
                Err(e) => {
                    warn!(parcel_id = %id, error = %e, "Ignoring undecodable parcel geometry");
                    None
                }
            },
            _ => None,
        };

        Ok(Parcel {
            id,
            name: row.name,
            status: row.status,
            geometry,
            area_hectares: row.area_hectares,
            price: row.price,
            owner_name: row.owner_name,
            is_priority: row.is_priority != 0,
            kmz_file_id: row.kmz_file_id,
            kmz_placemark_id: row.kmz_placemark_id,
            last_synced_at: row.last_synced_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

/// RFC 3339 as written by this crate, or SQLite's `CURRENT_TIMESTAMP` form
/// (`YYYY-MM-DD HH:MM:SS[.fff]`, UTC) as written by the CRUD layer
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|e| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
                .map(|naive| naive.and_utc())
                .map_err(|_| e)
        })
        .map_err(|e| Error::InvalidInput(format!("Bad timestamp {}: {}", value, e)))
}

fn geometry_text(geometry: &geojson::Geometry) -> Result<String> {
    serde_json::to_string(geometry)
        .map_err(|e| Error::Internal(format!("Serialize geometry failed: {}", e)))
}

/// SQLite-backed [`ParcelStore`]
#[derive(Clone)]
pub struct SqliteParcelStore {
    pool: SqlitePool,
}

impl SqliteParcelStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<Parcel>> {
        let sql = format!("{} WHERE {} ORDER BY created_at, id LIMIT 1", SELECT_COLUMNS, clause);
        let row: Option<ParcelRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Parcel::try_from).transpose()
    }
}

#[async_trait]
impl ParcelStore for SqliteParcelStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Parcel>> {
        self.fetch_one_where("id = ?", &id.to_string()).await
    }

    async fn find_by_placemark_id(&self, placemark_id: &str) -> Result<Option<Parcel>> {
        self.fetch_one_where("kmz_placemark_id = ?", placemark_id).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Parcel>> {
        self.fetch_one_where("name = ?", name).await
    }

    async fn find_unlinked_by_name(&self, name: &str) -> Result<Option<Parcel>> {
        self.fetch_one_where("name = ? AND kmz_placemark_id IS NULL", name)
            .await
    }

    async fn insert(&self, parcel: &NewParcel) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = parcel.synced_at.to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO parcels (
                id, name, status, geometry, kmz_file_id, kmz_placemark_id,
                last_synced_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&parcel.name)
        .bind(parcel.status.as_str())
        .bind(geometry_text(&parcel.geometry)?)
        .bind(&parcel.kmz_file_id)
        .bind(&parcel.kmz_placemark_id)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update_sync_geometry(&self, id: Uuid, update: &SyncGeometryUpdate) -> Result<()> {
        let synced_at = update.synced_at.to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE parcels SET
                geometry = ?,
                kmz_file_id = ?,
                kmz_placemark_id = COALESCE(?, kmz_placemark_id),
                last_synced_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(geometry_text(&update.geometry)?)
        .bind(&update.kmz_file_id)
        .bind(&update.kmz_placemark_id)
        .bind(&synced_at)
        .bind(&synced_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Parcel {}", id)));
        }

        Ok(())
    }

    async fn list_with_geometry(&self) -> Result<Vec<Parcel>> {
        let sql = format!(
            "{} WHERE geometry IS NOT NULL AND geometry != '' ORDER BY name, id",
            SELECT_COLUMNS
        );
        let rows: Vec<ParcelRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        let parcels = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                Parcel::try_from(row)
                    .map_err(|e| warn!(parcel_id = %id, error = %e, "Skipping unreadable parcel row"))
                    .ok()
            })
            .collect();

        Ok(parcels)
    }
}
