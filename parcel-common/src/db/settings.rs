//! Settings database operations
//!
//! Key/value accessors over the `settings` table.

use sqlx::{Pool, Sqlite};
use crate::{Error, Result};

#[cfg(test)]
use sqlx::SqlitePool;

/// Settings key holding the default remote file id for sync runs
pub const KMZ_SYNC_FILE_ID_KEY: &str = "kmz_sync_file_id";

/// Get the default sync file id
///
/// **Returns:** Some(id) if set and non-blank, None otherwise
pub async fn get_kmz_sync_file_id(db: &Pool<Sqlite>) -> Result<Option<String>> {
    let value: Option<String> = get_setting(db, KMZ_SYNC_FILE_ID_KEY).await?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Set the default sync file id
pub async fn set_kmz_sync_file_id(db: &Pool<Sqlite>, file_id: &str) -> Result<()> {
    set_setting(db, KMZ_SYNC_FILE_ID_KEY, file_id).await
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT value FROM settings WHERE key = ?"
    )
    .bind(key)
    .fetch_optional(db)
    .await
    .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value.parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting failed: {}", e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value"
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
