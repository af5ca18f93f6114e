//! libSQL backend: async `ProfileStore` implementation.
//!
//! One connection behind one async mutex: every read and write in the process
//! goes through the same gate. Write volume is a handful of rows per user, so
//! store-wide serialization is fine here.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::onboarding::ProfileField;
use crate::store::migrations::{self, UNSET_SENTINEL};
use crate::store::traits::{ProfileRow, ProfileStore};

const PROFILE_COLUMNS: &str =
    "user_id, birth_date, birth_time, birth_place, full_name, created_at, updated_at";

/// libSQL database backend.
pub struct LibSqlBackend {
    _db: LibSqlDatabase,
    conn: Mutex<Connection>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            _db: db,
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the store-wide gate.
    async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map the sentinel back to `None`.
fn from_column(value: String) -> Option<String> {
    if value == UNSET_SENTINEL {
        None
    } else {
        Some(value)
    }
}

/// Static statement per field; column names never come from input.
fn update_sql(field: ProfileField) -> &'static str {
    match field {
        ProfileField::BirthDate => {
            "UPDATE profiles SET birth_date = ?1, updated_at = ?2 WHERE user_id = ?3"
        }
        ProfileField::BirthTime => {
            "UPDATE profiles SET birth_time = ?1, updated_at = ?2 WHERE user_id = ?3"
        }
        ProfileField::BirthPlace => {
            "UPDATE profiles SET birth_place = ?1, updated_at = ?2 WHERE user_id = ?3"
        }
        ProfileField::FullName => {
            "UPDATE profiles SET full_name = ?1, updated_at = ?2 WHERE user_id = ?3"
        }
    }
}

/// Map a libsql Row to a ProfileRow. Column order matches PROFILE_COLUMNS.
fn row_to_profile(row: &libsql::Row) -> Result<ProfileRow, libsql::Error> {
    let created: String = row.get(5)?;
    let updated: String = row.get(6)?;
    Ok(ProfileRow {
        user_id: row.get(0)?,
        birth_date: from_column(row.get(1)?),
        birth_time: from_column(row.get(2)?),
        birth_place: from_column(row.get(3)?),
        full_name: from_column(row.get(4)?),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn get_profile_row(&self, user_id: &str) -> Result<Option<ProfileRow>, DatabaseError> {
        let conn = self.conn().await;
        let mut rows = conn
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile_row: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_profile(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("get_profile_row: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile_row: {e}"))),
        }
    }

    async fn create_profile_row(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn().await;
        let now = Utc::now().to_rfc3339();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO profiles (user_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                params![user_id, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_profile_row: {e}")))?;

        if inserted > 0 {
            debug!(user_id, "Profile row created");
        }
        Ok(inserted > 0)
    }

    async fn update_field(
        &self,
        user_id: &str,
        field: ProfileField,
        stored: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn().await;
        let now = Utc::now().to_rfc3339();
        let value = stored.unwrap_or(UNSET_SENTINEL).to_string();
        let updated = conn
            .execute(update_sql(field), params![value, now, user_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("update_field({field}): {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "profile".to_string(),
                id: user_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_user_returns_none() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        assert!(db.get_profile_row("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_is_idempotent_and_all_unset() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        assert!(db.create_profile_row("U1").await.unwrap());
        assert!(!db.create_profile_row("U1").await.unwrap());

        let row = db.get_profile_row("U1").await.unwrap().unwrap();
        assert_eq!(row.user_id, "U1");
        for field in ProfileField::ORDER {
            assert!(row.stored(field).is_none(), "{field} should be unset");
        }
        assert!(row.created_at > DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn update_touches_only_named_field() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.create_profile_row("U1").await.unwrap();
        db.update_field("U1", ProfileField::BirthPlace, Some("opaque"))
            .await
            .unwrap();

        let row = db.get_profile_row("U1").await.unwrap().unwrap();
        assert_eq!(row.stored(ProfileField::BirthPlace), Some("opaque"));
        assert!(row.birth_date.is_none());
        assert!(row.birth_time.is_none());
        assert!(row.full_name.is_none());
    }

    #[tokio::test]
    async fn update_none_writes_sentinel() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.create_profile_row("U1").await.unwrap();
        db.update_field("U1", ProfileField::FullName, Some("x")).await.unwrap();
        db.update_field("U1", ProfileField::FullName, None).await.unwrap();
        let row = db.get_profile_row("U1").await.unwrap().unwrap();
        assert!(row.full_name.is_none());
    }

    #[tokio::test]
    async fn update_unknown_user_is_not_found() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let err = db
            .update_field("ghost", ProfileField::BirthDate, Some("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.create_profile_row("A").await.unwrap();
        db.create_profile_row("B").await.unwrap();
        db.update_field("A", ProfileField::BirthDate, Some("a-date"))
            .await
            .unwrap();
        let b = db.get_profile_row("B").await.unwrap().unwrap();
        assert!(b.birth_date.is_none());
    }

    #[tokio::test]
    async fn local_file_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("profiles.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.create_profile_row("U1").await.unwrap();
            db.update_field("U1", ProfileField::BirthTime, Some("opaque"))
                .await
                .unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let row = db.get_profile_row("U1").await.unwrap().unwrap();
        assert_eq!(row.birth_time.as_deref(), Some("opaque"));
    }
}
