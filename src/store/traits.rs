//! Storage trait for raw (still encrypted) profile rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::onboarding::ProfileField;

/// A profile row as stored: every field is an opaque ciphertext or `None`
/// for the unset sentinel. Nothing at this layer ever sees plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRow {
    pub user_id: String,
    pub birth_date: Option<String>,
    pub birth_time: Option<String>,
    pub birth_place: Option<String>,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileRow {
    /// The stored (encrypted) value for `field`.
    pub fn stored(&self, field: ProfileField) -> Option<&str> {
        match field {
            ProfileField::BirthDate => self.birth_date.as_deref(),
            ProfileField::BirthTime => self.birth_time.as_deref(),
            ProfileField::BirthPlace => self.birth_place.as_deref(),
            ProfileField::FullName => self.full_name.as_deref(),
        }
    }
}

/// Keyed record store for profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the row for `user_id`, if one exists.
    async fn get_profile_row(&self, user_id: &str) -> Result<Option<ProfileRow>, DatabaseError>;

    /// Insert an all-unset row. Returns `false` if the user already had one.
    async fn create_profile_row(&self, user_id: &str) -> Result<bool, DatabaseError>;

    /// Overwrite one field. `None` writes the unset sentinel.
    async fn update_field(
        &self,
        user_id: &str,
        field: ProfileField,
        stored: Option<&str>,
    ) -> Result<(), DatabaseError>;
}
