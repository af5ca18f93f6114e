//! Encrypted profile store: encryption above the storage boundary.
//!
//! Callers see plaintext `UserProfile`s; the backing `ProfileStore` only ever
//! sees ciphertext and the unset sentinel.

use std::sync::Arc;

use tracing::{debug, error};

use crate::crypto::FieldCipher;
use crate::error::DatabaseError;
use crate::onboarding::{ProfileField, UserProfile};
use crate::store::traits::{ProfileRow, ProfileStore};

/// Profile store that encrypts on write and decrypts on read.
pub struct EncryptedProfileStore {
    inner: Arc<dyn ProfileStore>,
    cipher: FieldCipher,
}

impl EncryptedProfileStore {
    pub fn new(inner: Arc<dyn ProfileStore>, cipher: FieldCipher) -> Self {
        Self { inner, cipher }
    }

    /// Load and decrypt a profile.
    ///
    /// - `Ok(None)`: no record for this user.
    /// - `Ok(Some(_))`: record found; unset fields are `None`.
    /// - `Err(DatabaseError::Integrity { .. })`: a stored value did not decrypt.
    pub async fn get(&self, user_id: &str) -> Result<Option<UserProfile>, DatabaseError> {
        match self.inner.get_profile_row(user_id).await? {
            Some(row) => self.decrypt_row(&row).map(Some),
            None => Ok(None),
        }
    }

    /// Load the profile, creating an all-unset record on first contact.
    ///
    /// The flag is `true` when the record was created by this call.
    pub async fn get_or_create(&self, user_id: &str) -> Result<(UserProfile, bool), DatabaseError> {
        if let Some(profile) = self.get(user_id).await? {
            return Ok((profile, false));
        }
        let created = self.inner.create_profile_row(user_id).await?;
        if created {
            debug!(user_id, "Created empty profile");
            return Ok((UserProfile::new(user_id), true));
        }
        // Another event for the same user created the row in between.
        let profile = self.get(user_id).await?.ok_or_else(|| DatabaseError::NotFound {
            entity: "profile".to_string(),
            id: user_id.to_string(),
        })?;
        Ok((profile, false))
    }

    /// Encrypt and store one field value.
    pub async fn put(
        &self,
        user_id: &str,
        field: ProfileField,
        plaintext: &str,
    ) -> Result<(), DatabaseError> {
        let stored = self
            .cipher
            .encrypt(Some(plaintext))
            .map_err(DatabaseError::Encryption)?;
        self.inner
            .update_field(user_id, field, stored.as_deref())
            .await?;
        debug!(user_id, %field, "Stored encrypted field");
        Ok(())
    }

    fn decrypt_row(&self, row: &ProfileRow) -> Result<UserProfile, DatabaseError> {
        let mut profile = UserProfile::new(row.user_id.clone());
        for field in ProfileField::ORDER {
            let value = self.cipher.decrypt(row.stored(field)).map_err(|source| {
                error!(user_id = %row.user_id, %field, error = %source, "Stored field failed to decrypt");
                DatabaseError::Integrity {
                    user_id: row.user_id.clone(),
                    field: field.to_string(),
                    source,
                }
            })?;
            profile.set(field, value);
        }
        Ok(profile)
    }
}
