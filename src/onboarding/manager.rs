//! OnboardingManager: validates answers and advances registration.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::EncryptedProfileStore;

use super::model::{ProfileField, UserProfile};
use super::state::OnboardingState;
use super::validation::{ValidationError, validate};

/// Result of offering one raw answer for a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    /// The normalized value that was written.
    Stored(String),
    /// Nothing was written; the error text goes back to the user.
    Rejected(ValidationError),
}

impl FieldOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

/// Coordinates profile loading, validation and storage for registration.
pub struct OnboardingManager {
    store: Arc<EncryptedProfileStore>,
}

impl OnboardingManager {
    pub fn new(store: Arc<EncryptedProfileStore>) -> Self {
        Self { store }
    }

    /// Load a profile, creating an empty one for a first-time user.
    pub async fn load_or_create(&self, user_id: &str) -> Result<(UserProfile, bool), DatabaseError> {
        let (profile, created) = self.store.get_or_create(user_id).await?;
        if created {
            info!(user_id, "New user registered");
        }
        Ok((profile, created))
    }

    /// Current registration state of an existing profile.
    pub fn state(&self, profile: &UserProfile) -> OnboardingState {
        OnboardingState::of(profile)
    }

    /// Validate `raw` for `field` and store it on success.
    ///
    /// Never writes on rejection. Storage failures are returned as `Err`.
    pub async fn validate_and_store(
        &self,
        user_id: &str,
        field: ProfileField,
        raw: &str,
    ) -> Result<FieldOutcome, DatabaseError> {
        match validate(field, raw) {
            Ok(value) => {
                self.store.put(user_id, field, &value).await?;
                debug!(user_id, %field, "Field accepted");
                Ok(FieldOutcome::Stored(value))
            }
            Err(e) => {
                debug!(user_id, %field, "Field rejected");
                Ok(FieldOutcome::Rejected(e))
            }
        }
    }
}
