//! Onboarding state machine: derived from stored profile completeness.

use super::model::{ProfileField, UserProfile};

/// Where a user stands in registration.
///
/// Never persisted: it is recomputed from the profile on every message, so the
/// stored fields are the single source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingState {
    /// Waiting for the user to answer this field.
    Awaiting(ProfileField),
    /// All four fields are set.
    Complete,
}

impl OnboardingState {
    pub fn of(profile: &UserProfile) -> Self {
        match profile.next_missing_field() {
            Some(field) => Self::Awaiting(field),
            None => Self::Complete,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Check if a transition from `self` to `target` is valid.
    ///
    /// Storing one answer moves forward by exactly one field; a rejected
    /// answer leaves the state where it was.
    pub fn can_transition_to(&self, target: OnboardingState) -> bool {
        if *self == target {
            return true;
        }
        match (self, target) {
            (Self::Awaiting(current), Self::Awaiting(next)) => current.next() == Some(next),
            (Self::Awaiting(current), Self::Complete) => current.next().is_none(),
            (Self::Complete, _) => false,
        }
    }
}

impl std::fmt::Display for OnboardingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Awaiting(field) => write!(f, "awaiting_{field}"),
            Self::Complete => f.write_str("complete"),
        }
    }
}
