//! Onboarding: sequential collection of the four profile fields.
//!
//! A new user is asked for birth date, birth time, birth place and full name,
//! in that order, one message at a time. Each answer is validated before it is
//! stored; the next question is always the first field still unset.

pub mod manager;
pub mod model;
pub mod prompts;
pub mod state;
pub mod validation;

pub use manager::{FieldOutcome, OnboardingManager};
pub use model::{ProfileField, UserProfile};
pub use state::OnboardingState;
pub use validation::{ValidationError, validate};
