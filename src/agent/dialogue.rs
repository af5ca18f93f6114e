//! Dialogue policy: decides the reply to one inbound message.
//!
//! Registration comes first: until all four profile fields are stored, every
//! message is treated as the answer to the first missing field (a brand new
//! user only gets the welcome). A fortune request while the date or time is
//! outstanding gets that field's prompt again; free-text fields take it as the
//! answer. Once registered, messages starting with the fortune marker produce
//! a reading; anything else gets usage guidance.

use tracing::{debug, info, warn};

use crate::channels::split_message;
use crate::error::Error;
use crate::fortune::FortuneGenerator;
use crate::onboarding::prompts::{
    USAGE_GUIDANCE, accepted_prompt, field_prompt, parse_fortune_request, welcome_prompt,
};
use crate::onboarding::{FieldOutcome, OnboardingManager, OnboardingState};

/// Maps one user message to the reply segments to send back.
pub struct DialoguePolicy {
    onboarding: OnboardingManager,
    generator: FortuneGenerator,
    max_message_chars: usize,
}

impl DialoguePolicy {
    pub fn new(
        onboarding: OnboardingManager,
        generator: FortuneGenerator,
        max_message_chars: usize,
    ) -> Self {
        Self {
            onboarding,
            generator,
            max_message_chars,
        }
    }

    /// Handle `text` from `user_id` and return the reply, already split into
    /// deliverable segments.
    ///
    /// Storage failures (including undecryptable profiles) are returned as
    /// errors. Generation failures never are.
    pub async fn handle(&self, user_id: &str, text: &str) -> Result<Vec<String>, Error> {
        let (profile, created) = self.onboarding.load_or_create(user_id).await?;

        let reply = match self.onboarding.state(&profile) {
            OnboardingState::Awaiting(_) if created => welcome_prompt(),
            OnboardingState::Awaiting(field) => {
                if !field.is_free_text() && parse_fortune_request(text).is_some() {
                    debug!(user_id, %field, "Fortune requested before registration finished");
                    field_prompt(field).to_string()
                } else {
                    match self.onboarding.validate_and_store(user_id, field, text).await? {
                        FieldOutcome::Stored(value) => {
                            let mut updated = profile;
                            updated.set(field, Some(value));
                            let next = updated.next_missing_field();
                            let new_state = OnboardingState::of(&updated);
                            if !OnboardingState::Awaiting(field).can_transition_to(new_state) {
                                // Another event for this user wrote a later field.
                                warn!(user_id, from = %field, to = %new_state, "Registration skipped ahead");
                            }
                            if new_state.is_terminal() {
                                info!(user_id, "Registration complete");
                            }
                            accepted_prompt(field, next)
                        }
                        FieldOutcome::Rejected(e) => format!("{e}\n\n{}", field_prompt(field)),
                    }
                }
            }
            OnboardingState::Complete => match parse_fortune_request(text) {
                Some(topic) => self.generator.generate(&profile, &topic).await,
                None => USAGE_GUIDANCE.to_string(),
            },
        };

        Ok(split_message(&reply, self.max_message_chars))
    }
}
