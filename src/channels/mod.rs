//! Channel abstraction for message I/O.

pub mod chunker;
pub mod line;

use async_trait::async_trait;

use crate::error::ChannelError;

pub use chunker::split_message;
pub use line::{LineChannel, WebhookState, verify_signature, webhook_routes};

/// A text message received from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Stable per-user identifier assigned by the platform.
    pub user_id: String,
    pub text: String,
    /// Single-use token for answering this event, if the platform gave one.
    pub reply_token: Option<String>,
}

impl InboundEvent {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            reply_token: None,
        }
    }

    pub fn with_reply_token(mut self, token: impl Into<String>) -> Self {
        self.reply_token = Some(token.into());
        self
    }
}

/// Outbound delivery of reply segments for an inbound event.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Deliver `messages` to the sender of `event`, in order.
    async fn deliver(&self, event: &InboundEvent, messages: Vec<String>) -> Result<(), ChannelError>;
}
