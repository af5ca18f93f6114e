//! fortune-bot: LINE fortune-telling chatbot backend.

pub mod agent;
pub mod channels;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fortune;
pub mod llm;
pub mod onboarding;
pub mod store;
