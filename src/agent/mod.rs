//! Agent module: per-message dialogue policy and the event dispatcher.

pub mod dialogue;
pub mod dispatcher;

pub use dialogue::DialoguePolicy;
pub use dispatcher::{Dispatcher, ERROR_NOTICE};
