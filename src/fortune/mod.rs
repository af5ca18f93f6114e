//! Fortune narratives generated from a completed profile.

pub mod generator;

pub use generator::{FALLBACK_MESSAGE, FortuneGenerator, GeneratorConfig};
