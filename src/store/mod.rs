//! Persistence layer: libSQL-backed profile storage with field encryption.

pub mod encrypted;
pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use encrypted::EncryptedProfileStore;
pub use libsql_backend::LibSqlBackend;
pub use traits::{ProfileRow, ProfileStore};
