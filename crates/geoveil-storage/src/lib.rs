//! Geoveil Storage Layer
//!
//! SQLite-backed key/value settings. Values are stored as JSON documents so
//! the typed settings boundary can tell a missing key from a malformed one.

mod database;
mod error;
mod migrations;

pub use database::{Database, SettingRecord};
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
