//! Privacy error types
//!
//! None of these reach a consumer: a policy that fails to parse degrades to
//! precise mode or to "no valid coordinates".

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrivacyError {
    #[error("Coordinate string is empty")]
    EmptyCoordinates,

    #[error("Coordinate string must start with '@': {0}")]
    MissingMarker(String),

    #[error("Coordinate string has no separator inside it: {0}")]
    MissingSeparator(String),

    #[error("Invalid latitude: {0}")]
    InvalidLatitude(String),

    #[error("Invalid longitude: {0}")]
    InvalidLongitude(String),

    #[error("Unknown blur mode: {0}")]
    UnknownMode(String),
}
