//! Position data structure

use serde::{Deserialize, Serialize};

/// A position report as produced by a location provider.
///
/// Positions are never mutated: obfuscation builds a new one through
/// [`Position::relocated`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Horizontal accuracy in meters
    pub accuracy: f64,
    pub altitude_accuracy: f64,
    pub heading: f64,
    pub speed: f64,
    /// Capture time, milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, timestamp: u64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: 0.0,
            accuracy: 0.0,
            altitude_accuracy: 0.0,
            heading: 0.0,
            speed: 0.0,
            timestamp,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn with_altitude(mut self, altitude: f64, altitude_accuracy: f64) -> Self {
        self.altitude = altitude;
        self.altitude_accuracy = altitude_accuracy;
        self
    }

    pub fn with_motion(mut self, heading: f64, speed: f64) -> Self {
        self.heading = heading;
        self.speed = speed;
        self
    }

    /// Copy of this position with only latitude and longitude replaced.
    pub fn relocated(&self, latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..*self
        }
    }

    /// Age of the position relative to `now_ms`, zero if it lies in the future.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp)
    }
}
