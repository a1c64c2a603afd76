//! Location privacy policy
//!
//! | Mode        | Delivered position                         |
//! | Precise     | unchanged                                  |
//! | Blur        | snapped to the centre of a `radius` cell   |
//! | Fake        | fixed coordinates, other fields preserved  |
//! | Suppressed  | nothing                                    |

use serde::{Deserialize, Serialize};

use crate::error::PrivacyError;
use crate::grid::blur_coordinates;
use crate::position::Position;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlurMode {
    #[default]
    #[serde(rename = "precise")]
    Precise,
    #[serde(rename = "blur")]
    Blur,
    #[serde(rename = "custom")]
    Fake,
    #[serde(rename = "no-location")]
    Suppressed,
}

impl BlurMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlurMode::Precise => "precise",
            BlurMode::Blur => "blur",
            BlurMode::Fake => "custom",
            BlurMode::Suppressed => "no-location",
        }
    }

    /// Numeric codes used by older exception entries.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(BlurMode::Precise),
            2 => Some(BlurMode::Blur),
            3 => Some(BlurMode::Fake),
            4 => Some(BlurMode::Suppressed),
            _ => None,
        }
    }
}

impl std::fmt::Display for BlurMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BlurMode {
    type Err = PrivacyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "precise" => Ok(BlurMode::Precise),
            "blur" => Ok(BlurMode::Blur),
            "custom" => Ok(BlurMode::Fake),
            "no-location" => Ok(BlurMode::Suppressed),
            _ => Err(PrivacyError::UnknownMode(s.to_string())),
        }
    }
}

/// User-chosen coordinates for [`BlurMode::Fake`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedCoords {
    pub latitude: f64,
    pub longitude: f64,
}

impl std::str::FromStr for FixedCoords {
    type Err = PrivacyError;

    fn from_str(s: &str) -> Result<Self> {
        parse_coords(s)
    }
}

/// Parse an `"@<lat>,<lon>"` string.
///
/// Both halves must parse before anything is returned.
pub fn parse_coords(input: &str) -> Result<FixedCoords> {
    if input.is_empty() {
        return Err(PrivacyError::EmptyCoordinates);
    }

    let Some(body) = input.strip_prefix('@') else {
        return Err(PrivacyError::MissingMarker(input.to_string()));
    };

    // The separator may not sit right after the marker nor at the very end
    let (lat_str, lon_str) = match body.find(',') {
        Some(idx) if idx > 0 && idx + 1 < body.len() => (&body[..idx], &body[idx + 1..]),
        _ => return Err(PrivacyError::MissingSeparator(input.to_string())),
    };

    let latitude = parse_component(lat_str)
        .ok_or_else(|| PrivacyError::InvalidLatitude(lat_str.to_string()))?;
    let longitude = parse_component(lon_str)
        .ok_or_else(|| PrivacyError::InvalidLongitude(lon_str.to_string()))?;

    Ok(FixedCoords {
        latitude,
        longitude,
    })
}

fn parse_component(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Privacy policy for one scope.
///
/// An empty `scope` marks the global default; otherwise it is the origin the
/// exception applies to.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrivacyPolicy {
    pub scope: String,
    pub mode: BlurMode,
    pub radius: i32,
    pub coords: Option<FixedCoords>,
}

impl PrivacyPolicy {
    pub fn precise() -> Self {
        Self::default()
    }

    pub fn suppressed() -> Self {
        Self::default().with_mode(BlurMode::Suppressed)
    }

    pub fn for_origin(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: BlurMode) -> Self {
        self.mode = mode;
        self
    }

    /// Negative radii are treated as zero.
    pub fn with_radius(mut self, radius: i32) -> Self {
        if radius < 0 {
            tracing::warn!(radius, scope = %self.scope, "Negative blur radius, using 0");
        }
        self.radius = radius.max(0);
        self
    }

    pub fn with_coords(mut self, coords: Option<FixedCoords>) -> Self {
        self.coords = coords;
        self
    }

    /// Set coordinates from their string form; a malformed string clears them.
    pub fn with_coords_str(self, coords: &str) -> Self {
        let parsed = if coords.is_empty() {
            None
        } else {
            match parse_coords(coords) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    tracing::warn!(scope = %self.scope, error = %e, "Ignoring blur coordinates");
                    None
                }
            }
        };
        self.with_coords(parsed)
    }

    pub fn is_global(&self) -> bool {
        self.scope.is_empty()
    }

    pub fn has_valid_coords(&self) -> bool {
        self.coords.is_some()
    }

    /// Transform a raw position. `None` means nothing may be delivered.
    pub fn apply(&self, position: &Position) -> Option<Position> {
        match self.mode {
            BlurMode::Precise => Some(*position),
            BlurMode::Suppressed => None,
            BlurMode::Fake => self
                .coords
                .map(|fixed| position.relocated(fixed.latitude, fixed.longitude)),
            BlurMode::Blur => {
                let (latitude, longitude) =
                    blur_coordinates(position.latitude, position.longitude, self.radius);
                Some(position.relocated(latitude, longitude))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coords() {
        let coords = parse_coords("@12.5,-71.25").unwrap();
        assert_eq!(coords.latitude, 12.5);
        assert_eq!(coords.longitude, -71.25);

        let coords: FixedCoords = "@-0.5,179".parse().unwrap();
        assert_eq!(coords.latitude, -0.5);
        assert_eq!(coords.longitude, 179.0);
    }

    #[test]
    fn test_parse_coords_rejects_malformed() {
        assert_eq!(parse_coords(""), Err(PrivacyError::EmptyCoordinates));
        assert!(matches!(
            parse_coords("12.5,-71.25"),
            Err(PrivacyError::MissingMarker(_))
        ));
        assert!(matches!(
            parse_coords("@12.5"),
            Err(PrivacyError::MissingSeparator(_))
        ));
        assert!(matches!(
            parse_coords("@,-71.25"),
            Err(PrivacyError::MissingSeparator(_))
        ));
        assert!(matches!(
            parse_coords("@12.5,"),
            Err(PrivacyError::MissingSeparator(_))
        ));
        assert!(matches!(
            parse_coords("@abc,1.0"),
            Err(PrivacyError::InvalidLatitude(_))
        ));
        assert!(matches!(
            parse_coords("@1.0,east"),
            Err(PrivacyError::InvalidLongitude(_))
        ));
        assert!(matches!(
            parse_coords("@inf,1.0"),
            Err(PrivacyError::InvalidLatitude(_))
        ));
    }

    #[test]
    fn test_malformed_coords_leave_policy_without_coords() {
        let policy = PrivacyPolicy::precise()
            .with_mode(BlurMode::Fake)
            .with_coords_str("@12.5,oops");
        assert!(!policy.has_valid_coords());
        assert_eq!(policy.coords, None);
    }

    #[test]
    fn test_mode_strings() {
        assert_eq!("custom".parse::<BlurMode>().unwrap(), BlurMode::Fake);
        assert_eq!(
            "no-location".parse::<BlurMode>().unwrap(),
            BlurMode::Suppressed
        );
        assert!("fuzzy".parse::<BlurMode>().is_err());
        assert_eq!(BlurMode::from_code(2), Some(BlurMode::Blur));
        assert_eq!(BlurMode::from_code(9), None);
        assert_eq!(
            serde_json::to_string(&BlurMode::Fake).unwrap(),
            "\"custom\""
        );
    }

    #[test]
    fn test_apply_precise_and_suppressed() {
        let position = Position::new(40.0, -74.0, 5).with_accuracy(8.0);

        assert_eq!(PrivacyPolicy::precise().apply(&position), Some(position));
        assert_eq!(PrivacyPolicy::suppressed().apply(&position), None);
    }

    #[test]
    fn test_apply_fake() {
        let position = Position::new(40.0, -74.0, 5).with_accuracy(8.0);

        let fake = PrivacyPolicy::precise()
            .with_mode(BlurMode::Fake)
            .with_coords_str("@1.5,2.5");
        let moved = fake.apply(&position).unwrap();
        assert_eq!((moved.latitude, moved.longitude), (1.5, 2.5));
        assert_eq!(moved.accuracy, 8.0);
        assert_eq!(moved.timestamp, 5);

        // Without coordinates the fake policy delivers nothing
        let broken = PrivacyPolicy::precise().with_mode(BlurMode::Fake);
        assert_eq!(broken.apply(&position), None);
    }

    #[test]
    fn test_apply_blur() {
        let position = Position::new(52.52, 13.405, 5);
        let blur = PrivacyPolicy::precise()
            .with_mode(BlurMode::Blur)
            .with_radius(20);

        let first = blur.apply(&position).unwrap();
        let second = blur.apply(&position).unwrap();
        assert_eq!(first, second);
        assert_ne!(first.latitude, position.latitude);

        let expected = blur_coordinates(52.52, 13.405, 20);
        assert_eq!((first.latitude, first.longitude), expected);
    }

    #[test]
    fn test_negative_radius_clamped() {
        let policy = PrivacyPolicy::precise().with_radius(-5);
        assert_eq!(policy.radius, 0);
    }
}
