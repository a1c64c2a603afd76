//! Typed settings boundary
//!
//! Raw settings values are JSON. They are parsed here once into
//! [`GeoSettings`]; every absent or malformed value maps to its default.
//!
//! | Key                         | Value                                   | Default     |
//! | `geolocation.enabled`       | bool                                    | `true`      |
//! | `geolocation.blur.type`     | mode string or legacy code 1-4          | `"precise"` |
//! | `geolocation.blur.radius`   | integer                                 | `0`         |
//! | `geolocation.blur.coords`   | `"@lat,lon"`                            | none        |
//! | `geolocation.exceptions`    | origin -> `{type, radius, coords}`      | empty       |
//! | `geolocation.suppressed`    | array of origins                        | empty       |
//! | `geolocation.permissions`   | array of `{origin, state}`              | empty       |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use geoveil_privacy::{
    parse_coords, BlurMode, FixedCoords, PolicySet, PrivacyPolicy, SitePermission,
};
use geoveil_storage::Database;

pub mod keys {
    pub const ENABLED: &str = "geolocation.enabled";
    pub const BLUR_TYPE: &str = "geolocation.blur.type";
    pub const BLUR_RADIUS: &str = "geolocation.blur.radius";
    pub const BLUR_COORDS: &str = "geolocation.blur.coords";
    pub const EXCEPTIONS: &str = "geolocation.exceptions";
    pub const SUPPRESSED: &str = "geolocation.suppressed";
    pub const PERMISSIONS: &str = "geolocation.permissions";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Enabled,
    BlurType,
    BlurRadius,
    BlurCoords,
    Exceptions,
    Suppressed,
    Permissions,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::Enabled,
        SettingKey::BlurType,
        SettingKey::BlurRadius,
        SettingKey::BlurCoords,
        SettingKey::Exceptions,
        SettingKey::Suppressed,
        SettingKey::Permissions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::Enabled => keys::ENABLED,
            SettingKey::BlurType => keys::BLUR_TYPE,
            SettingKey::BlurRadius => keys::BLUR_RADIUS,
            SettingKey::BlurCoords => keys::BLUR_COORDS,
            SettingKey::Exceptions => keys::EXCEPTIONS,
            SettingKey::Suppressed => keys::SUPPRESSED,
            SettingKey::Permissions => keys::PERMISSIONS,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    /// Whether a change to this key produces a new policy generation.
    pub fn affects_policy(&self) -> bool {
        matches!(
            self,
            SettingKey::BlurType
                | SettingKey::BlurRadius
                | SettingKey::BlurCoords
                | SettingKey::Exceptions
                | SettingKey::Suppressed
        )
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named change notification from the settings collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingChange {
    pub key: String,
    pub value: Value,
}

impl SettingChange {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Parse a `{"key": ..., "value": ...}` document. Anything else is
    /// ignored.
    pub fn parse(json: &str) -> Option<Self> {
        let parsed = serde_json::from_str::<Value>(json).and_then(|doc| {
            if doc.is_object() {
                serde_json::from_value::<SettingChange>(doc).map(Some)
            } else {
                Ok(None)
            }
        });

        match parsed {
            Ok(Some(change)) => Some(change),
            Ok(None) => {
                tracing::warn!("Ignoring setting change that is not an object");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed setting change");
                None
            }
        }
    }

    pub fn persist(&self, db: &Database) -> geoveil_storage::Result<()> {
        db.set_setting(&self.key, &self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoSettings {
    pub enabled: bool,
    pub blur_mode: BlurMode,
    pub blur_radius: i32,
    pub blur_coords: Option<FixedCoords>,
    pub exceptions: Vec<PrivacyPolicy>,
    pub suppressed: Vec<String>,
    pub permissions: Vec<SitePermission>,
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            blur_mode: BlurMode::Precise,
            blur_radius: 0,
            blur_coords: None,
            exceptions: Vec::new(),
            suppressed: Vec::new(),
            permissions: Vec::new(),
        }
    }
}

impl GeoSettings {
    /// Read every key from the store. Lookup failures never block loading.
    pub fn load(db: &Database) -> Self {
        let mut settings = Self::default();

        for key in SettingKey::ALL {
            match db.get_setting(key.as_str()) {
                Ok(Some(value)) => {
                    if !settings.set(key, &value) {
                        tracing::warn!(key = %key, "Malformed setting, using default");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to read setting, using default");
                }
            }
        }

        tracing::info!(
            enabled = settings.enabled,
            mode = %settings.blur_mode,
            exceptions = settings.exceptions.len(),
            "Loaded geolocation settings"
        );
        settings
    }

    /// Apply one change notification. Returns the key that changed, or
    /// `None` if the change was ignored.
    pub fn apply_change(&mut self, change: &SettingChange) -> Option<SettingKey> {
        let Some(key) = SettingKey::from_key(&change.key) else {
            tracing::debug!(key = %change.key, "Ignoring unknown setting");
            return None;
        };

        if self.set(key, &change.value) {
            // A new radius invalidates the custom coordinates until they are sent again
            if key == SettingKey::BlurRadius {
                self.blur_coords = None;
            }
            tracing::debug!(key = %key, "Setting changed");
            Some(key)
        } else {
            tracing::warn!(key = %key, "Ignoring setting change with wrong value type");
            None
        }
    }

    /// Store a parsed value. Returns false and leaves the field untouched if
    /// the value has the wrong shape.
    fn set(&mut self, key: SettingKey, value: &Value) -> bool {
        match key {
            SettingKey::Enabled => value.as_bool().map(|v| self.enabled = v).is_some(),
            SettingKey::BlurType => parse_mode(value).map(|v| self.blur_mode = v).is_some(),
            SettingKey::BlurRadius => parse_radius(value).map(|v| self.blur_radius = v).is_some(),
            SettingKey::BlurCoords => parse_coords_value(value)
                .map(|v| self.blur_coords = v)
                .is_some(),
            SettingKey::Exceptions => parse_exceptions(value)
                .map(|v| self.exceptions = v)
                .is_some(),
            SettingKey::Suppressed => parse_origin_list(value)
                .map(|v| self.suppressed = v)
                .is_some(),
            SettingKey::Permissions => {
                match serde_json::from_value::<Vec<SitePermission>>(value.clone()) {
                    Ok(v) => {
                        self.permissions = v;
                        true
                    }
                    Err(_) => false,
                }
            }
        }
    }

    /// Build the policy generation these settings describe.
    pub fn policy_set(&self) -> PolicySet {
        let global = PrivacyPolicy::precise()
            .with_mode(self.blur_mode)
            .with_radius(self.blur_radius)
            .with_coords(self.blur_coords);

        self.exceptions
            .iter()
            .cloned()
            .fold(PolicySet::new(global), PolicySet::with_exception)
            .with_suppressed(self.suppressed.iter().cloned())
    }
}

fn parse_mode(value: &Value) -> Option<BlurMode> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64().and_then(BlurMode::from_code),
        _ => None,
    }
}

fn parse_radius(value: &Value) -> Option<i32> {
    value.as_i64().and_then(|r| i32::try_from(r).ok())
}

/// `Some(None)` for a well-typed value that carries no usable coordinates.
fn parse_coords_value(value: &Value) -> Option<Option<FixedCoords>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) if s.is_empty() => Some(None),
        Value::String(s) => match parse_coords(s) {
            Ok(coords) => Some(Some(coords)),
            Err(e) => {
                tracing::warn!(error = %e, "Invalid blur coordinates");
                Some(None)
            }
        },
        _ => None,
    }
}

fn parse_exceptions(value: &Value) -> Option<Vec<PrivacyPolicy>> {
    let entries = value.as_object()?;

    let policies = entries
        .iter()
        .filter(|(origin, _)| !origin.is_empty())
        .filter_map(|(origin, entry)| {
            let Some(entry) = entry.as_object() else {
                tracing::warn!(origin = %origin, "Skipping malformed exception entry");
                return None;
            };

            let mode = entry.get("type").and_then(parse_mode).unwrap_or_default();
            let radius = entry.get("radius").and_then(parse_radius).unwrap_or(0);
            let coords = entry
                .get("coords")
                .and_then(parse_coords_value)
                .flatten();

            Some(
                PrivacyPolicy::for_origin(origin.as_str())
                    .with_mode(mode)
                    .with_radius(radius)
                    .with_coords(coords),
            )
        })
        .collect();

    Some(policies)
}

fn parse_origin_list(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
