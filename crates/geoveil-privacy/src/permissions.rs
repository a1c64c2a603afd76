//! Geolocation site permissions
//!
//! | Stored state | Effect on a new request        |
//! | Ask          | the permission prompt is shown |
//! | Allow        | granted without prompting      |
//! | Deny         | denied without prompting       |

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Prompt user when requested
    #[default]
    Ask,
    /// Always allow
    Allow,
    /// Always deny
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitePermission {
    pub origin: String,
    pub state: PermissionState,
}

#[derive(Debug, Clone, Default)]
pub struct PermissionManager {
    /// Site-specific permissions: origin -> state
    site_permissions: HashMap<String, PermissionState>,
    /// State for origins without an entry
    default_state: PermissionState,
}

impl PermissionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(default_state: PermissionState) -> Self {
        Self {
            site_permissions: HashMap::new(),
            default_state,
        }
    }

    /// Get permission state for a specific origin
    pub fn get_permission(&self, origin: &str) -> PermissionState {
        self.site_permissions
            .get(origin)
            .copied()
            .unwrap_or(self.default_state)
    }

    /// Set permission for a specific origin
    pub fn set_site_permission(&mut self, origin: &str, state: PermissionState) {
        if origin.is_empty() {
            return;
        }
        self.site_permissions.insert(origin.to_string(), state);
    }

    /// Clear permission for a specific origin
    pub fn clear_site_permission(&mut self, origin: &str) {
        self.site_permissions.remove(origin);
    }

    pub fn set_default(&mut self, state: PermissionState) {
        self.default_state = state;
    }

    /// Check if a permission should prompt the user
    pub fn should_prompt(&self, origin: &str) -> bool {
        self.get_permission(origin) == PermissionState::Ask
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.get_permission(origin) == PermissionState::Allow
    }

    pub fn is_denied(&self, origin: &str) -> bool {
        self.get_permission(origin) == PermissionState::Deny
    }

    pub fn export_permissions(&self) -> Vec<SitePermission> {
        let mut out: Vec<SitePermission> = self
            .site_permissions
            .iter()
            .map(|(origin, state)| SitePermission {
                origin: origin.clone(),
                state: *state,
            })
            .collect();

        out.sort_by(|a, b| a.origin.cmp(&b.origin));
        out
    }

    /// Replace all site entries. The default state is kept.
    pub fn import_permissions(&mut self, permissions: Vec<SitePermission>) {
        self.site_permissions.clear();

        for perm in permissions {
            self.set_site_permission(&perm.origin, perm.state);
        }
    }
}
