//! Geoveil Core
//!
//! Mediates access to the device location for many concurrent consumers.
//! One [`GeolocationService`] owns the provider, the position cache and all
//! origin sessions; positions pass through the origin's privacy policy before
//! any consumer callback sees them.

mod clock;
mod config;
mod error;
mod prompt;
mod provider;
mod request;
mod runtime;
mod service;
mod session;
mod settings;
mod timer;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GeoConfig;
pub use error::{GeoError, PositionError, ProviderError};
pub use prompt::{ChannelPrompter, PermissionDecision, PermissionPrompt, PermissionPrompter};
pub use provider::{
    CachedPosition, DeviceEvent, LocationProvider, ProviderEvent, ProviderEvents, ProviderSink,
};
pub use request::{
    DeliveryOutcome, ErrorCallback, PositionOptions, RequestCallbacks, RequestKind, RequestState,
    SuccessCallback,
};
pub use runtime::{GeolocationHandle, GeolocationRuntime};
pub use service::{GeolocationService, GeolocationServiceBuilder};
pub use session::{OriginSession, RequestHandle, RequestId, SessionId, SessionOptions};
pub use settings::{keys, GeoSettings, SettingChange, SettingKey};

// Re-export the privacy and storage layers
pub use geoveil_privacy::{
    origin_of, BlurMode, FixedCoords, PermissionManager, PermissionState, PolicySet,
    PrivacyPolicy, Position, SitePermission,
};
pub use geoveil_storage::{Database, StorageError};

pub type Result<T> = std::result::Result<T, GeoError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
