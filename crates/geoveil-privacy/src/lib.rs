//! Geoveil Privacy
//!
//! Location data never leaves the service without passing through a
//! [`PrivacyPolicy`]:
//! - Precise: the position is delivered unchanged
//! - Blur: coordinates are snapped to the centre of a coarse grid cell
//! - Fake: coordinates are replaced with fixed, user-chosen ones
//! - Suppressed: no position is delivered at all
//!
//! Policies are resolved per origin from a [`PolicySet`] generation, which is
//! only ever replaced wholesale.

mod error;
mod grid;
mod origin;
mod permissions;
mod policy;
mod position;
mod store;

pub use error::PrivacyError;
pub use grid::{
    blur_coordinates, grid_size, longitude_km_per_degree, snap, LATITUDE_KM_PER_DEGREE,
};
pub use origin::origin_of;
pub use permissions::{PermissionManager, PermissionState, SitePermission};
pub use policy::{parse_coords, BlurMode, FixedCoords, PrivacyPolicy};
pub use position::Position;
pub use store::{PolicySet, PolicyStore};

pub type Result<T> = std::result::Result<T, PrivacyError>;
