//! Free-fly orientation camera for a 3D viewport.
//!
//! The camera keeps an eye position and a front/right/up basis derived from
//! yaw and pitch angles (degrees). It has no failure modes: NaN input flows
//! straight into the basis and is left for the caller to avoid.
//!
//! # Invariants
//! - The basis is recomputed as a unit only, never one vector at a time.
//! - `world_up` is fixed at construction.
//! - Pitch is free unless a limit is configured.

mod camera;
mod config;
mod projection;

pub use camera::{Direction, OrientationCamera};
pub use config::{CameraConfig, ConfigError};
pub use projection::Projection;

pub fn crate_info() -> &'static str {
    "hotshade-camera v0.1.0"
}
