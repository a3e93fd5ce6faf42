/// Navigable surface queries.
///
/// The navigation core never owns the baked surface. It consumes it through
/// [`NavmeshQuery`], which any navmesh backend can implement. [`NavGrid`] is
/// the bundled grid-based backend used by the demo and the tests.

use bevy::prelude::*;
use thiserror::Error;

use super::obstacles::ColliderInfo;

mod astar;
pub mod grid;
pub mod io;

pub use grid::NavGrid;
pub use io::{load_nav_data, save_nav_data, NavData, NavDataError};

/// Why the provider could not produce a corner path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathQueryError {
    /// Start and goal lie on disconnected parts of the surface.
    #[error("goal is unreachable from start")]
    Unreachable,
    /// The provider rejected the query (endpoint off the surface, search aborted).
    #[error("provider reported an invalid path status")]
    InvalidStatus,
}

/// First obstacle touched by a swept sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit {
    /// Distance travelled along the sweep before contact.
    pub distance: f32,
    pub point: Vec3,
    pub collider: ColliderInfo,
}

/// Synchronous queries against the baked navigable surface.
pub trait NavmeshQuery {
    /// Nearest point on the surface within `radius` of `point`.
    fn snap_to_surface(&self, point: Vec3, radius: f32) -> Option<Vec3>;

    /// Corner-to-corner polyline between two points already on the surface.
    fn compute_path(&self, from: Vec3, to: Vec3) -> Result<Vec<Vec3>, PathQueryError>;

    /// Sweeps a sphere of `radius` from `from` to `to`.
    fn sphere_sweep(&self, from: Vec3, to: Vec3, radius: f32) -> Option<SweepHit>;
}
