/// Component definitions for navigating vehicles and the obstacles they avoid.

use bevy::prelude::*;

use super::agent::NavAgent;
use super::obstacles::{ColliderInfo, ObstacleShape};
use super::steering::Actuation;

// ============================================================================
// Vehicle Components
// ============================================================================

/// Navigation agent attached to a vehicle entity.
///
/// The vehicle's `Transform` is its pose: translation is the position and
/// `Transform::forward` the heading.
#[derive(Component, Debug)]
#[require(Actuation, NavStatus)]
pub struct Navigator(pub NavAgent);

/// Lifecycle of the navigator's current command, mirroring the messages sent
/// for it.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NavStatus {
    #[default]
    Idle,
    Navigating,
    Arrived,
    Failed,
    Rejected,
}

// ============================================================================
// World Components
// ============================================================================

/// Static or dynamic obstacle seen by the avoidance rays.
///
/// Its kind is declared once here and classified when the obstacle world is
/// rebuilt, never by name.
#[derive(Component, Debug, Clone, Copy)]
pub struct Obstacle {
    pub shape: ObstacleShape,
    pub info: ColliderInfo,
}
