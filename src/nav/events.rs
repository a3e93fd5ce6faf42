/// Navigation commands and notifications.
///
/// Commands are read in `NavSet::Input`; notifications are written in
/// `NavSet::Drive`, at most one per destination.

use bevy::prelude::*;

use super::planner::PlanError;

// ============================================================================
// Commands
// ============================================================================

/// Send a vehicle to `target`, replacing any current destination.
#[derive(Event, Message, Debug, Clone)]
pub struct SetDestination {
    pub entity: Entity,
    pub target: Vec3,
}

/// Clear a vehicle's destination and bring it to rest.
#[derive(Event, Message, Debug, Clone)]
pub struct StopNavigation {
    pub entity: Entity,
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Event, Message, Debug, Clone)]
pub struct DestinationReached {
    pub entity: Entity,
    pub target: Vec3,
}

/// Planning failed after the destination was accepted; it has been cleared.
#[derive(Event, Message, Debug, Clone)]
pub struct PathFailed {
    pub entity: Entity,
    pub reason: PlanError,
}

/// The destination could not be resolved onto the navigable surface.
#[derive(Event, Message, Debug, Clone)]
pub struct DestinationRejected {
    pub entity: Entity,
    pub target: Vec3,
    pub reason: PlanError,
}
