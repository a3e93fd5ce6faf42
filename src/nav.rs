/// Autonomous ground-vehicle navigation.
///
/// This module is organized into:
/// - **math**: horizontal-plane helpers
/// - **config**: tuning resource and RON loading
/// - **surface**: navigable surface queries and the bundled grid provider
/// - **obstacles**: collider classification, ray fan and avoidance
/// - **planner**: path planning, variation, smoothing and width checks
/// - **waypoints**: waypoint graph and the graph navigator
/// - **stuck**: stuck detection and reverse recovery
/// - **steering**: throttle/turn controller
/// - **agent**: per-vehicle owner of all of the above
/// - **body**: reference tracked-hull kinematics
/// - **components / resources / events / systems**: the Bevy layer

use bevy::prelude::*;

// Module declarations
pub mod agent;
pub mod body;
pub mod components;
pub mod config;
pub mod events;
pub mod math;
pub mod obstacles;
pub mod planner;
pub mod resources;
pub mod steering;
pub mod stuck;
pub mod surface;
pub mod systems;
pub mod waypoints;

// Re-export commonly used items
pub use agent::{NavAgent, NavContext, NavEvent, NavOutput, PathTicket, PlanApplied, VehiclePose};
pub use body::{TrackedBody, VehicleBodyPlugin};
pub use components::*;
pub use config::{NavConfig, NavConfigPlugin};
pub use events::*;
pub use obstacles::{ColliderId, ColliderInfo, ColliderKind, ObstacleClass, ObstacleShape};
pub use planner::{NavPath, PlanError};
pub use resources::*;
pub use steering::Actuation;
pub use surface::{NavGrid, NavmeshQuery};
pub use waypoints::{TeamId, WaypointGraph, WaypointGraphAssetPlugin, WaypointGraphHandle};

/// Navigation stages within `FixedUpdate`.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum NavSet {
    Input, // Commands and bookkeeping
    Sense, // Obstacle snapshot
    Drive, // Agent ticks and actuation
}

/// Main navigation plugin.
///
/// Provide a [`NavSurface`] resource for path planning and, optionally, an
/// [`ActiveWaypointGraph`] for graph mode. Vehicles are entities with a
/// `Transform` and a [`Navigator`].
pub struct NavigationPlugin;

impl Plugin for NavigationPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(NavConfigPlugin);

        app.init_resource::<ObstacleWorld>();
        app.init_resource::<ActiveWaypointGraph>();
        app.init_resource::<NavTick>();

        app.add_message::<SetDestination>();
        app.add_message::<StopNavigation>();
        app.add_message::<DestinationReached>();
        app.add_message::<PathFailed>();
        app.add_message::<DestinationRejected>();

        app.configure_sets(FixedUpdate, (NavSet::Input, NavSet::Sense, NavSet::Drive).chain());

        app.add_systems(Startup, apply_nav_tick_rate);
        app.add_systems(
            FixedUpdate,
            (
                (
                    systems::increment_nav_tick,
                    systems::assign_navigator_colliders,
                    systems::process_navigation_commands,
                )
                    .chain()
                    .in_set(NavSet::Input),
                systems::rebuild_obstacle_world.in_set(NavSet::Sense),
                systems::drive_navigators.in_set(NavSet::Drive),
            ),
        );
    }
}

/// Steps `FixedUpdate` at the configured navigation rate.
fn apply_nav_tick_rate(config: Res<NavConfig>, mut fixed_time: ResMut<Time<Fixed>>) {
    fixed_time.set_timestep_hz(config.tick_rate);
    info!("[CONFIG] Navigation tick rate {} Hz", config.tick_rate);
}
