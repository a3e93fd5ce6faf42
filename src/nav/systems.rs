/// Navigation systems.
///
/// Run in `FixedUpdate`, in order:
/// - `NavSet::Input`: tick counter, collider assignment, commands
/// - `NavSet::Sense`: rebuild the obstacle snapshot
/// - `NavSet::Drive`: step every agent and publish notifications

use bevy::prelude::*;
use treadnav_macros::profile;

use super::agent::{NavContext, NavEvent, VehiclePose};
use super::components::*;
use super::config::NavConfig;
use super::events::*;
use super::obstacles::{ColliderId, ColliderInfo, ColliderKind, ObstacleClassifier, ObstacleShape};
use super::resources::*;
use super::steering::Actuation;

/// Height reported for other vehicles in the obstacle snapshot.
const VEHICLE_COLLIDER_HEIGHT: f32 = 2.5;

/// Collider identity of an entity in the obstacle snapshot.
pub fn collider_id(entity: Entity) -> ColliderId {
    ColliderId(entity.to_bits())
}

fn nav_context<'a>(
    config: &'a NavConfig,
    surface: Option<&'a NavSurface>,
    world: &'a ObstacleWorld,
    graph: &'a ActiveWaypointGraph,
) -> NavContext<'a> {
    NavContext {
        config,
        surface: surface.map(NavSurface::query),
        world: Some(&world.0),
        graph: graph.0.as_ref(),
    }
}

// ============================================================================
// Input
// ============================================================================

pub fn increment_nav_tick(mut tick: ResMut<NavTick>) {
    tick.increment();
}

/// Gives new navigators their own collider id so their rays skip their hull.
pub fn assign_navigator_colliders(
    mut navigators: Query<(Entity, &mut Navigator), Added<Navigator>>,
) {
    for (entity, mut navigator) in navigators.iter_mut() {
        navigator.0.set_collider(collider_id(entity));
    }
}

/// Applies stop and destination commands. Stops are handled first, so a
/// stop and a new destination in the same tick leave the vehicle moving.
pub fn process_navigation_commands(
    config: Res<NavConfig>,
    surface: Option<Res<NavSurface>>,
    world: Res<ObstacleWorld>,
    graph: Res<ActiveWaypointGraph>,
    mut stops: MessageReader<StopNavigation>,
    mut destinations: MessageReader<SetDestination>,
    mut rejected: MessageWriter<DestinationRejected>,
    mut navigators: Query<(&mut Navigator, &mut NavStatus, &mut Actuation)>,
) {
    for stop in stops.read() {
        let Ok((mut navigator, mut status, mut actuation)) = navigators.get_mut(stop.entity) else {
            warn!("[NAV] Stop for unknown navigator {:?}", stop.entity);
            continue;
        };
        navigator.0.stop();
        *status = NavStatus::Idle;
        *actuation = Actuation::IDLE;
    }

    let ctx = nav_context(&config, surface.as_deref(), &world, &graph);
    for command in destinations.read() {
        let Ok((mut navigator, mut status, _)) = navigators.get_mut(command.entity) else {
            warn!("[NAV] Destination for unknown navigator {:?}", command.entity);
            continue;
        };
        match navigator.0.set_destination(command.target, &ctx) {
            Ok(_) => *status = NavStatus::Navigating,
            Err(reason) => {
                *status = NavStatus::Rejected;
                rejected.write(DestinationRejected {
                    entity: command.entity,
                    target: command.target,
                    reason,
                });
            }
        }
    }
}

// ============================================================================
// Sense
// ============================================================================

/// Re-registers every obstacle and every other vehicle into the snapshot the
/// avoidance rays are cast against.
#[profile(4)]
pub fn rebuild_obstacle_world(
    config: Res<NavConfig>,
    mut world: ResMut<ObstacleWorld>,
    obstacles: Query<(Entity, &Transform, &Obstacle)>,
    vehicles: Query<(Entity, &Transform), With<Navigator>>,
) {
    let field = &mut world.0;
    field.clear();
    field.set_classifier(ObstacleClassifier::new(&config.avoidance));

    for (entity, transform, obstacle) in obstacles.iter() {
        field.register(collider_id(entity), transform.translation, obstacle.shape, obstacle.info);
    }

    let hull = ObstacleShape::Circle {
        radius: config.planner.vehicle_width * 0.5,
    };
    let info = ColliderInfo::new(ColliderKind::Vehicle, VEHICLE_COLLIDER_HEIGHT);
    for (entity, transform) in vehicles.iter() {
        field.register(collider_id(entity), transform.translation, hull, info);
    }
}

// ============================================================================
// Drive
// ============================================================================

/// Steps every navigator and publishes arrival and failure notifications.
#[profile(8)]
pub fn drive_navigators(
    config: Res<NavConfig>,
    surface: Option<Res<NavSurface>>,
    world: Res<ObstacleWorld>,
    graph: Res<ActiveWaypointGraph>,
    #[allow(unused_variables)] tick: Res<NavTick>,
    mut navigators: Query<(Entity, &Transform, &mut Navigator, &mut Actuation, &mut NavStatus)>,
    mut reached: MessageWriter<DestinationReached>,
    mut failed: MessageWriter<PathFailed>,
) {
    use crate::profile_log;

    let dt = config.tick_delta();
    let ctx = nav_context(&config, surface.as_deref(), &world, &graph);

    for (entity, transform, mut navigator, mut actuation, mut status) in navigators.iter_mut() {
        let pose = VehiclePose {
            position: transform.translation,
            forward: transform.forward().as_vec3(),
        };
        let output = navigator.0.tick(pose, dt, &ctx);
        *actuation = output.actuation;

        for event in output.events {
            match event {
                NavEvent::DestinationReached(target) => {
                    *status = NavStatus::Arrived;
                    reached.write(DestinationReached { entity, target });
                }
                NavEvent::PathFailed(reason) => {
                    *status = NavStatus::Failed;
                    failed.write(PathFailed { entity, reason });
                }
            }
        }
    }

    profile_log!(
        tick,
        "[NAV] Tick {} | Navigators: {} | Obstacles: {}",
        tick.0,
        navigators.iter().len(),
        world.0.len()
    );
}
