/// Resource definitions shared by the navigation systems.
///
/// All of these are read-only during the drive step; agents never mutate the
/// surface, the obstacle snapshot or the waypoint graph.

use bevy::prelude::*;

use super::config::AvoidanceConfig;
use super::obstacles::{ObstacleClassifier, ObstacleField};
use super::surface::NavmeshQuery;
use super::waypoints::WaypointGraph;

/// Navigable surface provider.
#[derive(Resource)]
pub struct NavSurface(pub Box<dyn NavmeshQuery + Send + Sync>);

impl NavSurface {
    pub fn new(provider: impl NavmeshQuery + Send + Sync + 'static) -> Self {
        Self(Box::new(provider))
    }

    pub fn query(&self) -> &dyn NavmeshQuery {
        &*self.0
    }
}

/// Obstacle snapshot rebuilt every tick before the drive step.
#[derive(Resource, Debug)]
pub struct ObstacleWorld(pub ObstacleField);

impl Default for ObstacleWorld {
    fn default() -> Self {
        Self(ObstacleField::new(ObstacleClassifier::new(&AvoidanceConfig::default())))
    }
}

/// Waypoint graph used by agents in graph mode, if any.
#[derive(Resource, Debug, Default)]
pub struct ActiveWaypointGraph(pub Option<WaypointGraph>);

/// Navigation tick counter, incremented at the start of every fixed step.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NavTick(pub u64);

impl NavTick {
    pub fn increment(&mut self) {
        self.0 += 1;
    }
}
