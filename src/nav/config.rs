use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default location of the navigation tuning file.
pub const NAV_CONFIG_PATH: &str = "assets/nav_config.ron";

/// Navigation tuning shared by every agent.
///
/// Loaded once at startup. Each section maps to one subsystem so a tuning
/// pass on, say, avoidance never touches the planner constants.
#[derive(Resource, Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NavConfig {
    /// Fixed simulation rate the navigation systems are stepped at.
    pub tick_rate: f64,
    pub planner: PlannerConfig,
    pub waypoints: WaypointConfig,
    pub avoidance: AvoidanceConfig,
    pub stuck: StuckConfig,
    pub steering: SteeringConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Full width of the vehicle hull.
    pub vehicle_width: f32,
    /// Snap search radius as a multiple of `vehicle_width`.
    pub snap_radius_scale: f32,
    /// Radius of the random jitter added to every requested destination.
    pub destination_jitter: f32,
    /// Radius the per-agent path offset is sampled from.
    pub path_offset_radius: f32,
    /// Independent jitter added to each intermediate vertex.
    pub vertex_jitter: f32,
    /// Search radius when re-snapping perturbed or smoothed vertices.
    pub resnap_radius: f32,
    pub smoothing_iterations: usize,
    pub replan_interval: f32,
    /// Per-agent replan interval jitter, +/- seconds.
    pub replan_jitter: f32,
    /// No replanning and arrival once this close to the destination.
    pub stopping_distance: f32,
    /// Distance at which a path vertex counts as reached.
    pub vertex_reach: f32,
    /// Speed multiplier applied while following a path flagged as narrow.
    pub narrow_speed_factor: f32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct WaypointConfig {
    /// Navigate the waypoint graph instead of the navmesh when one is present.
    pub graph_mode: bool,
    /// Lower bound for node reach radii.
    pub reach_floor: f32,
    /// Wander between random neighbors when no destination is set.
    pub wander_when_idle: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AvoidanceConfig {
    /// Ray fan, left to right. Negative angles point left of forward.
    pub rays: Vec<RaySpec>,
    pub detection_range: f32,
    /// Height of the ray origin above the vehicle position.
    pub sensor_height: f32,
    /// Colliders shorter than this are driven over.
    pub crushable_height: f32,
    /// Blend strength of the avoidance vector into the travel direction.
    pub strength: f32,
    /// Speed reduction at point-blank range for the forward ray.
    pub center_slowdown: f32,
    /// Speed reduction at point-blank range for side rays.
    pub side_slowdown: f32,
    /// Speed multiplier applied when only crushable obstacles are ahead.
    pub crushable_caution: f32,
    pub min_speed_factor: f32,
    /// Reverse throttle used when every ray is blocked.
    pub reverse_throttle: f32,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct RaySpec {
    pub angle_deg: f32,
    pub weight: f32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StuckConfig {
    pub check_interval: f32,
    /// Displacement per check below which the vehicle counts as not moving.
    pub min_movement: f32,
    /// Commanded forward speed above which a lack of movement is suspicious.
    pub min_commanded_speed: f32,
    pub stuck_threshold: f32,
    pub reverse_duration: f32,
    pub reverse_throttle: f32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SteeringConfig {
    pub max_speed: f32,
    pub acceleration: f32,
    /// Heading error (degrees) where speed starts falling off.
    pub slow_turn_deg: f32,
    /// Heading error (degrees) beyond which the vehicle turns in place.
    pub sharp_turn_deg: f32,
    /// Heading error (degrees) mapped to a full turn signal.
    pub turn_reference_deg: f32,
    pub creep_throttle: f32,
    /// Minimum speed factor from the heading falloff.
    pub min_turn_speed_factor: f32,
    /// Linear slowdown radius around the final destination.
    pub slowdown_radius: f32,
    pub min_arrival_speed_factor: f32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ron::error::SpannedError,
    },
}

impl NavConfig {
    /// Reads and parses a RON tuning file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_ron(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_ron(contents: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str::<NavConfig>(contents)
    }

    /// Seconds per navigation tick.
    pub fn tick_delta(&self) -> f32 {
        (1.0 / self.tick_rate) as f32
    }

    /// Snap radius for start and goal points.
    pub fn snap_radius(&self) -> f32 {
        self.planner.vehicle_width * self.planner.snap_radius_scale
    }
}

pub struct NavConfigPlugin;

impl Plugin for NavConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(PreStartup, load_nav_config);
    }
}

/// Load the tuning file synchronously; agents spawned at startup read it.
/// A config inserted by the host app before startup is kept as is.
fn load_nav_config(mut commands: Commands, existing: Option<Res<NavConfig>>) {
    if existing.is_some() {
        info!("[CONFIG] Using navigation config provided by the app");
        return;
    }
    match NavConfig::load(NAV_CONFIG_PATH) {
        Ok(config) => {
            info!("[CONFIG] Loaded navigation config from {}", NAV_CONFIG_PATH);
            commands.insert_resource(config);
        }
        Err(e) => {
            error!("[CONFIG] {}", e);
            error!("[CONFIG] Using default NavConfig");
            commands.insert_resource(NavConfig::default());
        }
    }
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30.0,
            planner: PlannerConfig::default(),
            waypoints: WaypointConfig::default(),
            avoidance: AvoidanceConfig::default(),
            stuck: StuckConfig::default(),
            steering: SteeringConfig::default(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            vehicle_width: 3.5,
            snap_radius_scale: 2.0,
            destination_jitter: 2.0,
            path_offset_radius: 1.5,
            vertex_jitter: 0.5,
            resnap_radius: 2.0,
            smoothing_iterations: 2,
            replan_interval: 2.0,
            replan_jitter: 0.3,
            stopping_distance: 3.0,
            vertex_reach: 3.0,
            narrow_speed_factor: 0.7,
        }
    }
}

impl Default for WaypointConfig {
    fn default() -> Self {
        Self {
            graph_mode: false,
            reach_floor: 4.0,
            wander_when_idle: true,
        }
    }
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            rays: vec![
                RaySpec { angle_deg: -45.0, weight: 0.5 },
                RaySpec { angle_deg: -20.0, weight: 0.8 },
                RaySpec { angle_deg: 0.0, weight: 1.0 },
                RaySpec { angle_deg: 20.0, weight: 0.8 },
                RaySpec { angle_deg: 45.0, weight: 0.5 },
            ],
            detection_range: 15.0,
            sensor_height: 1.0,
            crushable_height: 1.2,
            strength: 1.5,
            center_slowdown: 0.7,
            side_slowdown: 0.3,
            crushable_caution: 0.9,
            min_speed_factor: 0.2,
            reverse_throttle: 0.6,
        }
    }
}

impl Default for StuckConfig {
    fn default() -> Self {
        Self {
            check_interval: 1.0,
            min_movement: 0.5,
            min_commanded_speed: 0.5,
            stuck_threshold: 2.0,
            reverse_duration: 2.0,
            reverse_throttle: 0.7,
        }
    }
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            max_speed: 8.0,
            acceleration: 4.0,
            slow_turn_deg: 25.0,
            sharp_turn_deg: 60.0,
            turn_reference_deg: 35.0,
            creep_throttle: 0.15,
            min_turn_speed_factor: 0.25,
            slowdown_radius: 12.0,
            min_arrival_speed_factor: 0.15,
        }
    }
}
