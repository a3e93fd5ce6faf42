use bevy::app::{AppExit, ScheduleRunnerPlugin};
use bevy::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use treadnav::nav::*;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Wall clock limit for the demo run.
const DEMO_TIME_LIMIT_SECS: f32 = 180.0;

const CONVOY_DESTINATION: Vec3 = Vec3::new(60.0, 0.0, 0.0);
const SCOUT_DESTINATION: Vec3 = Vec3::new(70.0, 0.0, 60.0);

fn setup_file_logging() -> Result<String, std::io::Error> {
    let log_dir = PathBuf::from("logs");
    fs::create_dir_all(&log_dir)?;

    // Keep only the most recent runs
    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("treadnav_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_path_str = log_dir.join(&log_filename).to_string_lossy().to_string();

    // One file per run
    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);

    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bevy_ecs=info,bevy_asset=warn,treadnav=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(log_path_str)
}

fn cleanup_old_logs(log_dir: &PathBuf, keep_count: usize) {
    if let Ok(entries) = fs::read_dir(log_dir) {
        let mut log_files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.starts_with("treadnav") && s.ends_with(".log"))
                    .unwrap_or(false)
            })
            .collect();

        // Oldest first
        log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

        if log_files.len() > keep_count {
            for file in log_files.iter().take(log_files.len() - keep_count) {
                let _ = fs::remove_file(file.path());
            }
        }
    }
}

fn main() {
    match setup_file_logging() {
        Ok(log_file) => println!("treadnav demo, logging to {}", log_file),
        Err(e) => eprintln!("treadnav demo, file logging unavailable: {}", e),
    }

    App::new()
        .add_plugins(
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1.0 / 60.0))),
        )
        .add_plugins(AssetPlugin::default())
        .add_plugins((NavigationPlugin, VehicleBodyPlugin, WaypointGraphAssetPlugin))
        .add_systems(Startup, (setup_battlefield, spawn_vehicles).chain())
        .add_systems(Update, report_progress)
        .run();
}

/// Builds the surface and the physical obstacles that mirror it.
///
/// A long wall splits the field along X, passable only around its north end.
/// A rock sits on the far side, and crates are scattered in the convoy's lane.
fn setup_battlefield(mut commands: Commands, asset_server: Res<AssetServer>) {
    let mut grid = NavGrid::centered(200.0, 1.0);
    grid.block_rect(Vec2::new(-5.0, -60.0), Vec2::new(5.0, 40.0));
    grid.block_circle(Vec2::new(30.0, 10.0), 3.0);
    commands.insert_resource(NavSurface::new(grid));

    commands.spawn((
        Transform::from_xyz(0.0, 0.0, -10.0),
        Obstacle {
            shape: ObstacleShape::Box {
                half_extents: Vec2::new(5.0, 50.0),
            },
            info: ColliderInfo::new(ColliderKind::Structure, 6.0),
        },
    ));
    commands.spawn((
        Transform::from_xyz(30.0, 0.0, 10.0),
        Obstacle {
            shape: ObstacleShape::Circle { radius: 3.0 },
            info: ColliderInfo::new(ColliderKind::Structure, 3.0),
        },
    ));
    for (x, z) in [(-40.0, -2.0), (-35.0, 4.0), (-28.0, 0.0)] {
        commands.spawn((
            Transform::from_xyz(x, 0.0, z),
            Obstacle {
                shape: ObstacleShape::Circle { radius: 0.8 },
                info: ColliderInfo::new(ColliderKind::Prop, 0.8),
            },
        ));
    }

    commands.insert_resource(WaypointGraphHandle(asset_server.load("graphs/demo.waypoints.ron")));
    info!("[NAV] Battlefield ready");
}

/// Spawns a four tank convoy west of the wall and a scout on the road.
fn spawn_vehicles(
    mut commands: Commands,
    config: Res<NavConfig>,
    mut destinations: MessageWriter<SetDestination>,
) {
    for (i, z) in [-10.0, -5.0, 0.0, 5.0].into_iter().enumerate() {
        let entity = commands
            .spawn((
                Name::new(format!("Tank {}", i)),
                Transform::from_xyz(-60.0, 0.0, z).looking_to(Vec3::X, Vec3::Y),
                Navigator(NavAgent::new(i as u64 + 1, &config)),
                TrackedBody::from_config(&config),
            ))
            .id();
        destinations.write(SetDestination {
            entity,
            target: CONVOY_DESTINATION,
        });
    }

    let scout = commands
        .spawn((
            Name::new("Scout"),
            Transform::from_xyz(-70.0, 0.0, 60.0).looking_to(Vec3::X, Vec3::Y),
            Navigator(NavAgent::new(99, &config).with_graph_mode(true)),
            TrackedBody::from_config(&config),
        ))
        .id();
    destinations.write(SetDestination {
        entity: scout,
        target: SCOUT_DESTINATION,
    });

    info!("[NAV] Spawned convoy of 4 and a scout");
}

fn report_progress(
    time: Res<Time>,
    mut reached: MessageReader<DestinationReached>,
    mut failed: MessageReader<PathFailed>,
    mut rejected: MessageReader<DestinationRejected>,
    vehicles: Query<(&Name, &NavStatus, &Transform)>,
    mut exit: MessageWriter<AppExit>,
) {
    for event in reached.read() {
        let name = vehicles.get(event.entity).map(|(n, _, _)| n.as_str()).unwrap_or("?");
        info!("[NAV] {} reached {:?}", name, event.target);
    }
    for event in failed.read() {
        let name = vehicles.get(event.entity).map(|(n, _, _)| n.as_str()).unwrap_or("?");
        warn!("[NAV] {} failed: {}", name, event.reason);
    }
    for event in rejected.read() {
        let name = vehicles.get(event.entity).map(|(n, _, _)| n.as_str()).unwrap_or("?");
        warn!("[NAV] {} rejected {:?}: {}", name, event.target, event.reason);
    }

    let done = !vehicles.is_empty()
        && vehicles
            .iter()
            .all(|(_, status, _)| !matches!(status, NavStatus::Idle | NavStatus::Navigating));
    if done {
        info!("[NAV] All vehicles finished after {:.1}s", time.elapsed_secs());
        exit.write(AppExit::Success);
    } else if time.elapsed_secs() > DEMO_TIME_LIMIT_SECS {
        for (name, status, transform) in vehicles.iter() {
            warn!("[NAV] {} still {:?} at {:?}", name, status, transform.translation);
        }
        exit.write(AppExit::Success);
    }
}
