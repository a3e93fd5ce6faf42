use bevy::prelude::*;
use treadnav::nav::planner::Endpoint;
use treadnav::nav::surface::{load_nav_data, save_nav_data, NavData};
use treadnav::nav::waypoints::{WaypointId, WaypointNode};
use treadnav::nav::*;

/// Everything the navigation layer published during a test run.
#[derive(Resource, Default)]
struct Collected {
    reached: Vec<(Entity, Vec3)>,
    failed: Vec<(Entity, PlanError)>,
    rejected: Vec<(Entity, PlanError)>,
}

fn collect_messages(
    mut collected: ResMut<Collected>,
    mut reached: MessageReader<DestinationReached>,
    mut failed: MessageReader<PathFailed>,
    mut rejected: MessageReader<DestinationRejected>,
) {
    collected.reached.extend(reached.read().map(|m| (m.entity, m.target)));
    collected.failed.extend(failed.read().map(|m| (m.entity, m.reason)));
    collected.rejected.extend(rejected.read().map(|m| (m.entity, m.reason)));
}

fn nav_app(surface: Option<NavGrid>) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.insert_resource(NavConfig::default());
    if let Some(grid) = surface {
        app.insert_resource(NavSurface::new(grid));
    }
    app.add_plugins((NavigationPlugin, VehicleBodyPlugin));
    app.init_resource::<Collected>();
    app.add_systems(FixedUpdate, collect_messages.after(NavSet::Drive));

    // Runs the startup schedules
    app.update();
    app
}

fn spawn_tank(app: &mut App, seed: u64, position: Vec3) -> Entity {
    let config = app.world().resource::<NavConfig>().clone();
    app.world_mut()
        .spawn((
            Transform::from_translation(position).looking_to(Vec3::X, Vec3::Y),
            Navigator(NavAgent::new(seed, &config)),
            TrackedBody::from_config(&config),
        ))
        .id()
}

fn step(app: &mut App) {
    app.world_mut().run_schedule(FixedUpdate);
}

/// Steps until `entity` reports a terminal status or `max_ticks` run out.
fn run_until_settled(app: &mut App, entity: Entity, max_ticks: usize) -> usize {
    for tick in 0..max_ticks {
        step(app);
        let status = *app.world().get::<NavStatus>(entity).unwrap();
        if !matches!(status, NavStatus::Navigating | NavStatus::Idle) {
            return tick;
        }
    }
    max_ticks
}

fn position(app: &App, entity: Entity) -> Vec3 {
    app.world().get::<Transform>(entity).unwrap().translation
}

#[test]
fn tank_crosses_open_field_and_arrives() {
    let mut app = nav_app(Some(NavGrid::centered(300.0, 1.0)));
    let tank = spawn_tank(&mut app, 11, Vec3::ZERO);
    let target = Vec3::new(100.0, 0.0, 100.0);
    app.world_mut().write_message(SetDestination { entity: tank, target });

    let ticks = run_until_settled(&mut app, tank, 3000);
    assert!(ticks < 3000, "tank never arrived, stuck at {:?}", position(&app, tank));
    assert_eq!(*app.world().get::<NavStatus>(tank).unwrap(), NavStatus::Arrived);

    let collected = app.world().resource::<Collected>();
    assert_eq!(collected.reached, vec![(tank, target)]);
    assert!(collected.failed.is_empty());

    let config = NavConfig::default();
    let slack = config.planner.stopping_distance + config.planner.destination_jitter + 0.5;
    assert!(position(&app, tank).distance(target) < slack);
}

#[test]
fn tank_detours_around_a_wall() {
    let mut grid = NavGrid::centered(120.0, 1.0);
    grid.block_rect(Vec2::new(-5.0, -20.0), Vec2::new(5.0, 20.0));
    let mut app = nav_app(Some(grid));
    app.world_mut().spawn((
        Transform::default(),
        Obstacle {
            shape: ObstacleShape::Box {
                half_extents: Vec2::new(5.0, 20.0),
            },
            info: ColliderInfo::new(ColliderKind::Structure, 5.0),
        },
    ));

    let tank = spawn_tank(&mut app, 12, Vec3::new(-30.0, 0.0, 0.0));
    app.world_mut().write_message(SetDestination {
        entity: tank,
        target: Vec3::new(30.0, 0.0, 0.0),
    });

    let mut furthest_detour = 0.0f32;
    let mut settled = false;
    for _ in 0..6000 {
        step(&mut app);
        furthest_detour = furthest_detour.max(position(&app, tank).z.abs());
        if *app.world().get::<NavStatus>(tank).unwrap() == NavStatus::Arrived {
            settled = true;
            break;
        }
    }

    assert!(settled, "tank never arrived, stuck at {:?}", position(&app, tank));
    // The only way past is around one of the wall ends.
    assert!(furthest_detour > 15.0);
}

#[test]
fn convoy_members_follow_different_lines() {
    let mut app = nav_app(Some(NavGrid::centered(200.0, 1.0)));
    let a = spawn_tank(&mut app, 21, Vec3::new(-40.0, 0.0, -3.0));
    let b = spawn_tank(&mut app, 22, Vec3::new(-40.0, 0.0, 3.0));
    for entity in [a, b] {
        app.world_mut().write_message(SetDestination {
            entity,
            target: Vec3::new(40.0, 0.0, 0.0),
        });
    }
    step(&mut app);

    let path_of = |app: &App, entity: Entity| {
        app.world()
            .get::<Navigator>(entity)
            .and_then(|n| n.0.path().map(|p| p.points().to_vec()))
            .unwrap()
    };
    let (path_a, path_b) = (path_of(&app, a), path_of(&app, b));
    assert_ne!(path_a, path_b);
    assert_ne!(path_a.last(), path_b.last());
}

#[test]
fn off_surface_destination_is_rejected() {
    let mut app = nav_app(Some(NavGrid::centered(100.0, 1.0)));
    let tank = spawn_tank(&mut app, 31, Vec3::ZERO);
    app.world_mut().write_message(SetDestination {
        entity: tank,
        target: Vec3::new(500.0, 0.0, 0.0),
    });
    step(&mut app);

    assert_eq!(*app.world().get::<NavStatus>(tank).unwrap(), NavStatus::Rejected);
    assert_eq!(*app.world().get::<Actuation>(tank).unwrap(), Actuation::IDLE);
    let collected = app.world().resource::<Collected>();
    assert_eq!(
        collected.rejected,
        vec![(tank, PlanError::OffNavigableSurface(Endpoint::Goal))]
    );
}

#[test]
fn destination_without_a_surface_is_rejected() {
    let mut app = nav_app(None);
    let tank = spawn_tank(&mut app, 32, Vec3::ZERO);
    app.world_mut().write_message(SetDestination {
        entity: tank,
        target: Vec3::new(10.0, 0.0, 0.0),
    });
    step(&mut app);

    let collected = app.world().resource::<Collected>();
    assert_eq!(collected.rejected, vec![(tank, PlanError::NoSurface)]);
}

#[test]
fn walled_in_goal_reports_path_failed() {
    let mut grid = NavGrid::centered(100.0, 1.0);
    // Hollow square around (30, 30): walkable inside, sealed all round.
    grid.block_rect(Vec2::new(20.0, 20.0), Vec2::new(40.0, 22.0));
    grid.block_rect(Vec2::new(20.0, 38.0), Vec2::new(40.0, 40.0));
    grid.block_rect(Vec2::new(20.0, 20.0), Vec2::new(22.0, 40.0));
    grid.block_rect(Vec2::new(38.0, 20.0), Vec2::new(40.0, 40.0));
    let mut app = nav_app(Some(grid));
    let tank = spawn_tank(&mut app, 33, Vec3::ZERO);
    app.world_mut().write_message(SetDestination {
        entity: tank,
        target: Vec3::new(30.0, 0.0, 30.0),
    });

    for _ in 0..5 {
        step(&mut app);
    }

    assert_eq!(*app.world().get::<NavStatus>(tank).unwrap(), NavStatus::Failed);
    let collected = app.world().resource::<Collected>();
    assert_eq!(collected.failed.len(), 1);
    assert!(matches!(collected.failed[0].1, PlanError::NoPathFound(_)));
    assert_eq!(*app.world().get::<Actuation>(tank).unwrap(), Actuation::IDLE);
}

#[test]
fn stop_idles_the_vehicle() {
    let mut app = nav_app(Some(NavGrid::centered(100.0, 1.0)));
    let tank = spawn_tank(&mut app, 41, Vec3::ZERO);
    app.world_mut().write_message(SetDestination {
        entity: tank,
        target: Vec3::new(40.0, 0.0, 0.0),
    });
    for _ in 0..30 {
        step(&mut app);
    }
    assert!(app.world().get::<Actuation>(tank).unwrap().throttle > 0.0);

    app.world_mut().write_message(StopNavigation { entity: tank });
    step(&mut app);
    let parked = position(&app, tank);
    for _ in 0..30 {
        step(&mut app);
    }

    assert_eq!(*app.world().get::<NavStatus>(tank).unwrap(), NavStatus::Idle);
    assert_eq!(*app.world().get::<Actuation>(tank).unwrap(), Actuation::IDLE);
    assert_eq!(position(&app, tank), parked);
    assert!(app.world().resource::<Collected>().reached.is_empty());
}

#[test]
fn graph_mode_tank_follows_the_road() {
    let mut app = nav_app(None);
    let graph = WaypointGraph::from_nodes(vec![
        WaypointNode::new(0, Vec3::new(0.0, 0.0, 0.0)).with_connections(&[1]),
        WaypointNode::new(1, Vec3::new(20.0, 0.0, 0.0)).with_connections(&[2]),
        WaypointNode::new(2, Vec3::new(40.0, 0.0, 0.0)),
    ]);
    app.insert_resource(ActiveWaypointGraph(Some(graph)));

    let config = app.world().resource::<NavConfig>().clone();
    let tank = app
        .world_mut()
        .spawn((
            Transform::from_xyz(-5.0, 0.0, 0.0).looking_to(Vec3::X, Vec3::Y),
            Navigator(NavAgent::new(51, &config).with_graph_mode(true)),
            TrackedBody::from_config(&config),
        ))
        .id();
    let target = Vec3::new(45.0, 0.0, 0.0);
    app.world_mut().write_message(SetDestination { entity: tank, target });

    let mut visited = Vec::new();
    let mut settled = false;
    for _ in 0..2000 {
        step(&mut app);
        let navigator = app.world().get::<Navigator>(tank).unwrap();
        if let Some(id) = navigator.0.state().current_waypoint {
            if visited.last() != Some(&id) {
                visited.push(id);
            }
        }
        if *app.world().get::<NavStatus>(tank).unwrap() == NavStatus::Arrived {
            settled = true;
            break;
        }
    }

    assert!(settled, "tank never arrived, stuck at {:?}", position(&app, tank));
    assert_eq!(visited, vec![WaypointId(0), WaypointId(1), WaypointId(2)]);
    assert_eq!(app.world().resource::<Collected>().reached, vec![(tank, target)]);
}

#[test]
fn nav_data_survives_a_save_load_cycle() {
    let mut grid = NavGrid::centered(64.0, 2.0);
    grid.block_rect(Vec2::new(-4.0, -4.0), Vec2::new(4.0, 4.0));
    let graph = WaypointGraph::from_nodes(vec![
        WaypointNode::new(0, Vec3::new(-20.0, 0.0, 0.0)).with_connections(&[1]),
        WaypointNode::new(1, Vec3::new(20.0, 0.0, 0.0)).with_speed_limit(4.0),
    ]);

    let path = std::env::temp_dir().join(format!("treadnav_{}.navdata", std::process::id()));
    save_nav_data(&path, &NavData::new(grid.clone(), Some(graph))).unwrap();
    let loaded = load_nav_data(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded.grid.cost_field, grid.cost_field);
    assert_eq!(loaded.grid.origin, grid.origin);
    let graph = loaded.waypoints.unwrap();
    assert_eq!(graph.len(), 2);
    let far = graph.nearest(Vec3::new(18.0, 0.0, 0.0), None).unwrap();
    assert_eq!(far.speed_limit, Some(4.0));
    // Links were made bidirectional before saving.
    assert_eq!(graph.neighbors(far.id, None).count(), 1);
}

#[test]
fn crates_in_the_lane_are_driven_over() {
    let mut app = nav_app(Some(NavGrid::centered(120.0, 1.0)));
    let mut rng = fastrand::Rng::with_seed(42);
    for _ in 0..12 {
        let x = rng.f32() * 40.0 - 10.0;
        let z = rng.f32() * 6.0 - 3.0;
        app.world_mut().spawn((
            Transform::from_xyz(x, 0.0, z),
            Obstacle {
                shape: ObstacleShape::Circle { radius: 0.6 },
                info: ColliderInfo::new(ColliderKind::Prop, 0.6),
            },
        ));
    }

    let tank = spawn_tank(&mut app, 61, Vec3::new(-20.0, 0.0, 0.0));
    app.world_mut().write_message(SetDestination {
        entity: tank,
        target: Vec3::new(40.0, 0.0, 0.0),
    });

    let ticks = run_until_settled(&mut app, tank, 2000);
    assert!(ticks < 2000, "tank never arrived, stuck at {:?}", position(&app, tank));
    assert_eq!(*app.world().get::<NavStatus>(tank).unwrap(), NavStatus::Arrived);
    assert_eq!(
        app.world().get::<Navigator>(tank).unwrap().0.stuck_state(),
        treadnav::nav::stuck::StuckState::Normal
    );
}
