use super::*;
use crate::nav::surface::NavGrid;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn walled_grid() -> NavGrid {
    let mut grid = NavGrid::centered(50.0, 1.0);
    grid.block_rect(Vec2::new(-1.0, -25.0), Vec2::new(1.0, 15.0));
    grid
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

#[test]
fn plan_keeps_exact_endpoints() {
    let grid = walled_grid();
    let config = NavConfig::default();
    let from = Vec3::new(-10.0, 0.0, 0.0);
    let to = Vec3::new(10.0, 0.0, 0.0);

    let planned = plan_path(&grid, from, to, PathOffset(Vec2::new(1.0, -0.5)), &mut rng(), &config)
        .expect("route around the wall exists");
    let points = planned.path.points();
    assert_eq!(points.first(), Some(&from));
    assert_eq!(points.last(), Some(&to));
    assert!(points.len() > 4, "smoothing adds vertices");
    assert!(points.iter().all(|p| grid.is_walkable_at(*p)));
}

#[test]
fn goal_just_outside_the_surface_snaps_back_on() {
    let grid = NavGrid::centered(50.0, 1.0);
    let config = NavConfig::default();
    let to = Vec3::new(25.3, 0.0, 0.0);

    let planned =
        plan_path(&grid, Vec3::ZERO, to, PathOffset::default(), &mut rng(), &config).unwrap();
    let goal = planned.path.goal().unwrap();
    assert!(grid.is_walkable_at(goal));
    assert!((goal.x - 25.0).abs() < 0.01);
}

#[test]
fn far_off_surface_goal_is_rejected() {
    let grid = NavGrid::centered(50.0, 1.0);
    let config = NavConfig::default();
    let result = plan_path(
        &grid,
        Vec3::ZERO,
        Vec3::new(100.0, 0.0, 0.0),
        PathOffset::default(),
        &mut rng(),
        &config,
    );
    assert_eq!(result, Err(PlanError::OffNavigableSurface(Endpoint::Goal)));
}

#[test]
fn off_surface_start_is_rejected() {
    let grid = NavGrid::centered(50.0, 1.0);
    let config = NavConfig::default();
    let result = plan_path(
        &grid,
        Vec3::new(-60.0, 0.0, 0.0),
        Vec3::ZERO,
        PathOffset::default(),
        &mut rng(),
        &config,
    );
    assert_eq!(result, Err(PlanError::OffNavigableSurface(Endpoint::Start)));
}

#[test]
fn enclosed_goal_reports_no_path() {
    let mut grid = NavGrid::centered(50.0, 1.0);
    grid.block_rect(Vec2::new(5.0, 5.0), Vec2::new(15.0, 6.0));
    grid.block_rect(Vec2::new(5.0, 14.0), Vec2::new(15.0, 15.0));
    grid.block_rect(Vec2::new(5.0, 5.0), Vec2::new(6.0, 15.0));
    grid.block_rect(Vec2::new(14.0, 5.0), Vec2::new(15.0, 15.0));
    let config = NavConfig::default();

    let result = plan_path(
        &grid,
        Vec3::new(-10.0, 0.0, 0.0),
        Vec3::new(10.0, 0.0, 10.0),
        PathOffset::default(),
        &mut rng(),
        &config,
    );
    assert_eq!(result, Err(PlanError::NoPathFound(PathQueryError::Unreachable)));
}

#[test]
fn chaikin_cuts_corners_and_keeps_ends() {
    let points = [
        Vec3::ZERO,
        Vec3::new(10.0, 0.0, 0.0),
        Vec3::new(10.0, 0.0, 10.0),
    ];
    let smoothed = chaikin(&points, 1);
    assert_eq!(smoothed.len(), 6);
    assert_eq!(smoothed[0], points[0]);
    assert_eq!(smoothed[5], points[2]);
    assert_eq!(smoothed[1], Vec3::new(2.5, 0.0, 0.0));
    assert_eq!(smoothed[4], Vec3::new(10.0, 0.0, 7.5));
    // The sharp corner itself is gone.
    assert!(!smoothed.contains(&points[1]));
}

#[test]
fn variation_moves_only_interior_vertices() {
    let grid = NavGrid::centered(50.0, 1.0);
    let mut config = PlannerConfig::default();
    config.vertex_jitter = 0.0;
    let original = vec![
        Vec3::new(-10.0, 0.0, 0.0),
        Vec3::new(0.0, 0.0, 5.0),
        Vec3::new(10.0, 0.0, 0.0),
    ];
    let mut points = original.clone();

    apply_variation(&grid, &mut points, PathOffset(Vec2::new(1.0, 2.0)), &mut rng(), &config);

    assert_eq!(points[0], original[0]);
    assert_eq!(points[2], original[2]);
    assert_eq!(points[1], Vec3::new(1.0, 0.0, 7.0));
}

#[test]
fn variation_keeps_vertex_when_resnap_fails() {
    let grid = NavGrid::centered(50.0, 1.0);
    let config = PlannerConfig {
        vertex_jitter: 0.0,
        ..Default::default()
    };
    let original = vec![
        Vec3::new(20.0, 0.0, -10.0),
        Vec3::new(24.0, 0.0, 0.0),
        Vec3::new(20.0, 0.0, 10.0),
    ];
    let mut points = original.clone();

    apply_variation(&grid, &mut points, PathOffset(Vec2::new(10.0, 0.0)), &mut rng(), &config);

    assert_eq!(points, original);
}

#[test]
fn path_hugging_a_wall_is_flagged_narrow_but_kept() {
    let mut grid = NavGrid::centered(50.0, 1.0);
    grid.block_rect(Vec2::new(-20.0, 1.0), Vec2::new(20.0, 3.0));
    let config = NavConfig::default();

    let planned = plan_path(
        &grid,
        Vec3::new(-10.0, 0.0, 0.0),
        Vec3::new(10.0, 0.0, 0.0),
        PathOffset::default(),
        &mut rng(),
        &config,
    )
    .unwrap();
    assert!(planned.narrow);

    let open = NavGrid::centered(50.0, 1.0);
    let planned = plan_path(
        &open,
        Vec3::new(-10.0, 0.0, 0.0),
        Vec3::new(10.0, 0.0, 0.0),
        PathOffset::default(),
        &mut rng(),
        &config,
    )
    .unwrap();
    assert!(!planned.narrow);
}

#[test]
fn cursor_only_moves_forward() {
    let mut path = NavPath::new(vec![Vec3::ZERO, Vec3::X, Vec3::Z, Vec3::ONE]);
    assert_eq!(path.cursor(), 1);
    let mut last = path.cursor();
    while path.advance() {
        assert!(path.cursor() > last);
        last = path.cursor();
    }
    assert_eq!(path.cursor(), 3);
    assert!(path.on_last_vertex());
    assert!(!path.advance());
    assert_eq!(path.current(), Some(Vec3::ONE));
}

#[test]
fn replan_is_suppressed_inside_stopping_distance() {
    let mut planner = PathPlanner::new(2.0);
    assert!(planner.needs_plan(50.0, 3.0), "no path yet");

    planner.install(PlannedPath {
        path: NavPath::new(vec![Vec3::ZERO, Vec3::X]),
        narrow: false,
    });
    assert!(!planner.needs_plan(50.0, 3.0));

    planner.tick(2.5);
    assert!(planner.needs_plan(50.0, 3.0));
    assert!(!planner.needs_plan(2.0, 3.0));

    planner.request();
    assert!(planner.needs_plan(2.0, 3.0), "explicit requests always plan");
}

#[test]
fn jittered_interval_stays_in_range() {
    let config = PlannerConfig::default();
    let mut rng = rng();
    for _ in 0..100 {
        let interval = PathPlanner::jittered_interval(&mut rng, &config);
        assert!(interval >= config.replan_interval - config.replan_jitter);
        assert!(interval <= config.replan_interval + config.replan_jitter);
    }
}
