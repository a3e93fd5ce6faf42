use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::astar::find_cell_path;
use super::{NavmeshQuery, PathQueryError, SweepHit};
use crate::nav::obstacles::{ColliderInfo, ColliderKind};

/// Cost value of a blocked cell.
pub const BLOCKED: u8 = 255;
/// Cost value of an open cell.
pub const WALKABLE: u8 = 1;

/// Grid-baked navigable surface.
///
/// A flat walkability grid on the XZ plane. Blocked cells stand for static
/// structures: they are excluded from the surface and reported as solid by
/// [`NavmeshQuery::sphere_sweep`].
///
/// # Example
///
/// ```rust,ignore
/// let mut grid = NavGrid::new(200, 200, 1.0, Vec2::new(-100.0, -100.0));
/// grid.block_rect(Vec2::new(-5.0, -40.0), Vec2::new(5.0, 40.0));
///
/// let start = grid.snap_to_surface(pos, 7.0)?;
/// let corners = grid.compute_path(start, goal)?;
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NavGrid {
    pub width: usize,
    pub height: usize,
    pub cell_size: f32,
    /// World XZ of the grid's minimum corner.
    pub origin: Vec2,
    /// World Y of the surface.
    pub elevation: f32,
    /// Reported height of blocked cells.
    pub wall_height: f32,
    pub cost_field: Vec<u8>,
}

impl NavGrid {
    pub fn new(width: usize, height: usize, cell_size: f32, origin: Vec2) -> Self {
        Self {
            width,
            height,
            cell_size,
            origin,
            elevation: 0.0,
            wall_height: 4.0,
            cost_field: vec![WALKABLE; width * height],
        }
    }

    /// Square grid of `size` world units centered on the origin.
    pub fn centered(size: f32, cell_size: f32) -> Self {
        let cells = (size / cell_size).ceil() as usize;
        Self::new(cells, cells, cell_size, Vec2::splat(-size * 0.5))
    }

    #[inline]
    pub fn get_index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn world_to_grid(&self, point: Vec3) -> Option<(usize, usize)> {
        let local = (Vec2::new(point.x, point.z) - self.origin) / self.cell_size;
        if local.x < 0.0 || local.y < 0.0 {
            return None;
        }
        let (x, y) = (local.x.floor() as usize, local.y.floor() as usize);
        (x < self.width && y < self.height).then_some((x, y))
    }

    /// Center of a cell on the surface.
    pub fn grid_to_world(&self, x: usize, y: usize) -> Vec3 {
        let c = self.origin + (Vec2::new(x as f32, y as f32) + 0.5) * self.cell_size;
        Vec3::new(c.x, self.elevation, c.y)
    }

    fn cell_bounds(&self, x: usize, y: usize) -> (Vec2, Vec2) {
        let min = self.origin + Vec2::new(x as f32, y as f32) * self.cell_size;
        (min, min + Vec2::splat(self.cell_size))
    }

    #[inline]
    pub fn is_walkable(&self, x: usize, y: usize) -> bool {
        self.cost_field[self.get_index(x, y)] != BLOCKED
    }

    pub fn is_walkable_at(&self, point: Vec3) -> bool {
        self.world_to_grid(point).is_some_and(|(x, y)| self.is_walkable(x, y))
    }

    pub fn set_obstacle(&mut self, x: usize, y: usize) {
        let idx = self.get_index(x, y);
        self.cost_field[idx] = BLOCKED;
    }

    /// Blocks every cell whose center lies inside the world-space rectangle.
    pub fn block_rect(&mut self, min: Vec2, max: Vec2) {
        for y in 0..self.height {
            for x in 0..self.width {
                let c = self.grid_to_world(x, y);
                if c.x >= min.x && c.x <= max.x && c.z >= min.y && c.z <= max.y {
                    self.set_obstacle(x, y);
                }
            }
        }
    }

    /// Blocks every cell whose center lies inside the world-space circle.
    pub fn block_circle(&mut self, center: Vec2, radius: f32) {
        let r_sq = radius * radius;
        for y in 0..self.height {
            for x in 0..self.width {
                let c = self.grid_to_world(x, y);
                if Vec2::new(c.x, c.z).distance_squared(center) <= r_sq {
                    self.set_obstacle(x, y);
                }
            }
        }
    }

    /// Inclusive cell range covering a world-space square around `center`,
    /// or `None` when it lies completely outside the grid.
    fn cell_range(&self, center: Vec2, radius: f32) -> Option<((usize, usize), (usize, usize))> {
        let lo = ((center - Vec2::splat(radius) - self.origin) / self.cell_size).floor();
        let hi = ((center + Vec2::splat(radius) - self.origin) / self.cell_size).floor();
        if hi.x < 0.0 || hi.y < 0.0 || lo.x >= self.width as f32 || lo.y >= self.height as f32 {
            return None;
        }
        let lo = (lo.x.max(0.0) as usize, lo.y.max(0.0) as usize);
        let hi = (
            (hi.x as usize).min(self.width - 1),
            (hi.y as usize).min(self.height - 1),
        );
        Some((lo, hi))
    }

    /// Straight segment stays on walkable cells.
    pub fn line_of_sight(&self, from: Vec3, to: Vec3) -> bool {
        let step = self.cell_size * 0.25;
        let dist = Vec2::new(to.x - from.x, to.z - from.z).length();
        let samples = (dist / step).ceil().max(1.0) as usize;
        (0..=samples).all(|k| {
            let t = k as f32 / samples as f32;
            self.is_walkable_at(from.lerp(to, t))
        })
    }

    /// Closest point of a blocked cell within `radius` of `center`.
    fn blocked_within(&self, center: Vec3, radius: f32) -> Option<Vec3> {
        let p = Vec2::new(center.x, center.z);
        let ((x0, y0), (x1, y1)) = self.cell_range(p, radius)?;
        let mut best: Option<(f32, Vec2)> = None;
        for y in y0..=y1 {
            for x in x0..=x1 {
                if self.is_walkable(x, y) {
                    continue;
                }
                let (min, max) = self.cell_bounds(x, y);
                let closest = p.clamp(min, max);
                let d = p.distance(closest);
                if d <= radius && best.is_none_or(|(bd, _)| d < bd) {
                    best = Some((d, closest));
                }
            }
        }
        best.map(|(_, c)| Vec3::new(c.x, self.elevation, c.y))
    }

    /// Reduces a cell path to its visible corners, pinned to the exact endpoints.
    fn extract_corners(&self, from: Vec3, to: Vec3, cells: &[(usize, usize)]) -> Vec<Vec3> {
        let mut points: Vec<Vec3> = cells.iter().map(|&(x, y)| self.grid_to_world(x, y)).collect();
        let last = points.len() - 1;
        points[0] = from;
        points[last] = to;

        let mut corners = vec![from];
        let mut anchor = 0;
        while anchor < last {
            let mut next = anchor + 1;
            for candidate in (anchor + 2..=last).rev() {
                if self.line_of_sight(points[anchor], points[candidate]) {
                    next = candidate;
                    break;
                }
            }
            corners.push(points[next]);
            anchor = next;
        }
        corners
    }
}

impl NavmeshQuery for NavGrid {
    fn snap_to_surface(&self, point: Vec3, radius: f32) -> Option<Vec3> {
        if self.is_walkable_at(point) {
            return Some(Vec3::new(point.x, self.elevation, point.z));
        }
        if radius <= 0.0 {
            return None;
        }

        let p = Vec2::new(point.x, point.z);
        let ((x0, y0), (x1, y1)) = self.cell_range(p, radius)?;
        // Keep snapped points strictly inside their cell so they map back to it.
        let inset = self.cell_size * 1e-3;
        let mut best: Option<(f32, Vec2)> = None;
        for y in y0..=y1 {
            for x in x0..=x1 {
                if !self.is_walkable(x, y) {
                    continue;
                }
                let (min, max) = self.cell_bounds(x, y);
                let closest = p.clamp(min + inset, max - inset);
                let d = p.distance(closest);
                if d <= radius && best.is_none_or(|(bd, _)| d < bd) {
                    best = Some((d, closest));
                }
            }
        }
        best.map(|(_, c)| Vec3::new(c.x, self.elevation, c.y))
    }

    fn compute_path(&self, from: Vec3, to: Vec3) -> Result<Vec<Vec3>, PathQueryError> {
        let start = self
            .world_to_grid(from)
            .filter(|&(x, y)| self.is_walkable(x, y))
            .ok_or(PathQueryError::InvalidStatus)?;
        let goal = self
            .world_to_grid(to)
            .filter(|&(x, y)| self.is_walkable(x, y))
            .ok_or(PathQueryError::InvalidStatus)?;

        if start == goal || self.line_of_sight(from, to) {
            return Ok(vec![from, to]);
        }

        let cells = find_cell_path(self, start, goal).ok_or(PathQueryError::Unreachable)?;
        Ok(self.extract_corners(from, to, &cells))
    }

    fn sphere_sweep(&self, from: Vec3, to: Vec3, radius: f32) -> Option<SweepHit> {
        let dist = Vec2::new(to.x - from.x, to.z - from.z).length();
        let step = (self.cell_size * 0.5).min(radius.max(0.05));
        let samples = (dist / step).ceil().max(1.0) as usize;
        for k in 0..=samples {
            let t = k as f32 / samples as f32;
            if let Some(point) = self.blocked_within(from.lerp(to, t), radius) {
                return Some(SweepHit {
                    distance: dist * t,
                    point,
                    collider: ColliderInfo::new(ColliderKind::Structure, self.wall_height),
                });
            }
        }
        None
    }
}
