use bevy::prelude::*;
use fixedbitset::FixedBitSet;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::grid::NavGrid;

const SQRT_2: f32 = std::f32::consts::SQRT_2;

/// Orthogonal steps first, then diagonals.
const NEIGHBORS: [(i64, i64); 8] =
    [(-1, 0), (1, 0), (0, -1), (0, 1), (-1, -1), (1, -1), (-1, 1), (1, 1)];

#[derive(Clone, Copy, Debug)]
struct State {
    cost: f32,
    index: usize,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal && self.index == other.index
    }
}

impl Eq for State {}

impl Ord for State {
    // Reversed so the BinaryHeap pops the cheapest state first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Octile distance in cells.
fn heuristic(a: (usize, usize), b: (usize, usize)) -> f32 {
    let dx = (a.0 as f32 - b.0 as f32).abs();
    let dy = (a.1 as f32 - b.1 as f32).abs();
    dx.max(dy) + (SQRT_2 - 1.0) * dx.min(dy)
}

/// 8-connected A* over walkable cells. Diagonal moves require both adjacent
/// orthogonal cells to be walkable so paths never cut blocked corners.
pub(super) fn find_cell_path(
    grid: &NavGrid,
    start: (usize, usize),
    goal: (usize, usize),
) -> Option<Vec<(usize, usize)>> {
    let cell_count = grid.width * grid.height;
    let max_iterations = cell_count * 4;
    let mut iterations = 0;

    let mut g_score = vec![f32::INFINITY; cell_count];
    let mut came_from = vec![usize::MAX; cell_count];
    let mut closed = FixedBitSet::with_capacity(cell_count);
    let mut open_set = BinaryHeap::new();

    let start_idx = grid.get_index(start.0, start.1);
    let goal_idx = grid.get_index(goal.0, goal.1);
    g_score[start_idx] = 0.0;
    open_set.push(State { cost: heuristic(start, goal), index: start_idx });

    while let Some(State { index: current, .. }) = open_set.pop() {
        iterations += 1;
        if iterations > max_iterations {
            error!(
                "[PLANNER] A* exceeded max iterations ({}) from {:?} to {:?}",
                max_iterations, start, goal
            );
            return None;
        }

        if current == goal_idx {
            return Some(reconstruct_path(grid, &came_from, current));
        }
        if closed.contains(current) {
            continue;
        }
        closed.insert(current);

        let (cx, cy) = (current % grid.width, current / grid.width);
        for (dx, dy) in NEIGHBORS {
            let nx = cx as i64 + dx;
            let ny = cy as i64 + dy;
            if nx < 0 || ny < 0 || nx >= grid.width as i64 || ny >= grid.height as i64 {
                continue;
            }
            let (nx, ny) = (nx as usize, ny as usize);
            if !grid.is_walkable(nx, ny) {
                continue;
            }
            let diagonal = dx != 0 && dy != 0;
            if diagonal && !(grid.is_walkable(nx, cy) && grid.is_walkable(cx, ny)) {
                continue;
            }

            let neighbor = grid.get_index(nx, ny);
            if closed.contains(neighbor) {
                continue;
            }
            let step = if diagonal { SQRT_2 } else { 1.0 };
            let tentative = g_score[current] + step;
            if tentative < g_score[neighbor] {
                came_from[neighbor] = current;
                g_score[neighbor] = tentative;
                open_set.push(State {
                    cost: tentative + heuristic((nx, ny), goal),
                    index: neighbor,
                });
            }
        }
    }

    if iterations > cell_count {
        warn!("[PLANNER] A* used {} iterations without reaching {:?}", iterations, goal);
    }
    None
}

fn reconstruct_path(
    grid: &NavGrid,
    came_from: &[usize],
    mut current: usize,
) -> Vec<(usize, usize)> {
    let mut path = vec![(current % grid.width, current / grid.width)];
    while came_from[current] != usize::MAX {
        current = came_from[current];
        path.push((current % grid.width, current / grid.width));
    }
    path.reverse();
    path
}
