//! Grid-based pathfinding using A* algorithm.
//!
//! The navigation grid is a bitmap of one-tile cells blocked by building
//! footprints, rebuilt every tick. Units standing still block the cell they
//! occupy for other units' searches; units that are about to move do not.
//!
//! All calculations use fixed-point math for deterministic results
//! across different platforms and clients.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use crate::buildings::collision_bounds;
use crate::data::ContentTables;
use crate::entities::{Building, EntityId, Unit};
use crate::math::{fixed_ratio, Fixed, Vec2Fixed};

/// Maximum A* node expansions before giving up.
pub const MAX_ITERATIONS: usize = 5000;

/// Diagonal step cost.
const DIAGONAL_COST: Fixed = fixed_ratio(14142, 10000);

/// Building occupancy grid.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NavGrid {
    /// Grid width in cells.
    width: u32,
    /// Grid height in cells.
    height: u32,
    /// Blocked flags in row-major order.
    blocked: Vec<bool>,
}

impl NavGrid {
    /// Create a grid with every cell open.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            blocked: vec![false; (width as usize) * (height as usize)],
        }
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Check if coordinates are within grid bounds.
    #[must_use]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Check if a cell is blocked by a building. Out of bounds counts as blocked.
    #[must_use]
    pub fn is_blocked(&self, x: i32, y: i32) -> bool {
        !self.in_bounds(x, y) || self.blocked[self.index(x, y)]
    }

    /// Mark a cell. Out of bounds is ignored.
    pub fn set_blocked(&mut self, x: i32, y: i32, blocked: bool) {
        if self.in_bounds(x, y) {
            let index = self.index(x, y);
            self.blocked[index] = blocked;
        }
    }

    /// Cell containing a world position, clamped onto the grid.
    #[must_use]
    pub fn cell_of(&self, pos: Vec2Fixed) -> (i32, i32) {
        let max_x = self.width.saturating_sub(1) as i32;
        let max_y = self.height.saturating_sub(1) as i32;
        (
            pos.x.floor().to_num::<i32>().clamp(0, max_x),
            pos.y.floor().to_num::<i32>().clamp(0, max_y),
        )
    }

    /// World position of a cell centre.
    #[must_use]
    pub fn cell_center(x: i32, y: i32) -> Vec2Fixed {
        let half = Fixed::ONE / 2;
        Vec2Fixed::new(Fixed::from_num(x) + half, Fixed::from_num(y) + half)
    }

    /// Rebuild the bitmap from building collision bounds.
    pub fn rebuild(&mut self, content: &ContentTables, buildings: &[Building]) {
        self.blocked.iter_mut().for_each(|c| *c = false);
        for building in buildings {
            let Some(bounds) = collision_bounds(content, building) else {
                continue;
            };
            let start_x = bounds.min_x.floor().to_num::<i32>().max(0);
            let end_x = bounds.max_x.ceil().to_num::<i32>().min(self.width as i32);
            let start_y = bounds.min_y.floor().to_num::<i32>().max(0);
            let end_y = bounds.max_y.ceil().to_num::<i32>().min(self.height as i32);
            for y in start_y..end_y {
                for x in start_x..end_x {
                    self.set_blocked(x, y, true);
                }
            }
        }
    }

    /// Cells occupied by stationary units other than `except`.
    #[must_use]
    pub fn occupied_cells(&self, units: &[Unit], except: EntityId) -> BTreeSet<(i32, i32)> {
        units
            .iter()
            .filter(|u| u.id != except)
            .filter(|u| !u.order.as_ref().is_some_and(|o| o.is_in_transit()))
            .map(|u| self.cell_of(u.position))
            .collect()
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    x: i32,
    y: i32,
    g_score: Fixed,
    f_score: Fixed,
    /// Tie-breaker for determinism: lower coordinates first.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, so reverse for min-heap behaviour.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Direction offsets for 8-directional movement.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

#[inline]
fn manhattan_heuristic(x1: i32, y1: i32, x2: i32, y2: i32) -> Fixed {
    Fixed::from_num(x1.abs_diff(x2) + y1.abs_diff(y2))
}

#[inline]
fn coords_to_tie_breaker(x: i32, y: i32) -> u64 {
    ((y as u64) << 32) | (x as u32 as u64)
}

/// Find a path of cell centres from `start` to `goal`.
///
/// The goal cell is always passable. Cells in `occupied` are treated as
/// blocked. Returns `None` when the goal is unreachable or the search runs
/// out of iterations.
#[must_use]
pub fn find_path(
    grid: &NavGrid,
    start: Vec2Fixed,
    goal: Vec2Fixed,
    occupied: &BTreeSet<(i32, i32)>,
) -> Option<Vec<Vec2Fixed>> {
    let (start_x, start_y) = grid.cell_of(start);
    let (goal_x, goal_y) = grid.cell_of(goal);
    if (start_x, start_y) == (goal_x, goal_y) {
        return Some(vec![NavGrid::cell_center(goal_x, goal_y)]);
    }

    let is_blocked = |x: i32, y: i32| {
        if !grid.in_bounds(x, y) {
            return true;
        }
        if (x, y) == (goal_x, goal_y) {
            return false;
        }
        grid.is_blocked(x, y) || occupied.contains(&(x, y))
    };

    let cell_count = grid.blocked.len();
    let mut g_score = vec![Fixed::MAX; cell_count];
    let mut came_from: Vec<Option<usize>> = vec![None; cell_count];
    let mut open_set = BinaryHeap::new();

    let start_index = grid.index(start_x, start_y);
    g_score[start_index] = Fixed::ZERO;
    open_set.push(AStarNode {
        x: start_x,
        y: start_y,
        g_score: Fixed::ZERO,
        f_score: manhattan_heuristic(start_x, start_y, goal_x, goal_y),
        tie_breaker: coords_to_tie_breaker(start_x, start_y),
    });

    let mut iterations = 0;
    while let Some(current) = open_set.pop() {
        let current_index = grid.index(current.x, current.y);
        if current.g_score > g_score[current_index] {
            continue;
        }
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            return None;
        }
        if (current.x, current.y) == (goal_x, goal_y) {
            return Some(reconstruct_path(grid, &came_from, current_index));
        }

        for &(dx, dy) in &DIRECTIONS {
            let (nx, ny) = (current.x + dx, current.y + dy);
            if is_blocked(nx, ny) {
                continue;
            }
            let diagonal = dx != 0 && dy != 0;
            // No corner cutting.
            if diagonal && (is_blocked(current.x + dx, current.y) || is_blocked(current.x, current.y + dy)) {
                continue;
            }
            let step = if diagonal { DIAGONAL_COST } else { Fixed::ONE };
            let tentative_g = current.g_score + step;
            let neighbor_index = grid.index(nx, ny);
            if tentative_g < g_score[neighbor_index] {
                came_from[neighbor_index] = Some(current_index);
                g_score[neighbor_index] = tentative_g;
                open_set.push(AStarNode {
                    x: nx,
                    y: ny,
                    g_score: tentative_g,
                    f_score: tentative_g + manhattan_heuristic(nx, ny, goal_x, goal_y),
                    tie_breaker: coords_to_tie_breaker(nx, ny),
                });
            }
        }
    }
    None
}

fn reconstruct_path(grid: &NavGrid, came_from: &[Option<usize>], goal_index: usize) -> Vec<Vec2Fixed> {
    let width = grid.width as usize;
    let mut path = Vec::new();
    let mut current = Some(goal_index);
    while let Some(index) = current {
        path.push(NavGrid::cell_center((index % width) as i32, (index / width) as i32));
        current = came_from[index];
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn no_units() -> BTreeSet<(i32, i32)> {
        BTreeSet::new()
    }

    #[test]
    fn test_navgrid_creation() {
        let grid = NavGrid::new(10, 8);
        assert_eq!(grid.width(), 10);
        assert_eq!(grid.height(), 8);
        assert!(!grid.is_blocked(0, 0));
        assert!(grid.is_blocked(-1, 0));
        assert!(grid.is_blocked(10, 0));
    }

    #[test]
    fn test_cell_of_clamps() {
        let grid = NavGrid::new(10, 10);
        assert_eq!(grid.cell_of(vec2(3, 4)), (3, 4));
        assert_eq!(grid.cell_of(vec2(-5, 40)), (0, 9));
        assert_eq!(NavGrid::cell_center(2, 3), Vec2Fixed::new(fixed_ratio(5, 2), fixed_ratio(7, 2)));
    }

    #[test]
    fn test_simple_path() {
        let grid = NavGrid::new(10, 10);
        let path = find_path(&grid, vec2(0, 0), vec2(5, 0), &no_units()).unwrap();
        assert_eq!(path.first(), Some(&NavGrid::cell_center(0, 0)));
        assert_eq!(path.last(), Some(&NavGrid::cell_center(5, 0)));
        assert_eq!(path.len(), 6);
    }

    #[test]
    fn test_path_around_obstacle() {
        let mut grid = NavGrid::new(10, 10);
        for y in 0..8 {
            grid.set_blocked(5, y, true);
        }
        let path = find_path(&grid, vec2(2, 2), vec2(8, 2), &no_units()).unwrap();
        for point in &path {
            let (x, y) = grid.cell_of(*point);
            assert!(!grid.is_blocked(x, y));
        }
    }

    #[test]
    fn test_no_corner_cutting() {
        let mut grid = NavGrid::new(4, 4);
        grid.set_blocked(1, 0, true);
        grid.set_blocked(0, 1, true);
        assert!(find_path(&grid, vec2(0, 0), vec2(3, 3), &no_units()).is_none());
    }

    #[test]
    fn test_goal_cell_always_passable() {
        let mut grid = NavGrid::new(10, 10);
        grid.set_blocked(5, 5, true);
        let path = find_path(&grid, vec2(1, 1), vec2(5, 5), &no_units()).unwrap();
        assert_eq!(path.last(), Some(&NavGrid::cell_center(5, 5)));
    }

    #[test]
    fn test_occupied_cells_block_search() {
        let grid = NavGrid::new(3, 1);
        let occupied: BTreeSet<_> = [(1, 0)].into_iter().collect();
        assert!(find_path(&grid, vec2(0, 0), vec2(2, 0), &occupied).is_none());
    }

    #[test]
    fn test_path_to_same_cell() {
        let grid = NavGrid::new(10, 10);
        let path = find_path(&grid, vec2(3, 3), vec2(3, 3), &no_units()).unwrap();
        assert_eq!(path, vec![NavGrid::cell_center(3, 3)]);
    }

    #[test]
    fn test_determinism() {
        let mut grid = NavGrid::new(20, 20);
        for x in 3..15 {
            grid.set_blocked(x, 10, true);
        }
        let a = find_path(&grid, vec2(1, 1), vec2(18, 18), &no_units());
        let b = find_path(&grid, vec2(1, 1), vec2(18, 18), &no_units());
        assert_eq!(a, b);
    }
}
