//! Grid-based pathfinding using the A* algorithm, and the request/status
//! boundary orders use to talk to it.
//!
//! Orders never wait on a path. They hand a [`PathRequest`] to the movement
//! layer and poll a [`PathStatus`] each tick.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

use crate::error::{GameError, Result};
use crate::map::{LayerId, MapLayer};
use crate::math::{Footprint, TilePos};

/// What a moving order wants to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathRequest {
    /// Top-left tile of the goal area.
    pub goal: TilePos,
    /// Goal area width.
    pub goal_width: u32,
    /// Goal area height.
    pub goal_height: u32,
    /// Minimum distance to keep from the goal area.
    pub min_range: u32,
    /// Maximum distance at which the goal counts as reached.
    pub max_range: u32,
    /// Layer the goal is on.
    pub layer: LayerId,
}

impl PathRequest {
    /// Request to stand within `range` of a single tile.
    #[must_use]
    pub const fn to_tile(goal: TilePos, layer: LayerId, range: u32) -> Self {
        Self {
            goal,
            goal_width: 1,
            goal_height: 1,
            min_range: 0,
            max_range: range,
            layer,
        }
    }

    /// Request to stand between `min_range` and `max_range` of an area.
    #[must_use]
    pub const fn to_area(area: Footprint, layer: LayerId, min_range: u32, max_range: u32) -> Self {
        Self {
            goal: area.origin,
            goal_width: area.width,
            goal_height: area.height,
            min_range,
            max_range,
            layer,
        }
    }

    /// The goal area.
    #[must_use]
    pub const fn area(&self) -> Footprint {
        Footprint::new(self.goal, self.goal_width, self.goal_height)
    }

    /// Whether standing on `pos` satisfies the request.
    #[must_use]
    pub fn accepts(&self, pos: TilePos) -> bool {
        let d = self.area().distance_to_tile(pos);
        d >= self.min_range && d <= self.max_range
    }

    fn heuristic(&self, pos: TilePos) -> u32 {
        self.area()
            .distance_to_tile(pos)
            .saturating_sub(self.max_range)
    }
}

/// Polled result of a movement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathStatus {
    /// A route was just requested; movement starts next tick.
    Computing,
    /// Moving along the route.
    Moving,
    /// Standing within range of the goal.
    Arrived,
    /// No route exists.
    Unreachable,
    /// The next step is occupied; try again later.
    Blocked,
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    pos: TilePos,
    f_score: u32,
    /// Tie-breaker for determinism: lower coordinates first.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for lowest f first.
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
    (1, 0),   // East
    (1, 1),   // Southeast
    (0, 1),   // South
    (-1, 1),  // Southwest
    (-1, 0),  // West
    (-1, -1), // Northwest
    (0, -1),  // North
    (1, -1),  // Northeast
];

fn coords_to_tie_breaker(pos: TilePos) -> u64 {
    (u64::from(pos.y as u32) << 32) | u64::from(pos.x as u32)
}

/// Check a diagonal move does not cut a blocked corner.
fn is_diagonal_valid(
    layer: &MapLayer,
    from: TilePos,
    dx: i32,
    dy: i32,
    blocked: &impl Fn(TilePos) -> bool,
) -> bool {
    if dx == 0 || dy == 0 {
        return true;
    }
    let side_a = from.offset(dx, 0);
    let side_b = from.offset(0, dy);
    layer.movement_cost(side_a).is_some()
        && layer.movement_cost(side_b).is_some()
        && !blocked(side_a)
        && !blocked(side_b)
}

/// Find a route from `start` to any tile accepted by `request`.
///
/// `blocked` reports tiles that are walkable terrain but occupied by
/// something the mover cannot pass (typically structures). The returned
/// path excludes `start` and is empty when `start` already satisfies the
/// request.
///
/// # Errors
///
/// Returns `GameError::InvalidState` if `start` is off the layer or no
/// route exists.
pub fn find_path(
    layer: &MapLayer,
    start: TilePos,
    request: &PathRequest,
    blocked: impl Fn(TilePos) -> bool,
) -> Result<Vec<TilePos>> {
    if !layer.in_bounds(start) {
        return Err(GameError::InvalidState(format!(
            "Start position {start} outside layer"
        )));
    }
    if request.accepts(start) {
        return Ok(Vec::new());
    }

    let mut open_set = BinaryHeap::new();
    let mut came_from: BTreeMap<TilePos, TilePos> = BTreeMap::new();
    let mut g_score: BTreeMap<TilePos, u32> = BTreeMap::new();
    let budget = layer.width() as usize * layer.height() as usize;
    let mut expanded = 0_usize;

    g_score.insert(start, 0);
    open_set.push(AStarNode {
        pos: start,
        f_score: request.heuristic(start),
        tie_breaker: coords_to_tie_breaker(start),
    });

    while let Some(current) = open_set.pop() {
        if request.accepts(current.pos) {
            return Ok(reconstruct_path(&came_from, start, current.pos));
        }
        expanded += 1;
        if expanded > budget {
            break;
        }

        let current_g = g_score.get(&current.pos).copied().unwrap_or(u32::MAX);
        // Skip stale heap entries
        if current.f_score > current_g.saturating_add(request.heuristic(current.pos)) {
            continue;
        }

        for &(dx, dy) in &DIRECTIONS {
            let next = current.pos.offset(dx, dy);
            let Some(cost) = layer.movement_cost(next) else {
                continue;
            };
            if blocked(next) || !is_diagonal_valid(layer, current.pos, dx, dy, &blocked) {
                continue;
            }

            let tentative_g = current_g + cost;
            if tentative_g < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                came_from.insert(next, current.pos);
                g_score.insert(next, tentative_g);
                open_set.push(AStarNode {
                    pos: next,
                    f_score: tentative_g + request.heuristic(next),
                    tie_breaker: coords_to_tie_breaker(next),
                });
            }
        }
    }

    Err(GameError::InvalidState(format!(
        "No path from {start} to {} (range {}..={})",
        request.goal, request.min_range, request.max_range
    )))
}

fn reconstruct_path(
    came_from: &BTreeMap<TilePos, TilePos>,
    start: TilePos,
    end: TilePos,
) -> Vec<TilePos> {
    let mut path = vec![end];
    let mut current = end;
    while let Some(&prev) = came_from.get(&current) {
        if prev == start {
            break;
        }
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::CellType;

    fn open(_: TilePos) -> bool {
        false
    }

    #[test]
    fn test_straight_path() {
        let layer = MapLayer::new(10, 10);
        let req = PathRequest::to_tile(TilePos::new(5, 0), 0, 0);
        let path = find_path(&layer, TilePos::new(0, 0), &req, open).unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path.last(), Some(&TilePos::new(5, 0)));
    }

    #[test]
    fn test_path_around_wall() {
        let mut layer = MapLayer::new(10, 10);
        for y in 0..9 {
            layer.set_cell(TilePos::new(5, y), CellType::Blocked);
        }
        let req = PathRequest::to_tile(TilePos::new(8, 0), 0, 0);
        let path = find_path(&layer, TilePos::new(2, 0), &req, open).unwrap();
        assert!(path.iter().all(|p| layer.cell(*p) != Some(CellType::Blocked)));
        assert!(path.contains(&TilePos::new(5, 9)));
    }

    #[test]
    fn test_no_path() {
        let mut layer = MapLayer::new(10, 10);
        for y in 0..10 {
            layer.set_cell(TilePos::new(5, y), CellType::Blocked);
        }
        let req = PathRequest::to_tile(TilePos::new(8, 0), 0, 0);
        assert!(find_path(&layer, TilePos::new(2, 0), &req, open).is_err());
    }

    #[test]
    fn test_already_in_range() {
        let layer = MapLayer::new(10, 10);
        let req = PathRequest::to_tile(TilePos::new(3, 3), 0, 2);
        let path = find_path(&layer, TilePos::new(2, 2), &req, open).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn test_range_to_area_stops_adjacent() {
        let layer = MapLayer::new(12, 12);
        let area = Footprint::new(TilePos::new(6, 6), 2, 2);
        let req = PathRequest::to_area(area, 0, 1, 1);
        let path = find_path(&layer, TilePos::new(0, 0), &req, |p| area.contains(p)).unwrap();
        let end = *path.last().unwrap();
        assert_eq!(area.distance_to_tile(end), 1);
    }

    #[test]
    fn test_determinism() {
        let layer = MapLayer::new(20, 20);
        let req = PathRequest::to_tile(TilePos::new(17, 13), 0, 0);
        let a = find_path(&layer, TilePos::new(1, 2), &req, open).unwrap();
        let b = find_path(&layer, TilePos::new(1, 2), &req, open).unwrap();
        assert_eq!(a, b);
    }
}
