//! Tile-by-tile movement along planned routes.
//!
//! Orders poll [`step`] once per tick with the request they want answered.
//! Planning happens on the first poll and whenever the request changes;
//! the unit then advances by its speed in sub-tile progress and enters the
//! next tile once progress reaches a whole tile.

use crate::context::SimContext;
use crate::math::Fixed;
use crate::pathfinding::{find_path, PathRequest, PathStatus};
use crate::unit::UnitHandle;
use crate::world::World;

/// Advance `unit` towards `request` by one tick.
pub fn step(
    world: &mut World,
    _ctx: &mut SimContext,
    unit: UnitHandle,
    request: &PathRequest,
) -> PathStatus {
    let Some(u) = world.unit(unit) else {
        return PathStatus::Unreachable;
    };
    if u.removed || u.layer != request.layer {
        return PathStatus::Unreachable;
    }
    if request.accepts(u.pos) {
        if let Some(u) = world.unit_mut(unit) {
            u.clear_path();
        }
        return PathStatus::Arrived;
    }
    let Some(speed) = world.unit_type(unit).and_then(|d| d.speed) else {
        return PathStatus::Unreachable;
    };

    let layer_id = u.layer;
    let needs_plan = u.path.is_empty() || u.path_request.as_ref() != Some(request);
    if needs_plan {
        return plan(world, unit, request);
    }

    let repath_after = world.config.repath_after_blocked;
    let Some(u) = world.unit_mut(unit) else {
        return PathStatus::Unreachable;
    };
    u.move_progress += speed;
    if u.move_progress < Fixed::ONE {
        return PathStatus::Moving;
    }
    let Some(&next) = u.path.last() else {
        return PathStatus::Computing;
    };
    let last_step = u.path.len() == 1;

    let occupant = world
        .map
        .layer(layer_id)
        .and_then(|l| l.occupant(next))
        .filter(|o| *o != unit);
    if occupant.is_some() {
        let Some(u) = world.unit_mut(unit) else {
            return PathStatus::Unreachable;
        };
        u.move_progress = Fixed::ONE;
        u.blocked_ticks += 1;
        if u.blocked_ticks >= repath_after {
            if last_step {
                u.clear_path();
                return PathStatus::Unreachable;
            }
            u.path.clear();
            u.blocked_ticks = 0;
        }
        return PathStatus::Blocked;
    }

    world.step_unit(unit, next);
    let Some(u) = world.unit_mut(unit) else {
        return PathStatus::Unreachable;
    };
    u.path.pop();
    u.move_progress -= Fixed::ONE;
    u.blocked_ticks = 0;
    if request.accepts(next) {
        u.clear_path();
        PathStatus::Arrived
    } else {
        PathStatus::Moving
    }
}

fn plan(world: &mut World, unit: UnitHandle, request: &PathRequest) -> PathStatus {
    let Some(u) = world.unit(unit) else {
        return PathStatus::Unreachable;
    };
    let Some(layer) = world.map.layer(request.layer) else {
        return PathStatus::Unreachable;
    };
    // Structures block planning; mobile units are waited out.
    let blocked = |pos| {
        layer
            .occupant(pos)
            .filter(|o| *o != unit)
            .and_then(|o| world.unit_type(o))
            .is_some_and(|d| d.building || !d.can_move())
    };
    let planned = find_path(layer, u.pos, request, blocked);
    let Some(u) = world.unit_mut(unit) else {
        return PathStatus::Unreachable;
    };
    match planned {
        Ok(mut path) if !path.is_empty() => {
            path.reverse();
            u.path = path;
            u.path_request = Some(*request);
            u.blocked_ticks = 0;
            PathStatus::Computing
        }
        Ok(_) => {
            u.clear_path();
            PathStatus::Arrived
        }
        Err(e) => {
            tracing::trace!(unit = %unit, error = %e, "no route");
            u.clear_path();
            PathStatus::Unreachable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sandbox;
    use crate::math::TilePos;

    fn walk(
        world: &mut World,
        ctx: &mut SimContext,
        unit: UnitHandle,
        req: &PathRequest,
    ) -> PathStatus {
        for _ in 0..200 {
            match step(world, ctx, unit, req) {
                PathStatus::Arrived => return PathStatus::Arrived,
                PathStatus::Unreachable => return PathStatus::Unreachable,
                _ => {}
            }
        }
        PathStatus::Moving
    }

    #[test]
    fn test_walks_to_tile() {
        let (mut world, mut ctx, types) = sandbox();
        let unit = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        let req = PathRequest::to_tile(TilePos::new(6, 4), 0, 0);
        assert_eq!(walk(&mut world, &mut ctx, unit, &req), PathStatus::Arrived);
        assert_eq!(world.unit(unit).unwrap().pos, TilePos::new(6, 4));
        let layer = world.map.layer(0).unwrap();
        assert_eq!(layer.occupant(TilePos::new(6, 4)), Some(unit));
        assert_eq!(layer.occupant(TilePos::new(1, 1)), None);
    }

    #[test]
    fn test_first_poll_plans() {
        let (mut world, mut ctx, types) = sandbox();
        let unit = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        let req = PathRequest::to_tile(TilePos::new(4, 1), 0, 0);
        assert_eq!(step(&mut world, &mut ctx, unit, &req), PathStatus::Computing);
        assert!(!world.unit(unit).unwrap().path.is_empty());
    }

    #[test]
    fn test_other_layer_is_unreachable() {
        let (mut world, mut ctx, types) = sandbox();
        let unit = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        let req = PathRequest::to_tile(TilePos::new(4, 1), 1, 0);
        assert_eq!(step(&mut world, &mut ctx, unit, &req), PathStatus::Unreachable);
    }

    #[test]
    fn test_occupied_destination_gives_up() {
        let (mut world, mut ctx, types) = sandbox();
        let unit = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(3, 1), 0)
            .unwrap();
        let req = PathRequest::to_tile(TilePos::new(3, 1), 0, 0);
        assert_eq!(walk(&mut world, &mut ctx, unit, &req), PathStatus::Unreachable);
        assert_eq!(world.unit(unit).unwrap().pos, TilePos::new(2, 1));
    }
}
