//! Move, follow and defend.

use super::{Action, Order, OrderHead, OrderStatus};
use crate::context::SimContext;
use crate::error::OrderFault;
use crate::movement;
use crate::pathfinding::PathStatus;
use crate::unit::UnitHandle;
use crate::world::World;

pub(super) fn execute_move(
    head: &mut OrderHead,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    if !world.units.contains(unit) {
        return Err(OrderFault::UnitVanished {
            action: Action::Move,
            unit,
        });
    }
    let request = head.path_request(world);
    match movement::step(world, ctx, unit, &request) {
        PathStatus::Arrived => {
            head.finished = true;
        }
        PathStatus::Unreachable => {
            tracing::debug!(unit = %unit, goal = %head.goal_pos, "move target unreachable");
            head.finished = true;
        }
        PathStatus::Computing | PathStatus::Moving | PathStatus::Blocked => {}
    }
    Ok(OrderStatus::Continue)
}

pub(super) fn execute_follow(
    head: &mut OrderHead,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let Some(goal) = head.live_goal(world) else {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    };
    if world.unit(goal).is_some_and(|g| g.removed) {
        // goal boarded something; wait for it to reappear
        return Ok(OrderStatus::Continue);
    }
    let request = head.path_request(world);
    let _ = movement::step(world, ctx, unit, &request);
    Ok(OrderStatus::Continue)
}

pub(super) fn execute_defend(
    head: &mut OrderHead,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let Some(goal) = head.live_goal(world) else {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    };
    let stats = world.unit_type(unit).and_then(|d| {
        d.attack
            .clone()
            .map(|a| (a.range, a.min_range, d.react_range.max(a.range)))
    });
    if let Some((range, min_range, react)) = stats {
        let threat = world
            .nearest_enemy(goal, react)
            .or_else(|| world.nearest_enemy(unit, react));
        if let Some(enemy) = threat {
            let (pos, layer) = world
                .unit(enemy)
                .map(|e| (e.pos, e.layer))
                .unwrap_or_default();
            return Ok(OrderStatus::Interrupt(Order::attack(
                enemy, pos, layer, range, min_range,
            )));
        }
    }
    let request = head.path_request(world);
    let _ = movement::step(world, ctx, unit, &request);
    Ok(OrderStatus::Continue)
}
