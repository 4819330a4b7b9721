//! Patrol, boarding, unloading and using items or connectors.

use serde::{Deserialize, Serialize};

use super::{Action, Order, OrderHead, OrderStatus};
use crate::context::SimContext;
use crate::error::OrderFault;
use crate::math::{Footprint, TilePos};
use crate::movement;
use crate::pathfinding::{PathRequest, PathStatus};
use crate::unit::UnitHandle;
use crate::world::World;

/// Patrol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatrolOrder {
    /// The other end of the route.
    pub origin: TilePos,
    /// Walking towards the goal tile (rather than the origin).
    pub heading_out: bool,
}

/// Unload state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnloadOrder {
    /// Only this passenger, or everyone.
    pub what: Option<UnitHandle>,
}

pub(super) fn execute_patrol(
    head: &mut OrderHead,
    patrol: &mut PatrolOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let def = world.unit_type(unit).ok_or(OrderFault::UnitVanished {
        action: Action::Patrol,
        unit,
    })?;
    if let Some(stats) = def.attack.clone() {
        let react = def.react_range.max(stats.range);
        if let Some(enemy) = world.nearest_enemy(unit, react) {
            let (pos, layer) = world
                .unit(enemy)
                .map(|e| (e.pos, e.layer))
                .unwrap_or_default();
            return Ok(OrderStatus::Interrupt(Order::attack(
                enemy,
                pos,
                layer,
                stats.range,
                stats.min_range,
            )));
        }
    }
    let dest = if patrol.heading_out {
        head.goal_pos
    } else {
        patrol.origin
    };
    let request = PathRequest::to_tile(dest, head.goal_layer, 0);
    match movement::step(world, ctx, unit, &request) {
        PathStatus::Arrived => patrol.heading_out = !patrol.heading_out,
        PathStatus::Unreachable => head.finished = true,
        PathStatus::Computing | PathStatus::Moving | PathStatus::Blocked => {}
    }
    Ok(OrderStatus::Continue)
}

pub(super) fn execute_board(
    head: &mut OrderHead,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let Some(transport) = head.live_goal(world) else {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    };
    let capacity = world.unit_type(transport).map_or(0, |d| d.transport_capacity);
    let aboard = world.unit(transport).map_or(0, |t| t.contents.len());
    if aboard >= capacity as usize {
        if let Some(player) = world.unit(unit).map(|u| u.player) {
            ctx.notify(player, "transporter is full");
        }
        head.finished = true;
        return Ok(OrderStatus::Continue);
    }
    if world.unit(unit).is_some_and(|u| u.removed) {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    }
    let request = head.path_request(world);
    match movement::step(world, ctx, unit, &request) {
        PathStatus::Arrived => {
            world.enter_container(unit, transport);
            tracing::debug!(unit = %unit, transport = %transport, "boarded");
            head.finished = true;
        }
        PathStatus::Unreachable => head.finished = true,
        PathStatus::Computing | PathStatus::Moving | PathStatus::Blocked => {}
    }
    Ok(OrderStatus::Continue)
}

pub(super) fn execute_unload(
    head: &mut OrderHead,
    unload: &mut UnloadOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let u = world.unit(unit).ok_or(OrderFault::UnitVanished {
        action: Action::Unload,
        unit,
    })?;
    let mobile = world.unit_type(unit).is_some_and(|d| d.can_move());
    let at_spot = u.layer == head.goal_layer && u.pos.chebyshev(head.goal_pos) <= 1;
    if mobile && !at_spot {
        let request = PathRequest::to_tile(head.goal_pos, head.goal_layer, 1);
        match movement::step(world, ctx, unit, &request) {
            PathStatus::Arrived | PathStatus::Unreachable => {}
            PathStatus::Computing | PathStatus::Moving | PathStatus::Blocked => {
                return Ok(OrderStatus::Continue);
            }
        }
    }
    let stuck = match unload.what {
        Some(passenger) => {
            let inside = world.unit(passenger).and_then(|p| p.container) == Some(unit);
            if inside && !world.drop_out(passenger) {
                vec![passenger]
            } else {
                Vec::new()
            }
        }
        None => world.drop_out_all(unit),
    };
    if !stuck.is_empty() {
        if let Some(player) = world.unit(unit).map(|u| u.player) {
            ctx.notify(player, "no room to unload");
        }
    }
    head.finished = true;
    Ok(OrderStatus::Continue)
}

pub(super) fn execute_use(
    head: &mut OrderHead,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let Some(target) = head.live_goal(world) else {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    };
    let request = head.path_request(world);
    match movement::step(world, ctx, unit, &request) {
        PathStatus::Arrived => {}
        PathStatus::Unreachable => {
            head.finished = true;
            return Ok(OrderStatus::Continue);
        }
        PathStatus::Computing | PathStatus::Moving | PathStatus::Blocked => {
            return Ok(OrderStatus::Continue);
        }
    }
    head.finished = true;
    let Some(def) = world.unit_type(target) else {
        return Err(OrderFault::MissingCatalogEntry {
            action: Action::Use,
            what: format!("type of {target}"),
        });
    };
    if def.connector {
        let dest = world
            .unit(target)
            .and_then(|t| t.connection)
            .filter(|d| world.is_alive(*d));
        if let Some(dest) = dest {
            teleport(world, unit, target, dest);
        }
    } else if def.is_item() {
        let heal = def.item_heal;
        world.heal_unit(unit, heal);
        world.let_unit_die(target, ctx);
        tracing::debug!(unit = %unit, item = %target, heal, "item used");
    }
    Ok(OrderStatus::Continue)
}

/// Move `unit` from `entry` to a free tile next to the paired connector.
fn teleport(world: &mut World, unit: UnitHandle, entry: UnitHandle, dest: UnitHandle) {
    let (Some(dest_fp), Some(dest_layer)) =
        (world.footprint(dest), world.unit(dest).map(|d| d.layer))
    else {
        return;
    };
    world.remove_from_map(unit);
    if world.drop_out_near(unit, dest_fp, dest_layer) {
        tracing::debug!(unit = %unit, layer = dest_layer, "passed connector");
        return;
    }
    // no room on the far side: step back out where we came in
    let back = world
        .footprint(entry)
        .zip(world.unit(entry).map(|e| e.layer));
    let placed = back.is_some_and(|(fp, layer)| world.drop_out_near(unit, fp, layer));
    if !placed {
        let fallback = world.unit(unit).map(|u| (Footprint::tile(u.pos), u.layer));
        if let Some((fp, layer)) = fallback {
            world.drop_out_near(unit, fp, layer);
        }
    }
}
