//! Idle orders and the death sequence.

use serde::{Deserialize, Serialize};

use super::{attack, Action, Order, OrderHead, OrderStatus};
use crate::context::SimContext;
use crate::error::OrderFault;
use crate::unit::UnitHandle;
use crate::world::World;

/// Idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StillOrder {
    /// Never leave the current tile, even to chase enemies.
    pub stand_ground: bool,
}

/// Death animation countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieOrder {
    /// Ticks until the unit is removed.
    pub ticks_left: u32,
}

pub(super) fn execute_still(
    _head: &mut OrderHead,
    still: &mut StillOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let action = if still.stand_ground {
        Action::StandGround
    } else {
        Action::Still
    };
    let u = world
        .unit(unit)
        .ok_or(OrderFault::UnitVanished { action, unit })?;
    if u.removed || u.is_stunned() || u.under_construction {
        return Ok(OrderStatus::Continue);
    }
    let Some(def) = world.unit_type(unit) else {
        return Err(OrderFault::MissingCatalogEntry {
            action,
            what: format!("type of {unit}"),
        });
    };
    let Some(stats) = def.attack.clone() else {
        return Ok(OrderStatus::Continue);
    };
    let mobile = def.can_move();

    if still.stand_ground || !mobile {
        // strike whatever wanders into weapon range
        let target = world
            .nearest_enemy(unit, stats.range)
            .filter(|t| world.distance_between(unit, *t).is_some_and(|d| d >= stats.min_range));
        if let Some(target) = target {
            return attack::strike(world, ctx, unit, Some(target), None, &stats);
        }
        return Ok(OrderStatus::Continue);
    }

    let react = def.react_range.max(stats.range);
    if let Some(enemy) = world.nearest_enemy(unit, react) {
        let (pos, layer) = world
            .unit(enemy)
            .map(|e| (e.pos, e.layer))
            .unwrap_or_default();
        tracing::debug!(unit = %unit, enemy = %enemy, "still unit reacting");
        return Ok(OrderStatus::Replace(Order::attack(
            enemy,
            pos,
            layer,
            stats.range,
            stats.min_range,
        )));
    }
    Ok(OrderStatus::Continue)
}

pub(super) fn execute_die(
    _head: &mut OrderHead,
    die: &mut DieOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    if die.ticks_left > 0 {
        die.ticks_left -= 1;
        return Ok(OrderStatus::Continue);
    }
    world.release_unit(unit, ctx);
    Ok(OrderStatus::Removed)
}
