//! Spell casting.

use serde::{Deserialize, Serialize};

use super::{Action, OrderHead, OrderStatus};
use crate::context::SimContext;
use crate::data::{SpellEffect, SpellId};
use crate::error::OrderFault;
use crate::math::Footprint;
use crate::movement;
use crate::pathfinding::{PathRequest, PathStatus};
use crate::unit::UnitHandle;
use crate::world::World;

/// Spell-cast state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellCastOrder {
    /// Spell to cast.
    pub spell: SpellId,
}

pub(super) fn execute(
    head: &mut OrderHead,
    cast: &mut SpellCastOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let spell = world
        .catalog
        .spell(cast.spell)
        .cloned()
        .ok_or_else(|| OrderFault::MissingCatalogEntry {
            action: Action::SpellCast,
            what: format!("{:?}", cast.spell),
        })?;
    let u = world.unit(unit).ok_or(OrderFault::UnitVanished {
        action: Action::SpellCast,
        unit,
    })?;
    let (pos, layer, mana, player) = (u.pos, u.layer, u.mana, u.player);

    let target = head.live_goal(world);
    if spell.needs_unit && target.is_none() {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    }
    let (area, goal_layer) = match target {
        Some(t) => (
            world.footprint(t).unwrap_or_else(|| Footprint::tile(head.goal_pos)),
            head.goal_map_layer(world),
        ),
        None => (Footprint::tile(head.goal_pos), head.goal_layer),
    };
    let request = PathRequest::to_area(area, goal_layer, 0, spell.range);

    if layer != goal_layer || !request.accepts(pos) {
        let mobile = world.unit_type(unit).is_some_and(|d| d.can_move());
        if !mobile {
            head.finished = true;
            return Ok(OrderStatus::Continue);
        }
        match movement::step(world, ctx, unit, &request) {
            PathStatus::Unreachable => head.finished = true,
            PathStatus::Arrived
            | PathStatus::Computing
            | PathStatus::Moving
            | PathStatus::Blocked => {}
        }
        return Ok(OrderStatus::Continue);
    }

    head.finished = true;
    if mana < spell.mana_cost {
        ctx.notify(player, format!("not enough mana for {}", spell.ident));
        return Ok(OrderStatus::Continue);
    }
    if let Some(u) = world.unit_mut(unit) {
        u.mana -= spell.mana_cost;
    }
    let victim = target.or_else(|| {
        world
            .map
            .layer(goal_layer)
            .and_then(|l| l.occupant(head.goal_pos))
    });
    match (spell.effect, victim) {
        (SpellEffect::Heal(amount), Some(v)) => world.heal_unit(v, amount),
        (SpellEffect::Damage(amount), Some(v)) => {
            world.hit_unit(v, amount, ctx);
        }
        (SpellEffect::Stun(ticks), Some(v)) => {
            if let Some(v) = world.unit_mut(v) {
                v.stun_ticks = v.stun_ticks.max(ticks);
            }
        }
        (_, None) => {}
    }
    tracing::debug!(unit = %unit, spell = %spell.ident, "spell cast");
    Ok(OrderStatus::Continue)
}
