//! Attack and attack-ground.

use serde::{Deserialize, Serialize};

use super::{Action, OrderHead, OrderStatus};
use crate::context::SimContext;
use crate::data::AttackStats;
use crate::error::OrderFault;
use crate::map::LayerId;
use crate::math::{Footprint, TilePos};
use crate::movement;
use crate::pathfinding::{PathRequest, PathStatus};
use crate::unit::UnitHandle;
use crate::world::World;

/// Phase of an attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackState {
    /// Closing in on the goal.
    Approaching,
    /// In weapon range, striking on cooldown.
    Striking,
}

/// Attack state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackOrder {
    /// Strike the goal tile rather than a unit.
    pub ground: bool,
    /// Attack-move: pick up enemies on the way to the goal tile.
    pub roaming: bool,
    /// Current phase.
    pub state: AttackState,
}

impl AttackOrder {
    /// Attack a unit, or the ground when `ground` is set.
    #[must_use]
    pub const fn new(ground: bool) -> Self {
        Self {
            ground,
            roaming: false,
            state: AttackState::Approaching,
        }
    }

    /// Attack-move.
    #[must_use]
    pub const fn roaming() -> Self {
        Self {
            ground: false,
            roaming: true,
            state: AttackState::Approaching,
        }
    }
}

pub(super) fn execute(
    head: &mut OrderHead,
    attack: &mut AttackOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let action = if attack.ground {
        Action::AttackGround
    } else {
        Action::Attack
    };
    let u = world
        .unit(unit)
        .ok_or(OrderFault::UnitVanished { action, unit })?;
    if u.removed {
        return Ok(OrderStatus::Continue);
    }
    let (pos, layer) = (u.pos, u.layer);
    let def = world
        .unit_type(unit)
        .ok_or_else(|| OrderFault::MissingCatalogEntry {
            action,
            what: format!("type of {unit}"),
        })?;
    let Some(stats) = def.attack.clone() else {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    };
    let react = def.react_range.max(stats.range);
    let mobile = def.can_move();

    let mut target = None;
    if !attack.ground {
        target = head.live_goal(world);
        if target.is_none() {
            let had_goal = head.goal.take().is_some();
            if had_goal || attack.roaming {
                target = world.nearest_enemy(unit, react);
                head.goal = target;
            }
            if target.is_none() && !attack.roaming {
                tracing::trace!(unit = %unit, "attack goal lost");
                return Ok(finish_and_restore(head, unit, world));
            }
        }
    }

    let (request, striking) = match target {
        Some(t) => {
            let (Some(area), Some(goal)) = (world.footprint(t), world.unit(t)) else {
                return Err(OrderFault::UnitVanished { action, unit: t });
            };
            (
                PathRequest::to_area(area, goal.layer, stats.min_range, stats.range),
                true,
            )
        }
        None if attack.ground => (
            PathRequest::to_area(
                Footprint::tile(head.goal_pos),
                head.goal_layer,
                stats.min_range,
                stats.range,
            ),
            true,
        ),
        None => (PathRequest::to_tile(head.goal_pos, head.goal_layer, 0), false),
    };

    if striking && layer == request.layer && request.accepts(pos) {
        attack.state = AttackState::Striking;
        let ground = attack.ground.then_some((head.goal_pos, head.goal_layer));
        return strike(world, ctx, unit, target, ground, &stats);
    }
    attack.state = AttackState::Approaching;
    if !mobile {
        return Ok(finish_and_restore(head, unit, world));
    }
    match movement::step(world, ctx, unit, &request) {
        PathStatus::Unreachable => Ok(finish_and_restore(head, unit, world)),
        PathStatus::Arrived if !striking => Ok(finish_and_restore(head, unit, world)),
        _ => Ok(OrderStatus::Continue),
    }
}

/// One weapon strike against `target` or whatever stands on `ground`.
///
/// Starts the cooldown and the unbreakable swing. Suicide attackers die
/// on the strike and report [`OrderStatus::Died`].
pub(super) fn strike(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    target: Option<UnitHandle>,
    ground: Option<(TilePos, LayerId)>,
    stats: &AttackStats,
) -> Result<OrderStatus, OrderFault> {
    let u = world.unit(unit).ok_or(OrderFault::UnitVanished {
        action: Action::Attack,
        unit,
    })?;
    let player = u.player;
    let mut draws = u.rng_draws;
    let bonus = world.player(player).map_or(0, |p| p.damage_bonus);
    let spread = ctx.roll(&mut draws, stats.spread);
    let damage = (stats.damage + bonus + spread as i32).max(1);
    if let Some(u) = world.unit_mut(unit) {
        u.rng_draws = draws;
        u.wait = stats.cooldown;
        u.begin_unbreakable(stats.swing_ticks);
    }

    let victim = target.or_else(|| {
        ground.and_then(|(tile, layer)| {
            world
                .map
                .layer(layer)
                .and_then(|l| l.occupant(tile))
                .filter(|o| *o != unit)
        })
    });
    if let Some(victim) = victim {
        let killed = world.hit_unit(victim, damage, ctx);
        tracing::trace!(unit = %unit, victim = %victim, damage, killed, "strike");
    }
    if stats.suicide {
        world.let_unit_die(unit, ctx);
        return Ok(OrderStatus::Died);
    }
    Ok(OrderStatus::Continue)
}

/// Finish the order and put back the order saved by an interruption.
pub(super) fn finish_and_restore(
    head: &mut OrderHead,
    unit: UnitHandle,
    world: &mut World,
) -> OrderStatus {
    head.finished = true;
    let saved = world.unit_mut(unit).and_then(|u| u.orders.take_saved());
    if let Some(saved) = saved.filter(|o| !o.is_finished() && o.is_valid(&world.catalog)) {
        if let Some(u) = world.unit_mut(unit) {
            u.orders.insert_after_active(saved);
        }
    }
    OrderStatus::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sandbox;
    use crate::order::Order;

    #[test]
    fn test_strike_applies_cooldown_and_damage() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(2, 2), 0)
            .unwrap();
        let enemy = world
            .spawn_unit(&mut ctx, types.footman, 1, TilePos::new(3, 2), 0)
            .unwrap();
        let mut order = Order::attack(enemy, TilePos::new(3, 2), 0, 1, 0);
        let status = order.execute(me, &mut world, &mut ctx).unwrap();
        assert_eq!(status, OrderStatus::Continue);
        let attacker = world.unit(me).unwrap();
        assert!(attacker.wait > 0);
        assert!(attacker.is_unbreakable());
        assert_eq!(attacker.rng_draws, 1);
        assert!(world.unit(enemy).unwrap().hp < world.max_hp(enemy));
    }

    #[test]
    fn test_lost_goal_finishes_and_restores_saved() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(2, 2), 0)
            .unwrap();
        let enemy = world
            .spawn_unit(&mut ctx, types.footman, 1, TilePos::new(3, 2), 0)
            .unwrap();
        let patrol = Order::patrol(TilePos::new(2, 2), TilePos::new(8, 2), 0);
        world.unit_mut(me).unwrap().orders.set_saved(patrol);
        world.let_unit_die(enemy, &mut ctx);
        let mut order = Order::attack(enemy, TilePos::new(3, 2), 0, 1, 0);
        order.execute(me, &mut world, &mut ctx).unwrap();
        assert!(order.is_finished());
        let orders = &world.unit(me).unwrap().orders;
        assert!(orders.saved().is_none());
        assert_eq!(orders.get(1).map(Order::action), Some(Action::Patrol));
    }

    #[test]
    fn test_suicide_attacker_dies() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.sapper, 0, TilePos::new(2, 2), 0)
            .unwrap();
        let wall = world
            .spawn_unit(&mut ctx, types.footman, 1, TilePos::new(3, 2), 0)
            .unwrap();
        let mut order = Order::attack(wall, TilePos::new(3, 2), 0, 1, 0);
        let status = order.execute(me, &mut world, &mut ctx).unwrap();
        assert_eq!(status, OrderStatus::Died);
        assert!(world.unit(me).unwrap().dying);
    }
}
