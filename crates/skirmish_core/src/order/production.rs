//! Training, research, upgrade-to and transform.
//!
//! Training, research and upgrade-to hold resources deducted at issue time.
//! Their cancel hooks refund a flat percentage of that cost regardless of
//! progress.

use serde::{Deserialize, Serialize};

use super::{Action, OrderHead, OrderStatus};
use crate::config::RefundBasis;
use crate::context::SimContext;
use crate::data::{UnitTypeId, UpgradeId};
use crate::economy::Costs;
use crate::error::{GameError, OrderFault};
use crate::events::GameEvent;
use crate::player::{progress_goal, progress_rate, PlayerId};
use crate::unit::UnitHandle;
use crate::world::World;

/// Train state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainOrder {
    /// Unit type being trained.
    pub unit_type: UnitTypeId,
    /// Player who paid and receives the unit.
    pub payer: PlayerId,
    /// Hundredths of work done.
    pub progress: u32,
    /// Cost deducted when the order was issued.
    pub cost: Costs,
}

/// Research state. Progress lives in the payer's ledger so every building
/// researching the same upgrade shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchOrder {
    /// Upgrade being researched.
    pub upgrade: UpgradeId,
    /// Player who paid and benefits.
    pub payer: PlayerId,
    /// Cost deducted when the order was issued.
    pub cost: Costs,
}

/// Upgrade-to state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeToOrder {
    /// Target type.
    pub unit_type: UnitTypeId,
    /// Hundredths of work done.
    pub progress: u32,
    /// Cost deducted when the order was issued.
    pub cost: Costs,
}

/// Transform state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOrder {
    /// Target type.
    pub unit_type: UnitTypeId,
}

fn missing(action: Action, what: impl std::fmt::Display) -> OrderFault {
    OrderFault::MissingCatalogEntry {
        action,
        what: what.to_string(),
    }
}

/// Speed percent for a producer, and the producer's own time bonus.
fn rates(
    world: &World,
    unit: UnitHandle,
    payer: PlayerId,
    action: Action,
) -> Result<(i32, i32), OrderFault> {
    let u = world
        .unit(unit)
        .ok_or(OrderFault::UnitVanished { action, unit })?;
    let speed = world.player(payer).map_or(100, |p| match action {
        Action::Research => p.speed.research,
        Action::UpgradeTo => p.speed.upgrade,
        _ => p.speed.train,
    });
    Ok((speed, u.bonus.time_efficiency))
}

pub(super) fn execute_train(
    head: &mut OrderHead,
    train: &mut TrainOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    if world.unit(unit).is_some_and(|u| u.under_construction) {
        return Ok(OrderStatus::Continue);
    }
    let def = world
        .catalog
        .unit_type(train.unit_type)
        .ok_or_else(|| missing(Action::Train, format!("{:?}", train.unit_type)))?;
    let goal = progress_goal(def.build_time);
    let (speed, bonus) = rates(world, unit, train.payer, Action::Train)?;
    train.progress = train
        .progress
        .saturating_add(progress_rate(speed, bonus))
        .min(goal);
    if train.progress < goal {
        return Ok(OrderStatus::Continue);
    }

    let (Some(near), Some(layer)) = (world.footprint(unit), world.unit(unit).map(|u| u.layer))
    else {
        return Err(OrderFault::UnitVanished {
            action: Action::Train,
            unit,
        });
    };
    let trained = match world.spawn_unit_near(ctx, train.unit_type, train.payer, near, layer) {
        Ok(h) => h,
        Err(GameError::NoRoom { .. }) => {
            // hold the finished unit until a tile frees up
            ctx.notify(train.payer, "no room to place the trained unit");
            let wait = world.config.ticks_per_second;
            if let Some(u) = world.unit_mut(unit) {
                u.wait = wait;
            }
            return Ok(OrderStatus::Continue);
        }
        Err(e) => {
            return Err(OrderFault::ImpossibleState {
                action: Action::Train,
                detail: e.to_string(),
            });
        }
    };

    let rally = world.unit(unit).and_then(|u| u.orders.pending().copied());
    if let Some(mut rally) = rally {
        rally.head.finished = false;
        if let Some(new_unit) = world.unit_mut(trained) {
            new_unit.orders.replace_active(rally);
        }
    }
    head.finished = true;
    ctx.emit(GameEvent::TrainingComplete {
        building: unit,
        unit: trained,
    });
    tracing::info!(building = %unit, unit = %trained, player = train.payer, "training complete");
    Ok(OrderStatus::Continue)
}

pub(super) fn execute_research(
    head: &mut OrderHead,
    research: &mut ResearchOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    if world.unit(unit).is_some_and(|u| u.under_construction) {
        return Ok(OrderStatus::Continue);
    }
    let def = world
        .catalog
        .upgrade(research.upgrade)
        .cloned()
        .ok_or_else(|| missing(Action::Research, format!("{:?}", research.upgrade)))?;
    let goal = progress_goal(def.research_time);
    let (speed, bonus) = rates(world, unit, research.payer, Action::Research)?;
    let payer = research.payer;
    let Some(player) = world.player_mut(payer) else {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    };
    if player.upgrades.contains(&research.upgrade) {
        // another building finished it first
        head.finished = true;
        return Ok(OrderStatus::Continue);
    }
    let progress = player.research_progress.entry(research.upgrade).or_insert(0);
    *progress = progress.saturating_add(progress_rate(speed, bonus)).min(goal);
    if *progress < goal {
        return Ok(OrderStatus::Continue);
    }
    player.acquire_upgrade(research.upgrade, &def);
    head.finished = true;
    ctx.emit(GameEvent::ResearchComplete {
        player: payer,
        upgrade: research.upgrade,
    });
    tracing::info!(building = %unit, player = payer, upgrade = %def.ident, "research complete");
    Ok(OrderStatus::Continue)
}

pub(super) fn execute_upgrade_to(
    head: &mut OrderHead,
    upgrade: &mut UpgradeToOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let def = world
        .catalog
        .unit_type(upgrade.unit_type)
        .ok_or_else(|| missing(Action::UpgradeTo, format!("{:?}", upgrade.unit_type)))?;
    let goal = progress_goal(def.build_time);
    let payer = world.unit(unit).map_or(0, |u| u.player);
    let (speed, bonus) = rates(world, unit, payer, Action::UpgradeTo)?;
    upgrade.progress = upgrade
        .progress
        .saturating_add(progress_rate(speed, bonus))
        .min(goal);
    if upgrade.progress < goal {
        return Ok(OrderStatus::Continue);
    }
    if !world.transform_unit(unit, upgrade.unit_type, ctx) {
        // footprint blocked: retry next second
        ctx.notify(payer, "no room to upgrade");
        let wait = world.config.ticks_per_second;
        if let Some(u) = world.unit_mut(unit) {
            u.wait = wait;
        }
        return Ok(OrderStatus::Continue);
    }
    head.finished = true;
    tracing::info!(unit = %unit, unit_type = %world.type_ident(unit), "upgrade complete");
    Ok(OrderStatus::Continue)
}

pub(super) fn execute_transform(
    head: &mut OrderHead,
    transform: &mut TransformOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    if world.catalog.unit_type(transform.unit_type).is_none() {
        return Err(missing(
            Action::TransformInto,
            format!("{:?}", transform.unit_type),
        ));
    }
    head.finished = true;
    if !world.transform_unit(unit, transform.unit_type, ctx) {
        if let Some(player) = world.unit(unit).map(|u| u.player) {
            ctx.notify(player, "no room to transform");
        }
    }
    Ok(OrderStatus::Continue)
}

/// Cost a refund is computed from under the configured basis.
fn refund_basis(world: &World, snapshot: Costs, current: Option<Costs>) -> Costs {
    match world.config.refund_basis {
        RefundBasis::IssueSnapshot => snapshot,
        RefundBasis::CurrentCost => current.unwrap_or(snapshot),
    }
}

pub(super) fn cancel_train(train: &mut TrainOrder, unit: UnitHandle, world: &mut World) {
    let current = world.player(train.payer).and_then(|p| {
        world
            .catalog
            .unit_type(train.unit_type)
            .map(|def| p.unit_type_cost(train.unit_type, def))
    });
    let basis = refund_basis(world, train.cost, current);
    let percent = world.config.cancel_train_refund_percent;
    if let Some(p) = world.player_mut(train.payer) {
        p.refund(&basis, percent);
    }
    train.progress = 0;
    tracing::debug!(building = %unit, percent, "training cancelled");
}

pub(super) fn cancel_research(research: &mut ResearchOrder, unit: UnitHandle, world: &mut World) {
    let current = world.catalog.upgrade(research.upgrade).map(|u| u.costs);
    let basis = refund_basis(world, research.cost, current);
    let percent = world.config.cancel_research_refund_percent;
    if let Some(p) = world.player_mut(research.payer) {
        if p.upgrades.contains(&research.upgrade) {
            return;
        }
        p.research_progress.remove(&research.upgrade);
        p.refund(&basis, percent);
    }
    tracing::debug!(building = %unit, percent, "research cancelled");
}

pub(super) fn cancel_upgrade_to(upgrade: &mut UpgradeToOrder, unit: UnitHandle, world: &mut World) {
    let Some(payer) = world.unit(unit).map(|u| u.player) else {
        return;
    };
    let current = world.player(payer).and_then(|p| {
        world
            .catalog
            .unit_type(upgrade.unit_type)
            .map(|def| p.unit_type_cost(upgrade.unit_type, def))
    });
    let basis = refund_basis(world, upgrade.cost, current);
    let percent = world.config.cancel_upgrade_refund_percent;
    if let Some(p) = world.player_mut(payer) {
        p.refund(&basis, percent);
    }
    upgrade.progress = 0;
    tracing::debug!(unit = %unit, percent, "upgrade cancelled");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::ResourceKind;
    use crate::fixtures::sandbox;
    use crate::math::TilePos;
    use crate::order::{Order, OrderKind};

    #[test]
    fn test_train_spawns_next_to_building() {
        let (mut world, mut ctx, types) = sandbox();
        let hall = world
            .spawn_unit(&mut ctx, types.hall, 0, TilePos::new(4, 4), 0)
            .unwrap();
        let mut order = Order::train(types.peasant, 0, Costs::gold(50));
        let ticks = world.catalog.unit_type(types.peasant).unwrap().build_time;
        for _ in 0..ticks {
            order.execute(hall, &mut world, &mut ctx).unwrap();
        }
        assert!(order.is_finished());
        assert_eq!(world.player(0).unwrap().count_of(types.peasant), 1);
        let events = ctx.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::TrainingComplete { building, .. } if *building == hall)));
    }

    #[test]
    fn test_rally_order_cloned_onto_trained_unit() {
        let (mut world, mut ctx, types) = sandbox();
        let hall = world
            .spawn_unit(&mut ctx, types.hall, 0, TilePos::new(4, 4), 0)
            .unwrap();
        world
            .unit_mut(hall)
            .unwrap()
            .orders
            .set_pending(Order::move_to(TilePos::new(12, 12), 0));
        let mut order = Order::train(types.peasant, 0, Costs::gold(50));
        let ticks = world.catalog.unit_type(types.peasant).unwrap().build_time;
        for _ in 0..ticks {
            order.execute(hall, &mut world, &mut ctx).unwrap();
        }
        let trained = world
            .units
            .iter()
            .find(|u| u.type_id == types.peasant)
            .unwrap();
        assert_eq!(trained.current_action(), Action::Move);
        assert_eq!(trained.orders.active().head.goal_pos, TilePos::new(12, 12));
    }

    #[test]
    fn test_cancel_train_refunds_flat_percentage() {
        let (mut world, mut ctx, types) = sandbox();
        world.config.cancel_train_refund_percent = 75;
        let hall = world
            .spawn_unit(&mut ctx, types.hall, 0, TilePos::new(4, 4), 0)
            .unwrap();
        for steps in [0, 3] {
            world.player_mut(0).unwrap().resources = Costs::ZERO;
            let mut order = Order::train(types.peasant, 0, Costs::gold(400));
            for _ in 0..steps {
                order.execute(hall, &mut world, &mut ctx).unwrap();
            }
            order.cancel(hall, &mut world, &mut ctx);
            assert_eq!(world.player(0).unwrap().resources[ResourceKind::Gold], 300);
            let OrderKind::Train(state) = order.kind else {
                panic!("not a train order");
            };
            assert_eq!(state.progress, 0);
        }
    }

    #[test]
    fn test_refund_basis_current_cost_follows_growth() {
        let (mut world, mut ctx, types) = sandbox();
        world.config.refund_basis = RefundBasis::CurrentCost;
        world.catalog.unit_types[types.peasant.0 as usize].cost_growth_percent = 50;
        let hall = world
            .spawn_unit(&mut ctx, types.hall, 0, TilePos::new(4, 4), 0)
            .unwrap();
        let snapshot = world.catalog.unit_type(types.peasant).unwrap().costs;
        world
            .spawn_unit(&mut ctx, types.peasant, 0, TilePos::new(12, 12), 0)
            .unwrap();
        world.player_mut(0).unwrap().resources = Costs::ZERO;
        let mut order = Order::train(types.peasant, 0, snapshot);
        order.cancel(hall, &mut world, &mut ctx);
        let refunded = world.player(0).unwrap().resources[ResourceKind::Gold];
        assert_eq!(refunded, snapshot[ResourceKind::Gold] * 3 / 2);
    }

    #[test]
    fn test_research_shares_progress_and_cancel_clears_it() {
        let (mut world, mut ctx, types) = sandbox();
        let a = world
            .spawn_unit(&mut ctx, types.barracks, 0, TilePos::new(2, 2), 0)
            .unwrap();
        let b = world
            .spawn_unit(&mut ctx, types.barracks, 0, TilePos::new(8, 2), 0)
            .unwrap();
        let mut first = Order::research(types.sharp_swords, 0, Costs::gold(100));
        let mut second = Order::research(types.sharp_swords, 0, Costs::gold(100));
        first.execute(a, &mut world, &mut ctx).unwrap();
        second.execute(b, &mut world, &mut ctx).unwrap();
        assert_eq!(
            world.player(0).unwrap().research_progress.get(&types.sharp_swords),
            Some(&200)
        );
        first.cancel(a, &mut world, &mut ctx);
        assert!(world
            .player(0)
            .unwrap()
            .research_progress
            .get(&types.sharp_swords)
            .is_none());
    }

    #[test]
    fn test_research_applies_upgrade() {
        let (mut world, mut ctx, types) = sandbox();
        let barracks = world
            .spawn_unit(&mut ctx, types.barracks, 0, TilePos::new(2, 2), 0)
            .unwrap();
        let mut order = Order::research(types.sharp_swords, 0, Costs::gold(100));
        let ticks = world.catalog.upgrade(types.sharp_swords).unwrap().research_time;
        for _ in 0..ticks {
            order.execute(barracks, &mut world, &mut ctx).unwrap();
        }
        assert!(order.is_finished());
        let player = world.player(0).unwrap();
        assert!(player.upgrades.contains(&types.sharp_swords));
        assert!(player.damage_bonus > 0);
    }

    #[test]
    fn test_upgrade_to_converts_type() {
        let (mut world, mut ctx, types) = sandbox();
        let hall = world
            .spawn_unit(&mut ctx, types.hall, 0, TilePos::new(4, 4), 0)
            .unwrap();
        let mut order = Order::upgrade_to(types.keep, Costs::gold(500));
        let ticks = world.catalog.unit_type(types.keep).unwrap().build_time;
        for _ in 0..ticks {
            order.execute(hall, &mut world, &mut ctx).unwrap();
        }
        assert!(order.is_finished());
        assert_eq!(world.unit(hall).unwrap().type_id, types.keep);
        assert_eq!(world.player(0).unwrap().count_of(types.hall), 0);
    }

    #[test]
    fn test_transform_is_immediate() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.peasant, 0, TilePos::new(1, 1), 0)
            .unwrap();
        let mut order = Order::transform_into(types.footman);
        order.execute(me, &mut world, &mut ctx).unwrap();
        assert!(order.is_finished());
        assert_eq!(world.unit(me).unwrap().type_id, types.footman);
    }
}
