//! Periodic per-unit handlers and the table that schedules them.
//!
//! Cadence membership is data: [`CADENCE_TABLE`] lists every handler with
//! the cadence it runs on. The scheduler calls [`run_due`] for each unit
//! before its orders execute.

use crate::clock::Cadence;
use crate::context::SimContext;
use crate::events::GameEvent;
use crate::unit::UnitHandle;
use crate::world::World;

/// A periodic handler.
pub type Handler = fn(&mut World, &mut SimContext, UnitHandle);

/// Every periodic handler with its cadence, in dispatch order.
pub const CADENCE_TABLE: &[(Cadence, &str, Handler)] = &[
    (Cadence::EverySecond, "decay", decay),
    (Cadence::EverySecond, "regeneration", regenerate),
    (Cadence::EverySecond, "stock-replenish", replenish_stock),
    (Cadence::EveryFiveSeconds, "garrison-training", garrison_training),
    (Cadence::EveryMinute, "garrison-income", garrison_income),
];

/// Run every handler whose cadence is in `due`.
///
/// Stops early once the unit starts dying.
pub fn run_due(world: &mut World, ctx: &mut SimContext, unit: UnitHandle, due: &[Cadence]) {
    for (cadence, name, handler) in CADENCE_TABLE {
        if !due.contains(cadence) {
            continue;
        }
        if !world.is_alive(unit) {
            return;
        }
        tracing::trace!(unit = %unit, handler = name, "cadence handler");
        handler(world, ctx, unit);
    }
}

/// Summoned units lose hit points every second and die at zero.
pub fn decay(world: &mut World, ctx: &mut SimContext, unit: UnitHandle) {
    let rate = world.unit_type(unit).map_or(0, |d| d.decay_per_second);
    if rate <= 0 {
        return;
    }
    let Some(u) = world.unit_mut(unit) else {
        return;
    };
    u.hp -= rate;
    if u.hp <= 0 {
        tracing::debug!(unit = %unit, "decayed");
        world.let_unit_die(unit, ctx);
    }
}

/// Hit point and mana regeneration, capped at the type maximum.
pub fn regenerate(world: &mut World, _ctx: &mut SimContext, unit: UnitHandle) {
    let Some(def) = world.unit_type(unit) else {
        return;
    };
    let (hp_rate, max_hp) = (def.regeneration_per_second, def.hp);
    let (mana_rate, max_mana) = (def.mana_regeneration_per_second, def.max_mana);
    let Some(u) = world.unit_mut(unit) else {
        return;
    };
    if hp_rate > 0 && u.hp < max_hp && !u.under_construction {
        u.hp = (u.hp + hp_rate).min(max_hp);
    }
    if mana_rate > 0 && u.mana < max_mana {
        u.mana = (u.mana + mana_rate).min(max_mana);
    }
}

/// Sources that grow back refill their stock up to the type maximum.
pub fn replenish_stock(world: &mut World, _ctx: &mut SimContext, unit: UnitHandle) {
    let Some(def) = world.unit_type(unit) else {
        return;
    };
    let (rate, max) = (def.stock_replenish_per_second, def.max_stock);
    if rate <= 0 || max <= 0 {
        return;
    }
    if let Some(u) = world.unit_mut(unit) {
        u.resource_stock = (u.resource_stock + rate).min(max);
    }
}

/// Units garrisoned in a training building gain experience.
pub fn garrison_training(world: &mut World, _ctx: &mut SimContext, unit: UnitHandle) {
    let xp = world.unit_type(unit).map_or(0, |d| d.garrison_training_xp);
    if xp <= 0 {
        return;
    }
    let contents = world
        .unit(unit)
        .filter(|u| !u.under_construction)
        .map(|u| u.contents.clone())
        .unwrap_or_default();
    for inner in contents {
        if let Some(i) = world.unit_mut(inner) {
            i.xp += xp;
        }
    }
}

/// Garrison buildings pay their owner per occupant out of their stock.
///
/// A building whose stock runs out lets everyone out and is destroyed.
pub fn garrison_income(world: &mut World, ctx: &mut SimContext, unit: UnitHandle) {
    let Some(income) = world.unit_type(unit).and_then(|d| d.garrison_income) else {
        return;
    };
    let Some(u) = world.unit(unit) else {
        return;
    };
    if u.contents.is_empty() || u.under_construction {
        return;
    }
    let (player, stock) = (u.player, u.resource_stock);
    let occupants = i32::try_from(u.contents.len()).unwrap_or(i32::MAX);
    let amount = income.per_unit.saturating_mul(occupants).min(stock.max(0));
    if let Some(u) = world.unit_mut(unit) {
        u.resource_stock -= amount;
    }
    if amount > 0 {
        if let Some(p) = world.player_mut(player) {
            p.add_resource(income.resource, amount);
        }
        ctx.emit(GameEvent::ResourcesDelivered {
            unit,
            player,
            resource: income.resource,
            amount,
        });
    }
    if stock - amount > 0 {
        return;
    }
    tracing::info!(unit = %unit, player, "garrison stock exhausted");
    ctx.emit(GameEvent::SourceExhausted { source: unit });
    let stranded = world.drop_out_all(unit);
    if !stranded.is_empty() {
        tracing::debug!(unit = %unit, stranded = stranded.len(), "no room for every occupant");
    }
    world.let_unit_die(unit, ctx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::ResourceKind;
    use crate::fixtures::sandbox;
    use crate::math::TilePos;

    #[test]
    fn test_table_names_unique() {
        let mut names: Vec<_> = CADENCE_TABLE.iter().map(|(_, n, _)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CADENCE_TABLE.len());
    }

    #[test]
    fn test_decay_kills() {
        let (mut world, mut ctx, types) = sandbox();
        let skel = world
            .spawn_unit(&mut ctx, types.skeleton, 0, TilePos::new(3, 3), 0)
            .unwrap();
        decay(&mut world, &mut ctx, skel);
        assert_eq!(world.unit(skel).unwrap().hp, 5);
        decay(&mut world, &mut ctx, skel);
        assert!(!world.is_alive(skel));
    }

    #[test]
    fn test_only_due_handlers_run() {
        let (mut world, mut ctx, types) = sandbox();
        let skel = world
            .spawn_unit(&mut ctx, types.skeleton, 0, TilePos::new(3, 3), 0)
            .unwrap();
        run_due(&mut world, &mut ctx, skel, &[Cadence::EveryTick]);
        assert_eq!(world.unit(skel).unwrap().hp, 15);
        run_due(&mut world, &mut ctx, skel, &[Cadence::EveryTick, Cadence::EverySecond]);
        assert_eq!(world.unit(skel).unwrap().hp, 5);
    }

    #[test]
    fn test_mana_regenerates_up_to_max() {
        let (mut world, mut ctx, types) = sandbox();
        let mage = world
            .spawn_unit(&mut ctx, types.mage, 0, TilePos::new(3, 3), 0)
            .unwrap();
        world.unit_mut(mage).unwrap().mana = 99;
        regenerate(&mut world, &mut ctx, mage);
        regenerate(&mut world, &mut ctx, mage);
        assert_eq!(world.unit(mage).unwrap().mana, 100);
    }

    #[test]
    fn test_garrison_training_grants_xp() {
        let (mut world, mut ctx, types) = sandbox();
        let post = world
            .spawn_unit(&mut ctx, types.outpost, 0, TilePos::new(4, 4), 0)
            .unwrap();
        let guard = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        world.enter_container(guard, post);
        garrison_training(&mut world, &mut ctx, post);
        assert_eq!(world.unit(guard).unwrap().xp, 2);
    }

    #[test]
    fn test_garrison_income_exhausts_and_releases() {
        let (mut world, mut ctx, types) = sandbox();
        let post = world
            .spawn_unit(&mut ctx, types.outpost, 0, TilePos::new(4, 4), 0)
            .unwrap();
        let guard = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        world.enter_container(guard, post);

        garrison_income(&mut world, &mut ctx, post);
        assert_eq!(world.player(0).unwrap().resources[ResourceKind::Gold], 5);
        assert!(world.is_alive(post));

        garrison_income(&mut world, &mut ctx, post);
        assert_eq!(world.player(0).unwrap().resources[ResourceKind::Gold], 10);
        assert!(!world.is_alive(post));
        let guard_unit = world.unit(guard).unwrap();
        assert!(!guard_unit.removed);
        assert!(!guard_unit.dying);
        assert!(ctx
            .drain_events()
            .iter()
            .any(|e| matches!(e, GameEvent::SourceExhausted { source } if *source == post)));
    }

    #[test]
    fn test_empty_garrison_pays_nothing() {
        let (mut world, mut ctx, types) = sandbox();
        let post = world
            .spawn_unit(&mut ctx, types.outpost, 0, TilePos::new(4, 4), 0)
            .unwrap();
        garrison_income(&mut world, &mut ctx, post);
        assert_eq!(world.unit(post).unwrap().resource_stock, 10);
        assert!(world.is_alive(post));
    }
}
