//! The per-tick order scheduler.
//!
//! Units are processed in slot order from a snapshot taken at the start of
//! the tick; units spawned during the tick first act on the next one. For
//! each unit:
//!
//! 1. periodic handlers due this tick,
//! 2. animation and stun countdowns,
//! 3. the one-shot critical order, which runs even while stunned,
//! 4. the stun and wait gates,
//! 5. queue advancement, skipped during uninterruptible animations,
//! 6. the active order.
//!
//! A fault raised by an order is confined to its unit: it is logged,
//! reported as an event, and the order is marked finished.

use crate::clock::Cadence;
use crate::context::SimContext;
use crate::error::OrderFault;
use crate::events::GameEvent;
use crate::handlers;
use crate::order::{Action, Order, OrderStatus};
use crate::unit::UnitHandle;
use crate::world::World;

/// Advance the world by one tick.
pub fn run_tick(world: &mut World, ctx: &mut SimContext) {
    world.recount_refs();
    let due: Vec<Cadence> = ctx.clock.due().collect();
    for unit in world.units.handles() {
        if !world.units.contains(unit) {
            continue;
        }
        handle_unit(world, ctx, unit, &due);
        fold_unit_checksum(world, ctx, unit);
    }
    ctx.sync_hash = ctx.sync_hash.rotate_left(5) ^ ctx.seed();

    #[cfg(feature = "debug-validation")]
    for problem in validate(world) {
        tracing::error!(tick = ctx.tick(), %problem, "world invariant violated");
    }

    ctx.clock.advance();
}

fn handle_unit(world: &mut World, ctx: &mut SimContext, unit: UnitHandle, due: &[Cadence]) {
    handlers::run_due(world, ctx, unit, due);

    let Some(u) = world.unit_mut(unit) else {
        return;
    };
    let stunned = u.is_stunned();
    let unbreakable = u.is_unbreakable();
    u.stun_ticks = u.stun_ticks.saturating_sub(1);
    u.anim_ticks = u.anim_ticks.saturating_sub(1);

    if let Some(critical) = u.orders.take_critical() {
        run_critical(world, ctx, unit, critical);
    }

    let Some(u) = world.unit_mut(unit) else {
        return;
    };
    if stunned {
        return;
    }
    if u.wait > 0 {
        u.wait -= 1;
        return;
    }
    if !unbreakable {
        advance_queue(world, ctx, unit);
    }
    execute_active(world, ctx, unit);
}

/// Run a critical order once; whatever it asks for next is ignored.
fn run_critical(world: &mut World, ctx: &mut SimContext, unit: UnitHandle, mut order: Order) {
    if let Err(fault) = order.execute(unit, world, ctx) {
        report_fault(world, ctx, unit, &fault);
    }
}

/// Drop the finished or idle active order when something else is queued.
fn advance_queue(world: &mut World, ctx: &mut SimContext, unit: UnitHandle) {
    let Some(u) = world.unit_mut(unit) else {
        return;
    };
    let active = *u.orders.active();
    let idle = matches!(active.action(), Action::Still | Action::StandGround);
    if u.orders.len() == 1 {
        if active.is_finished() && active.action() != Action::Still {
            u.orders.replace_active(Order::still());
        }
        return;
    }
    if active.is_finished() || idle {
        if let Some(mut done) = u.orders.pop_active() {
            u.wait = 0;
            tracing::trace!(unit = %unit, action = %done.action(), "order advanced");
            done.cancel(unit, world, ctx);
        }
    }
}

fn execute_active(world: &mut World, ctx: &mut SimContext, unit: UnitHandle) {
    let Some(u) = world.unit_mut(unit) else {
        return;
    };
    let mut order = u.orders.detach_active();
    let result = order.execute(unit, world, ctx);

    // the unit may have been released or reset while its order ran
    let stale = match world.unit_mut(unit) {
        Some(u) => u.orders.reattach_active(order),
        None => Some(order),
    };
    if let Some(mut stale) = stale {
        stale.cancel(unit, world, ctx);
        if let Err(fault) = result {
            report_fault(world, ctx, unit, &fault);
        }
        return;
    }

    match result {
        Ok(OrderStatus::Continue | OrderStatus::Died | OrderStatus::Removed) => {}
        Ok(OrderStatus::Replace(next)) => {
            if let Some(u) = world.unit_mut(unit).filter(|u| !u.dying) {
                let mut old = u.orders.replace_active(next);
                old.cancel(unit, world, ctx);
            }
        }
        Ok(OrderStatus::Interrupt(next)) => interrupt(world, ctx, unit, next),
        Err(fault) => {
            if let Some(u) = world.unit_mut(unit) {
                u.orders.active_mut().finish();
            }
            report_fault(world, ctx, unit, &fault);
        }
    }
}

/// Put `next` in front, keeping the interrupted order to resume later.
fn interrupt(world: &mut World, ctx: &mut SimContext, unit: UnitHandle, next: Order) {
    let catalog = &world.catalog;
    let Some(u) = world.units.get_mut(unit).filter(|u| !u.dying) else {
        return;
    };
    let old = *u.orders.active();
    let keep = u.orders.saved().is_none() && !old.is_finished() && old.is_valid(catalog);
    let mut old = u.orders.replace_active(next);
    if keep {
        u.orders.set_saved(old);
    } else {
        old.cancel(unit, world, ctx);
    }
}

fn report_fault(world: &World, ctx: &mut SimContext, unit: UnitHandle, fault: &OrderFault) {
    let unit_type = world.type_ident(unit);
    let action = fault_action(fault);
    tracing::error!(
        tick = ctx.tick(),
        unit = %unit,
        unit_type = %unit_type,
        %action,
        %fault,
        "order fault"
    );
    ctx.emit(GameEvent::OrderFault {
        unit,
        unit_type,
        action,
        message: fault.to_string(),
    });
}

const fn fault_action(fault: &OrderFault) -> Action {
    match fault {
        OrderFault::MissingCatalogEntry { action, .. }
        | OrderFault::UnitVanished { action, .. }
        | OrderFault::ImpossibleState { action, .. } => *action,
    }
}

fn fold_unit_checksum(world: &World, ctx: &mut SimContext, unit: UnitHandle) {
    let Some(u) = world.unit(unit) else {
        return;
    };
    ctx.sync_hash = ctx.sync_hash.rotate_left(5)
        ^ (u.current_action().code() << 18)
        ^ (u.refs << 20)
        ^ (u.rng_draws << 8);
}

/// Structural problems in the world, one line each.
#[must_use]
pub fn validate(world: &World) -> Vec<String> {
    let mut problems = Vec::new();
    for u in world.units.iter() {
        if u.orders.is_empty() {
            problems.push(format!("{} has an empty order queue", u.handle));
        }
        if u.orders.is_detached() {
            problems.push(format!("{} left its active order detached", u.handle));
        }
        if let Some(c) = u.container {
            let listed = world.unit(c).is_some_and(|outer| outer.contents.contains(&u.handle));
            if !listed {
                problems.push(format!("{} claims container {c} which does not list it", u.handle));
            }
        }
        for inner in &u.contents {
            if world.unit(*inner).and_then(|i| i.container) != Some(u.handle) {
                problems.push(format!("{} lists {inner} which is elsewhere", u.handle));
            }
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SpellId;
    use crate::fixtures::sandbox;
    use crate::math::TilePos;

    fn bad_order() -> Order {
        Order::spell_cast(SpellId(99), None, TilePos::new(1, 1), 0, 1)
    }

    #[test]
    fn test_queue_never_empty() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        world
            .unit_mut(me)
            .unwrap()
            .orders
            .replace_active(Order::move_to(TilePos::new(3, 1), 0));
        for _ in 0..30 {
            run_tick(&mut world, &mut ctx);
            assert!(world.unit(me).unwrap().orders.len() >= 1);
        }
        let u = world.unit(me).unwrap();
        assert_eq!(u.pos, TilePos::new(3, 1));
        assert_eq!(u.current_action(), Action::Still);
    }

    #[test]
    fn test_idle_order_yields_to_queued() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        world
            .unit_mut(me)
            .unwrap()
            .orders
            .push(Order::move_to(TilePos::new(6, 1), 0));
        run_tick(&mut world, &mut ctx);
        let orders = &world.unit(me).unwrap().orders;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders.active().action(), Action::Move);
    }

    #[test]
    fn test_wait_gate_delays_execution() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        {
            let u = world.unit_mut(me).unwrap();
            u.wait = 2;
            u.orders.push(Order::move_to(TilePos::new(6, 1), 0));
        }
        run_tick(&mut world, &mut ctx);
        run_tick(&mut world, &mut ctx);
        assert_eq!(world.unit(me).unwrap().current_action(), Action::Still);
        run_tick(&mut world, &mut ctx);
        assert_eq!(world.unit(me).unwrap().current_action(), Action::Move);
    }

    #[test]
    fn test_stunned_unit_skips_orders() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        {
            let u = world.unit_mut(me).unwrap();
            u.stun_ticks = 3;
            u.orders.push(Order::move_to(TilePos::new(6, 1), 0));
        }
        for _ in 0..3 {
            run_tick(&mut world, &mut ctx);
        }
        let u = world.unit(me).unwrap();
        assert_eq!(u.pos, TilePos::new(1, 1));
        assert_eq!(u.orders.len(), 2);
        assert_eq!(u.stun_ticks, 0);
    }

    #[test]
    fn test_fault_isolated_to_unit() {
        let (mut world, mut ctx, types) = sandbox();
        let broken = world
            .spawn_unit(&mut ctx, types.mage, 0, TilePos::new(1, 1), 0)
            .unwrap();
        let walker = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 5), 0)
            .unwrap();
        world
            .unit_mut(broken)
            .unwrap()
            .orders
            .replace_active(bad_order());
        world
            .unit_mut(walker)
            .unwrap()
            .orders
            .replace_active(Order::move_to(TilePos::new(4, 5), 0));
        ctx.drain_events();
        run_tick(&mut world, &mut ctx);

        let events = ctx.drain_events();
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::OrderFault { unit, action: Action::SpellCast, .. } if *unit == broken
        )));
        assert!(world.unit(broken).unwrap().orders.active().is_finished());
        for _ in 0..10 {
            run_tick(&mut world, &mut ctx);
        }
        assert_eq!(world.unit(walker).unwrap().pos, TilePos::new(4, 5));
        assert_eq!(world.unit(broken).unwrap().current_action(), Action::Still);
    }

    #[test]
    fn test_critical_order_fault_leaves_queue_alone() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        {
            let orders = &mut world.unit_mut(me).unwrap().orders;
            orders.replace_active(Order::move_to(TilePos::new(5, 1), 0));
            orders.set_critical(bad_order());
        }
        run_tick(&mut world, &mut ctx);
        let u = world.unit(me).unwrap();
        assert!(u.orders.critical().is_none());
        assert_eq!(u.current_action(), Action::Move);
        assert!(!u.orders.active().is_finished());
    }

    #[test]
    fn test_critical_order_cleared_while_stunned() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        {
            let u = world.unit_mut(me).unwrap();
            u.stun_ticks = 2;
            u.orders.set_critical(Order::move_to(TilePos::new(5, 1), 0));
        }
        run_tick(&mut world, &mut ctx);
        let u = world.unit(me).unwrap();
        assert!(u.orders.critical().is_none());
        assert_eq!(u.pos, TilePos::new(1, 1));
        assert_eq!(u.stun_ticks, 1);
    }

    #[test]
    fn test_unfinished_critical_order_runs_once_before_active() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        {
            let orders = &mut world.unit_mut(me).unwrap().orders;
            orders.replace_active(Order::move_to(TilePos::new(1, 8), 0));
            orders.set_critical(Order::move_to(TilePos::new(8, 1), 0));
        }
        run_tick(&mut world, &mut ctx);

        let u = world.unit(me).unwrap();
        assert!(u.orders.critical().is_none());
        let active = u.orders.active();
        assert_eq!(active.action(), Action::Move);
        assert!(!active.is_finished());
        assert_eq!(active.head.goal_pos, TilePos::new(1, 8));
        // the active order planned last, over the critical order's route
        assert_eq!(u.path_request, Some(active.path_request(&world)));
    }

    #[test]
    fn test_critical_strike_gates_active_order() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        let enemy = world
            .spawn_unit(&mut ctx, types.footman, 1, TilePos::new(2, 1), 0)
            .unwrap();
        {
            let orders = &mut world.unit_mut(me).unwrap().orders;
            orders.replace_active(Order::move_to(TilePos::new(1, 8), 0));
            orders.set_critical(Order::attack(enemy, TilePos::new(2, 1), 0, 1, 0));
        }
        run_tick(&mut world, &mut ctx);

        assert!(world.unit(enemy).unwrap().hp < 60);
        let u = world.unit(me).unwrap();
        assert!(u.orders.critical().is_none());
        // the strike cooldown held the move back this tick
        assert_eq!(u.wait, 9);
        assert!(u.path.is_empty());
        assert_eq!(u.pos, TilePos::new(1, 1));
        assert_eq!(u.current_action(), Action::Move);
        assert!(!u.orders.active().is_finished());
    }

    #[test]
    fn test_finished_lone_still_is_kept_and_watches() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        crate::command::flush_orders(&mut world, &mut ctx, me);
        run_tick(&mut world, &mut ctx);
        {
            let orders = &world.unit(me).unwrap().orders;
            assert_eq!(orders.len(), 1);
            assert_eq!(orders.active().action(), Action::Still);
            assert!(orders.active().is_finished());
        }

        world
            .spawn_unit(&mut ctx, types.footman, 1, TilePos::new(4, 1), 0)
            .unwrap();
        run_tick(&mut world, &mut ctx);
        assert_eq!(world.unit(me).unwrap().current_action(), Action::Attack);
    }

    #[test]
    fn test_patrol_interrupted_then_restored() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        let enemy = world
            .spawn_unit(&mut ctx, types.skeleton, 1, TilePos::new(3, 1), 0)
            .unwrap();
        world
            .unit_mut(me)
            .unwrap()
            .orders
            .replace_active(Order::patrol(TilePos::new(1, 1), TilePos::new(1, 8), 0));
        run_tick(&mut world, &mut ctx);
        {
            let orders = &world.unit(me).unwrap().orders;
            assert_eq!(orders.active().action(), Action::Attack);
            assert_eq!(orders.saved().map(Order::action), Some(Action::Patrol));
        }
        for _ in 0..200 {
            run_tick(&mut world, &mut ctx);
            if world.unit(enemy).is_none() {
                break;
            }
        }
        assert!(!world.is_alive(enemy));
        for _ in 0..3 {
            run_tick(&mut world, &mut ctx);
        }
        let orders = &world.unit(me).unwrap().orders;
        assert!(orders.saved().is_none());
        assert_eq!(orders.active().action(), Action::Patrol);
    }

    #[test]
    fn test_checksum_depends_on_state() {
        let (mut a, mut ctx_a, types) = sandbox();
        let (mut b, mut ctx_b, _) = sandbox();
        a.spawn_unit(&mut ctx_a, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        b.spawn_unit(&mut ctx_b, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        run_tick(&mut a, &mut ctx_a);
        run_tick(&mut b, &mut ctx_b);
        assert_eq!(ctx_a.sync_hash, ctx_b.sync_hash);

        let extra = b
            .spawn_unit(&mut ctx_b, types.footman, 0, TilePos::new(5, 5), 0)
            .unwrap();
        b.unit_mut(extra)
            .unwrap()
            .orders
            .replace_active(Order::move_to(TilePos::new(9, 9), 0));
        run_tick(&mut a, &mut ctx_a);
        run_tick(&mut b, &mut ctx_b);
        assert_ne!(ctx_a.sync_hash, ctx_b.sync_hash);
        assert_eq!(ctx_a.tick(), 2);
    }

    #[test]
    fn test_validate_clean_world() {
        let (mut world, mut ctx, types) = sandbox();
        let post = world
            .spawn_unit(&mut ctx, types.outpost, 0, TilePos::new(4, 4), 0)
            .unwrap();
        let guard = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        world.enter_container(guard, post);
        run_tick(&mut world, &mut ctx);
        assert!(validate(&world).is_empty());
    }
}
