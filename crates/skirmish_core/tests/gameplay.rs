//! End-to-end scenarios driven through the command layer.

use skirmish_core::data::SpellId;
use skirmish_core::fixtures::{sandbox_simulation, TestTypes};
use skirmish_core::order::Order;
use skirmish_core::prelude::*;

fn spawn(sim: &mut Simulation, type_id: UnitTypeId, player: PlayerId, x: i32, y: i32) -> UnitHandle {
    let (world, ctx) = sim.parts_mut();
    world
        .spawn_unit(ctx, type_id, player, TilePos::new(x, y), 0)
        .unwrap()
}

fn gold(sim: &Simulation, player: PlayerId) -> i32 {
    sim.world().player(player).unwrap().resources[ResourceKind::Gold]
}

fn units_of_type(sim: &Simulation, type_id: UnitTypeId) -> Vec<UnitHandle> {
    sim.world()
        .units
        .iter()
        .filter(|u| u.type_id == type_id && !u.dying)
        .map(|u| u.handle)
        .collect()
}

#[test]
fn test_gather_scenario_exhausts_mine() {
    let (mut sim, types) = sandbox_simulation();
    spawn(&mut sim, types.hall, 0, 2, 2);
    let mine = spawn(&mut sim, types.mine, 0, 7, 2);
    sim.world_mut().unit_mut(mine).unwrap().resource_stock = 10;
    let worker = spawn(&mut sim, types.peasant, 0, 5, 3);

    sim.send_command(Command::order(
        worker,
        UnitCommand::ResourceAt {
            kind: ResourceKind::Gold,
            pos: TilePos::new(7, 2),
            layer: 0,
        },
    ))
    .unwrap();

    let mut exhausted = false;
    for _ in 0..400 {
        let events = sim.tick();
        exhausted |= events
            .events
            .iter()
            .any(|e| matches!(e, GameEvent::SourceExhausted { source } if *source == mine));
        if gold(&sim, 0) > 0 {
            break;
        }
    }
    assert!(exhausted);
    assert_eq!(gold(&sim, 0), 10);
    assert!(!sim.world().is_alive(mine));
    let w = sim.world().unit(worker).unwrap();
    assert_eq!(w.resources_held, 0);
    assert!(!w.removed);
}

#[test]
fn test_trained_units_follow_rally_order() {
    let (mut sim, types) = sandbox_simulation();
    sim.world_mut().player_mut(0).unwrap().resources = Costs::gold(500);
    let hall = spawn(&mut sim, types.hall, 0, 4, 4);
    let rally = TilePos::new(14, 14);

    sim.send_command(Command::order(hall, UnitCommand::Move { pos: rally, layer: 0 }))
        .unwrap();
    sim.send_command(Command::queued(
        hall,
        UnitCommand::Train {
            unit_type: types.peasant,
            payer: None,
        },
    ))
    .unwrap();
    assert_eq!(gold(&sim, 0), 450);

    sim.run_ticks(150);
    let trained = units_of_type(&sim, types.peasant);
    assert_eq!(trained.len(), 1);
    assert_eq!(sim.world().unit(trained[0]).unwrap().pos, rally);
    // the hall keeps its rally order
    assert_eq!(
        sim.world()
            .unit(hall)
            .unwrap()
            .orders
            .pending()
            .map(Order::action),
        Some(Action::Move)
    );
}

#[test]
fn test_pending_order_applied_after_construction() {
    let (mut sim, types) = sandbox_simulation();
    let recruit = spawn(&mut sim, types.footman, 0, 2, 2);
    {
        let u = sim.world_mut().unit_mut(recruit).unwrap();
        u.under_construction = true;
        u.hp = 1;
        u.orders.replace_active(Order::built(None, Costs::ZERO));
    }
    let dest = TilePos::new(9, 2);
    sim.send_command(Command::order(recruit, UnitCommand::Move { pos: dest, layer: 0 }))
        .unwrap();
    {
        let u = sim.world().unit(recruit).unwrap();
        assert_eq!(u.current_action(), Action::Built);
        assert_eq!(u.orders.pending().map(Order::action), Some(Action::Move));
    }

    sim.run_ticks(60);
    let u = sim.world().unit(recruit).unwrap();
    assert!(!u.under_construction);
    assert!(u.orders.pending().is_none());
    assert_eq!(u.pos, dest);
}

#[test]
fn test_builder_death_keeps_construction_going() {
    let (mut sim, types) = sandbox_simulation();
    sim.world_mut().player_mut(0).unwrap().resources = Costs::gold(1000);
    let worker = spawn(&mut sim, types.peasant, 0, 1, 1);
    sim.send_command(Command::order(
        worker,
        UnitCommand::Build {
            unit_type: types.farm,
            pos: TilePos::new(4, 4),
            layer: 0,
        },
    ))
    .unwrap();

    let mut site = None;
    for _ in 0..40 {
        sim.tick();
        site = units_of_type(&sim, types.farm).first().copied();
        if site.is_some() {
            break;
        }
    }
    let site = site.expect("construction started");
    assert!(sim.world().unit(site).unwrap().under_construction);
    assert_eq!(gold(&sim, 0), 920);

    {
        let (world, ctx) = sim.parts_mut();
        world.let_unit_die(worker, ctx);
    }
    let mut completed = false;
    for _ in 0..200 {
        let events = sim.tick();
        completed |= events
            .events
            .iter()
            .any(|e| matches!(e, GameEvent::ConstructionComplete { unit } if *unit == site));
    }
    assert!(completed);
    let farm = sim.world().unit(site).unwrap();
    assert!(!farm.under_construction);
    assert_eq!(farm.hp, sim.world().max_hp(site));
    assert!(!sim.world().units.contains(worker));
}

#[test]
fn test_fault_stays_with_the_faulting_unit() {
    let (mut sim, types) = sandbox_simulation();
    let mage = spawn(&mut sim, types.mage, 0, 1, 1);
    let footman = spawn(&mut sim, types.footman, 0, 1, 5);
    sim.world_mut()
        .unit_mut(mage)
        .unwrap()
        .orders
        .replace_active(Order::spell_cast(SpellId(99), None, TilePos::new(3, 3), 0, 4));
    sim.send_command(Command::order(
        footman,
        UnitCommand::Move {
            pos: TilePos::new(6, 5),
            layer: 0,
        },
    ))
    .unwrap();

    let events = sim.tick();
    assert!(events.events.iter().any(|e| matches!(
        e,
        GameEvent::OrderFault { unit, .. } if *unit == mage
    )));
    sim.run_ticks(20);
    assert_eq!(sim.world().unit(footman).unwrap().pos, TilePos::new(6, 5));
    assert_eq!(sim.world().unit(mage).unwrap().current_action(), Action::Still);
}

#[test]
fn test_order_save_load_survives_corrupt_line() {
    let (mut sim, types) = sandbox_simulation();
    let footman = spawn(&mut sim, types.footman, 0, 2, 2);
    let other = spawn(&mut sim, types.footman, 0, 2, 6);
    sim.send_command(Command::order(
        footman,
        UnitCommand::Patrol {
            pos: TilePos::new(10, 2),
            layer: 0,
        },
    ))
    .unwrap();
    sim.send_command(Command::order(
        other,
        UnitCommand::Move {
            pos: TilePos::new(20, 6),
            layer: 0,
        },
    ))
    .unwrap();
    sim.send_command(Command::queued(other, UnitCommand::StandGround))
        .unwrap();
    sim.tick();

    let saved = sim.save_orders().unwrap();
    let mut lines: Vec<&str> = saved.lines().collect();
    lines.insert(1, "(unit: (slot: 0, generation: 0), slot: Queue(9), order: [broken");
    let damaged = lines.join("\n");

    sim.send_command(Command::order(footman, UnitCommand::Stop))
        .unwrap();
    sim.send_command(Command::order(other, UnitCommand::Stop))
        .unwrap();

    let report = sim.load_orders(&damaged);
    assert_eq!(report.corrupt, 1);
    assert_eq!(report.replaced, 0);
    let world = sim.world();
    assert_eq!(world.unit(footman).unwrap().current_action(), Action::Patrol);
    let orders = &world.unit(other).unwrap().orders;
    assert_eq!(orders.len(), 2);
    assert_eq!(orders.active().action(), Action::Move);
    assert_eq!(orders.get(1).map(Order::action), Some(Action::StandGround));
}

#[test]
fn test_identical_command_streams_stay_in_sync() {
    fn play() -> (u32, u64) {
        let (mut sim, types): (Simulation, TestTypes) = sandbox_simulation();
        sim.world_mut().player_mut(0).unwrap().resources = Costs::gold(800);
        let hall = spawn(&mut sim, types.hall, 0, 2, 2);
        let mine = spawn(&mut sim, types.mine, 0, 9, 2);
        let workers: Vec<_> = (0..3).map(|i| spawn(&mut sim, types.peasant, 0, 6, 6 + i)).collect();
        let blue = spawn(&mut sim, types.footman, 0, 4, 20);
        let red = spawn(&mut sim, types.footman, 1, 12, 20);
        for &w in &workers {
            sim.send_command(Command::order(w, UnitCommand::Resource { source: mine }))
                .unwrap();
        }
        sim.send_command(Command::order(
            hall,
            UnitCommand::Train {
                unit_type: types.peasant,
                payer: None,
            },
        ))
        .unwrap();
        for tick in 0..300u64 {
            if tick == 30 {
                sim.send_command(Command::order(
                    blue,
                    UnitCommand::Attack {
                        target: Some(red),
                        pos: TilePos::new(12, 20),
                        layer: 0,
                    },
                ))
                .unwrap();
            }
            sim.tick();
        }
        (sim.sync_hash(), sim.state_hash())
    }
    assert_eq!(play(), play());
}

#[test]
fn test_repeated_stop_leaves_same_queue() {
    let (mut sim, types) = sandbox_simulation();
    let footman = spawn(&mut sim, types.footman, 0, 2, 2);
    for x in 4..7 {
        sim.send_command(Command::queued(
            footman,
            UnitCommand::Move {
                pos: TilePos::new(x, 2),
                layer: 0,
            },
        ))
        .unwrap();
    }
    sim.tick();
    assert_eq!(sim.world().unit(footman).unwrap().current_action(), Action::Move);

    sim.send_command(Command::order(footman, UnitCommand::Stop))
        .unwrap();
    let once = sim.world().unit(footman).unwrap().orders.clone();
    sim.send_command(Command::order(footman, UnitCommand::Stop))
        .unwrap();
    assert_eq!(sim.world().unit(footman).unwrap().orders, once);
    assert_eq!(once.len(), 2);

    sim.tick();
    let orders = &sim.world().unit(footman).unwrap().orders;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders.active().action(), Action::Still);
}
