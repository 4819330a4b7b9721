//! Ready-made sandbox scenarios.
//!
//! Each builder returns a [`Simulation`] with orders already issued, so a
//! test only has to tick it.

use rand::Rng;
use skirmish_core::fixtures::{sandbox_simulation, TestTypes, SANDBOX_SIZE};
use skirmish_core::math::SyncRng;
use skirmish_core::prelude::*;

/// Units placed by a scenario builder.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    /// Gatherers owned by player 0.
    pub workers: Vec<UnitHandle>,
    /// Footmen owned by player 0.
    pub blue: Vec<UnitHandle>,
    /// Footmen owned by player 1.
    pub red: Vec<UnitHandle>,
    /// Every depot, mine and other building.
    pub buildings: Vec<UnitHandle>,
}

impl Roster {
    /// All mobile units, blue before red.
    pub fn mobile(&self) -> impl Iterator<Item = UnitHandle> + '_ {
        self.workers
            .iter()
            .chain(&self.blue)
            .chain(&self.red)
            .copied()
    }
}

fn place(
    sim: &mut Simulation,
    type_id: UnitTypeId,
    player: PlayerId,
    pos: TilePos,
) -> Option<UnitHandle> {
    let (world, ctx) = sim.parts_mut();
    match world.spawn_unit(ctx, type_id, player, pos, 0) {
        Ok(unit) => Some(unit),
        Err(e) => {
            tracing::debug!(?pos, error = %e, "scenario spawn skipped");
            None
        }
    }
}

/// A hall, a mine and `workers` peasants gathering gold.
#[must_use]
pub fn economy(workers: usize) -> (Simulation, TestTypes, Roster) {
    let (mut sim, types) = sandbox_simulation();
    let mut roster = Roster::default();
    roster.buildings.extend(place(&mut sim, types.hall, 0, TilePos::new(2, 2)));
    let mine = place(&mut sim, types.mine, 0, TilePos::new(12, 2));
    roster.buildings.extend(mine);

    let mut next = 0;
    for y in 7..SANDBOX_SIZE as i32 {
        for x in 2..12 {
            if next == workers {
                break;
            }
            if let Some(w) = place(&mut sim, types.peasant, 0, TilePos::new(x, y)) {
                roster.workers.push(w);
                next += 1;
            }
        }
    }
    if let Some(mine) = mine {
        for &w in &roster.workers {
            let _ = sim.send_command(Command::order(w, UnitCommand::Resource { source: mine }));
        }
    }
    (sim, types, roster)
}

/// Two squads of `per_side` footmen ordered to attack each other.
#[must_use]
pub fn battle(per_side: usize) -> (Simulation, TestTypes, Roster) {
    let (mut sim, types) = sandbox_simulation();
    let mut roster = Roster::default();
    for i in 0..per_side.min(SANDBOX_SIZE as usize - 4) {
        let x = 2 + i as i32;
        roster.blue.extend(place(&mut sim, types.footman, 0, TilePos::new(x, 8)));
        roster.red.extend(place(&mut sim, types.footman, 1, TilePos::new(x, 22)));
    }
    for (&blue, &red) in roster.blue.iter().zip(&roster.red) {
        for (unit, target, y) in [(blue, red, 22), (red, blue, 8)] {
            let pos = sim
                .world()
                .unit(target)
                .map_or(TilePos::new(2, y), |u| u.pos);
            let _ = sim.send_command(Command::order(
                unit,
                UnitCommand::Attack {
                    target: Some(target),
                    pos,
                    layer: 0,
                },
            ));
        }
    }
    (sim, types, roster)
}

/// Footmen of both enemy players scattered over layer 0 from `seed`.
///
/// The same seed always gives the same layout.
#[must_use]
pub fn scattered(seed: u32, per_side: usize) -> (Simulation, TestTypes, Roster) {
    let (mut sim, types) = sandbox_simulation();
    let mut rng = SyncRng::new(seed);
    let mut roster = Roster::default();
    let edge = SANDBOX_SIZE as i32 - 1;
    for _ in 0..per_side {
        for player in [0, 1] {
            let pos = TilePos::new(rng.gen_range(0..=edge), rng.gen_range(0..=edge));
            if let Some(unit) = place(&mut sim, types.footman, player, pos) {
                if player == 0 {
                    roster.blue.push(unit);
                } else {
                    roster.red.push(unit);
                }
            }
        }
    }
    (sim, types, roster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_economy_places_requested_workers() {
        let (mut sim, types, roster) = economy(5);
        assert_eq!(roster.workers.len(), 5);
        sim.tick();
        assert_eq!(roster.buildings.len(), 2);
        for &w in &roster.workers {
            let unit = sim.world().unit(w).unwrap();
            assert_eq!(unit.type_id, types.peasant);
            assert_eq!(unit.current_action(), Action::Resource);
        }
    }

    #[test]
    fn test_battle_orders_both_sides() {
        let (mut sim, _, roster) = battle(4);
        assert_eq!(roster.blue.len(), 4);
        sim.tick();
        assert_eq!(roster.red.len(), 4);
        for unit in roster.mobile() {
            assert_eq!(
                sim.world().unit(unit).unwrap().current_action(),
                Action::Attack
            );
        }
    }

    #[test]
    fn test_scattered_layout_follows_seed() {
        let positions = |seed| {
            let (sim, _, roster) = scattered(seed, 6);
            roster
                .mobile()
                .map(|u| sim.world().unit(u).unwrap().pos)
                .collect::<Vec<_>>()
        };
        assert_eq!(positions(11), positions(11));
        assert!(!positions(11).is_empty());
    }
}
