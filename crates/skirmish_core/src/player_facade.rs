//! One interface for every kind of player.
//!
//! Human input, the AI and network peers all act through [`PlayerFacade`].
//! The facade checks that the issuing player owns the unit before the
//! command reaches the command layer, and only reports enemy units the
//! player can currently see. Neutral buildings are the exception: any
//! player may train or research there at their own expense.

use crate::command::{Command, UnitCommand};
use crate::economy::Costs;
use crate::error::CommandError;
use crate::map::LayerId;
use crate::math::TilePos;
use crate::order::Action;
use crate::player::{Diplomacy, PlayerId};
use crate::simulation::Simulation;
use crate::unit::UnitHandle;

/// Sight radius in tiles for units without a reaction range.
pub const DEFAULT_SIGHT: u32 = 4;

/// Sight is this many times the reaction range.
pub const SIGHT_MULTIPLIER: u32 = 2;

/// What a player may learn about a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    /// The unit.
    pub handle: UnitHandle,
    /// Type ident.
    pub unit_type: String,
    /// Owner.
    pub player: PlayerId,
    /// Top-left tile.
    pub pos: TilePos,
    /// Layer.
    pub layer: LayerId,
    /// Hit points.
    pub hp: i32,
    /// Maximum hit points.
    pub max_hp: i32,
    /// What the unit is doing.
    pub action: Action,
    /// Orders queued, active one included.
    pub queued: usize,
}

/// Actions and queries available to a player.
///
/// Every unit order goes through [`issue_command`](Self::issue_command);
/// there is no side door, so everything a player does ends up in the
/// command log.
pub trait PlayerFacade {
    /// Issue a command to one of the player's units.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotOwner`] for foreign units other than neutral
    /// producers, otherwise whatever the command layer rejects.
    fn issue_command(
        &mut self,
        unit: UnitHandle,
        order: UnitCommand,
        flush: bool,
    ) -> Result<(), CommandError>;

    /// Issue the same command to several units, stopping at the first
    /// rejection.
    ///
    /// # Errors
    ///
    /// The first rejection.
    fn issue_commands(
        &mut self,
        units: &[UnitHandle],
        order: UnitCommand,
        flush: bool,
    ) -> Result<(), CommandError> {
        for &unit in units {
            self.issue_command(unit, order, flush)?;
        }
        Ok(())
    }

    /// Change the stance towards another player.
    ///
    /// # Errors
    ///
    /// [`CommandError::UnknownPlayer`] for an unknown or identical player.
    fn set_diplomacy(&mut self, other: PlayerId, stance: Diplomacy) -> Result<(), CommandError>;

    /// Handles of every live unit the player owns.
    fn own_units(&self) -> Vec<UnitHandle>;

    /// Hostile units the player can see.
    fn enemy_units(&self) -> Vec<UnitInfo>;

    /// Details of a unit, if the player owns or sees it.
    fn query_unit(&self, unit: UnitHandle) -> Option<UnitInfo>;

    /// The player's stockpile.
    fn resources(&self) -> Costs;

    /// The player this facade acts for.
    fn player_id(&self) -> PlayerId;
}

impl Simulation {
    /// Whether any unit of `viewer`, or of a player sharing vision with
    /// `viewer`, has `target` within sight.
    #[must_use]
    pub fn is_visible_to(&self, viewer: PlayerId, target: UnitHandle) -> bool {
        let world = self.world();
        let Some(t) = world.unit(target) else {
            return false;
        };
        if t.removed {
            return false;
        }
        if t.player == viewer {
            return true;
        }
        let Some(target_fp) = world.footprint(target) else {
            return false;
        };
        let sees = |owner: PlayerId| {
            owner == viewer
                || world
                    .player(owner)
                    .is_some_and(|p| p.shared_vision.contains(&viewer))
        };
        world.units.iter().any(|u| {
            if u.removed || u.dying || u.layer != t.layer || !sees(u.player) {
                return false;
            }
            let sight = world
                .unit_type(u.handle)
                .map(|d| d.react_range * SIGHT_MULTIPLIER)
                .filter(|&s| s > 0)
                .unwrap_or(DEFAULT_SIGHT);
            world
                .footprint(u.handle)
                .is_some_and(|fp| fp.distance_to(target_fp) <= sight)
        })
    }

    /// Handles of a player's live units in slot order.
    #[must_use]
    pub fn units_of(&self, player: PlayerId) -> Vec<UnitHandle> {
        self.world()
            .units
            .iter()
            .filter(|u| u.player == player && !u.dying)
            .map(|u| u.handle)
            .collect()
    }

    fn unit_info(&self, unit: UnitHandle) -> Option<UnitInfo> {
        let world = self.world();
        let u = world.unit(unit)?;
        Some(UnitInfo {
            handle: unit,
            unit_type: world.type_ident(unit),
            player: u.player,
            pos: u.pos,
            layer: u.layer,
            hp: u.hp,
            max_hp: world.max_hp(unit),
            action: u.current_action(),
            queued: u.orders.len(),
        })
    }
}

/// Make `player` the payer of a production command. False for any other
/// command.
fn pay_for(order: &mut UnitCommand, player: PlayerId) -> bool {
    match order {
        UnitCommand::Train { payer, .. } | UnitCommand::Research { payer, .. } => {
            *payer = Some(player);
            true
        }
        _ => false,
    }
}

/// [`PlayerFacade`] over a simulation, for one player.
pub struct SimulationPlayerFacade<'a> {
    sim: &'a mut Simulation,
    player: PlayerId,
}

impl<'a> SimulationPlayerFacade<'a> {
    /// Facade acting for `player`.
    pub fn new(sim: &'a mut Simulation, player: PlayerId) -> Self {
        Self { sim, player }
    }

    /// The simulation behind the facade.
    pub fn simulation(&self) -> &Simulation {
        self.sim
    }
}

impl PlayerFacade for SimulationPlayerFacade<'_> {
    fn issue_command(
        &mut self,
        unit: UnitHandle,
        order: UnitCommand,
        flush: bool,
    ) -> Result<(), CommandError> {
        let mut order = order;
        let owner = self.sim.world().unit(unit).map(|u| u.player);
        if let Some(owner) = owner.filter(|&o| o != self.player) {
            let neutral = self.sim.world().player(owner).is_some_and(|p| p.neutral);
            if !(neutral && pay_for(&mut order, self.player)) {
                let reason = CommandError::NotOwner {
                    issuer: self.player,
                    unit,
                };
                self.sim
                    .reject_command(&Command::Unit { unit, flush, order }, &reason);
                return Err(reason);
            }
        }
        self.sim.send_command(Command::Unit { unit, flush, order })
    }

    fn set_diplomacy(&mut self, other: PlayerId, stance: Diplomacy) -> Result<(), CommandError> {
        self.sim.send_command(Command::Diplomacy {
            player: self.player,
            other,
            stance,
        })
    }

    fn own_units(&self) -> Vec<UnitHandle> {
        self.sim.units_of(self.player)
    }

    fn enemy_units(&self) -> Vec<UnitInfo> {
        let world = self.sim.world();
        world
            .units
            .iter()
            .filter(|u| !u.dying && world.players.hostile(self.player, u.player))
            .filter(|u| self.sim.is_visible_to(self.player, u.handle))
            .filter_map(|u| self.sim.unit_info(u.handle))
            .collect()
    }

    fn query_unit(&self, unit: UnitHandle) -> Option<UnitInfo> {
        if !self.sim.is_visible_to(self.player, unit) {
            let own = self.sim.world().unit(unit)?.player == self.player;
            if !own {
                return None;
            }
        }
        self.sim.unit_info(unit)
    }

    fn resources(&self) -> Costs {
        self.sim
            .world()
            .player(self.player)
            .map(|p| p.resources)
            .unwrap_or_default()
    }

    fn player_id(&self) -> PlayerId {
        self.player
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::GameEvent;
    use crate::fixtures::{sandbox_simulation, TestTypes};

    fn armies() -> (Simulation, TestTypes, UnitHandle, UnitHandle, UnitHandle) {
        let (mut sim, types) = sandbox_simulation();
        let (world, ctx) = sim.parts_mut();
        let own = world
            .spawn_unit(ctx, types.footman, 0, TilePos::new(2, 2), 0)
            .unwrap();
        let near = world
            .spawn_unit(ctx, types.footman, 1, TilePos::new(8, 2), 0)
            .unwrap();
        let far = world
            .spawn_unit(ctx, types.footman, 1, TilePos::new(28, 28), 0)
            .unwrap();
        (sim, types, own, near, far)
    }

    #[test]
    fn test_only_visible_enemies_reported() {
        let (mut sim, _, _, near, _) = armies();
        let facade = SimulationPlayerFacade::new(&mut sim, 0);
        let enemies = facade.enemy_units();
        assert_eq!(enemies.len(), 1);
        assert_eq!(enemies[0].handle, near);
    }

    #[test]
    fn test_shared_vision_reveals() {
        let (mut sim, types, _, _, far) = armies();
        {
            let (world, ctx) = sim.parts_mut();
            world
                .spawn_unit(ctx, types.footman, 2, TilePos::new(26, 28), 0)
                .unwrap();
            world.player_mut(2).unwrap().shared_vision.insert(0);
        }
        assert!(sim.is_visible_to(0, far));
    }

    #[test]
    fn test_cannot_command_foreign_units() {
        let (mut sim, _, own, near, _) = armies();
        let mut facade = SimulationPlayerFacade::new(&mut sim, 0);
        assert_eq!(
            facade.issue_command(near, UnitCommand::Stop, true),
            Err(CommandError::NotOwner {
                issuer: 0,
                unit: near
            })
        );
        assert!(facade.issue_command(own, UnitCommand::Stop, true).is_ok());
        assert_eq!(facade.simulation().log().len(), 1);

        let events = sim.tick().events;
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::CommandRejected { unit: Some(u), command, .. } if *u == near && command == "stop"
        )));
    }

    #[test]
    fn test_research_at_neutral_building_for_issuer() {
        let (mut sim, types) = sandbox_simulation();
        let barracks = {
            let (world, ctx) = sim.parts_mut();
            world.player_mut(1).unwrap().resources = Costs::gold(250);
            world
                .spawn_unit(ctx, types.barracks, 2, TilePos::new(10, 10), 0)
                .unwrap()
        };
        let neutral_funds = sim.world().player(2).unwrap().resources;

        let mut facade = SimulationPlayerFacade::new(&mut sim, 1);
        let research = UnitCommand::Research {
            upgrade: types.sharp_swords,
            payer: None,
        };
        facade.issue_command(barracks, research, false).unwrap();
        assert_eq!(facade.resources(), Costs::gold(150));
        assert_eq!(facade.simulation().log().records()[0].number, Some(1));
        assert!(matches!(
            facade.issue_command(barracks, UnitCommand::Stop, true),
            Err(CommandError::NotOwner { issuer: 1, .. })
        ));

        sim.run_ticks(40);
        let world = sim.world();
        assert!(world.player(1).unwrap().upgrades.contains(&types.sharp_swords));
        assert!(!world.player(2).unwrap().upgrades.contains(&types.sharp_swords));
        assert_eq!(world.player(2).unwrap().resources, neutral_funds);
    }

    #[test]
    fn test_group_orders_and_queries() {
        let (mut sim, types, own, _, far) = armies();
        let second = {
            let (world, ctx) = sim.parts_mut();
            world
                .spawn_unit(ctx, types.footman, 0, TilePos::new(3, 4), 0)
                .unwrap()
        };
        let mut facade = SimulationPlayerFacade::new(&mut sim, 0);
        assert_eq!(facade.own_units(), vec![own, second]);
        facade
            .issue_commands(
                &[own, second],
                UnitCommand::Move {
                    pos: TilePos::new(5, 10),
                    layer: 0,
                },
                true,
            )
            .unwrap();
        let info = facade.query_unit(own).unwrap();
        assert_eq!(info.unit_type, "unit-footman");
        assert!(facade.query_unit(far).is_none());
        assert_eq!(facade.player_id(), 0);
    }
}
