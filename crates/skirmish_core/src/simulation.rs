//! The simulation: world, context and command log behind one handle.
//!
//! [`Simulation`] is the entry point the UI, AI, network and replay layers
//! share. Commands go through [`Simulation::send_command`], time advances
//! through [`Simulation::tick`]. Two simulations built from the same state
//! and fed the same commands on the same ticks stay identical, which the
//! sync checksum and [`Simulation::state_hash`] make checkable.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::command::{self, Command};
use crate::context::SimContext;
use crate::error::{CommandError, GameError, Result};
use crate::events::GameEvent;
use crate::persist::{self, LoadReport};
use crate::replay::{CommandLog, LogRecord};
use crate::scheduler;
use crate::unit::UnitHandle;
use crate::world::World;

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// The tick that was processed.
    pub tick: u64,
    /// Sync checksum after the tick.
    pub sync_hash: u32,
    /// Every event, in emission order (command rejections since the last
    /// tick come first).
    pub events: Vec<GameEvent>,
    /// Units that started dying.
    pub deaths: Vec<UnitHandle>,
    /// Units that entered the world.
    pub spawned: Vec<UnitHandle>,
}

/// The deterministic order execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    world: World,
    ctx: SimContext,
    /// Accepted commands; not part of the snapshot.
    #[serde(skip)]
    log: CommandLog,
}

impl Simulation {
    /// Simulation over `world` seeded with `seed`.
    #[must_use]
    pub fn new(world: World, seed: u32) -> Self {
        let ctx = SimContext::new(seed, world.config.ticks_per_second);
        Self::from_parts(world, ctx)
    }

    /// Simulation from an existing world and context.
    #[must_use]
    pub fn from_parts(world: World, ctx: SimContext) -> Self {
        Self {
            world,
            ctx,
            log: CommandLog::default(),
        }
    }

    /// The world.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// The world, mutably. Changes made here bypass the command layer and
    /// are not logged.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Clock, random stream and checksum.
    #[must_use]
    pub const fn context(&self) -> &SimContext {
        &self.ctx
    }

    /// World and context together, for driving world primitives directly.
    pub fn parts_mut(&mut self) -> (&mut World, &mut SimContext) {
        (&mut self.world, &mut self.ctx)
    }

    /// Next tick to be processed.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.ctx.tick()
    }

    /// Current seed of the synchronized random stream.
    #[must_use]
    pub const fn seed(&self) -> u32 {
        self.ctx.seed()
    }

    /// Rolling sync checksum.
    #[must_use]
    pub const fn sync_hash(&self) -> u32 {
        self.ctx.sync_hash
    }

    /// Commands accepted so far.
    #[must_use]
    pub const fn log(&self) -> &CommandLog {
        &self.log
    }

    /// Take the command log, leaving an empty one.
    pub fn take_log(&mut self) -> CommandLog {
        std::mem::take(&mut self.log)
    }

    /// Validate, record and dispatch a command.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason; rejected commands are not logged.
    pub fn send_command(&mut self, command: Command) -> std::result::Result<(), CommandError> {
        let record = LogRecord::from_command(self.ctx.tick(), &command, &self.world, self.ctx.seed());
        command::apply(&mut self.world, &mut self.ctx, &command)?;
        self.log.push(record);
        Ok(())
    }

    /// Report a command refused before it reached the command layer.
    pub fn reject_command(&mut self, command: &Command, reason: &CommandError) {
        command::reject(&mut self.ctx, command, reason);
    }

    /// Process one tick.
    pub fn tick(&mut self) -> TickEvents {
        let tick = self.ctx.tick();
        scheduler::run_tick(&mut self.world, &mut self.ctx);
        let events = self.ctx.drain_events();
        let mut out = TickEvents {
            tick,
            sync_hash: self.ctx.sync_hash,
            ..TickEvents::default()
        };
        for event in &events {
            match event {
                GameEvent::UnitDied { unit, .. } => out.deaths.push(*unit),
                GameEvent::UnitCreated { unit, .. } => out.spawned.push(*unit),
                _ => {}
            }
        }
        out.events = events;

        #[cfg(debug_assertions)]
        tracing::debug!(tick, state_hash = self.state_hash(), "Simulation state hash");

        out
    }

    /// Process `count` ticks, returning every tick's events.
    pub fn run_ticks(&mut self, count: u64) -> Vec<TickEvents> {
        (0..count).map(|_| self.tick()).collect()
    }

    /// Hash of the observable state, for comparing peers and replays.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.ctx.tick().hash(&mut hasher);
        self.ctx.seed().hash(&mut hasher);
        self.ctx.sync_hash.hash(&mut hasher);

        self.world.units.len().hash(&mut hasher);
        for u in self.world.units.iter() {
            u.handle.hash(&mut hasher);
            u.type_id.hash(&mut hasher);
            u.player.hash(&mut hasher);
            u.pos.hash(&mut hasher);
            u.layer.hash(&mut hasher);
            u.hp.hash(&mut hasher);
            u.mana.hash(&mut hasher);
            u.xp.hash(&mut hasher);
            u.current_action().code().hash(&mut hasher);
            u.orders.len().hash(&mut hasher);
            u.resources_held.hash(&mut hasher);
            u.resource_stock.hash(&mut hasher);
            u.removed.hash(&mut hasher);
            u.dying.hash(&mut hasher);
            u.under_construction.hash(&mut hasher);
            u.move_progress.to_bits().hash(&mut hasher);
        }
        for p in self.world.players.iter() {
            p.id.hash(&mut hasher);
            p.resources.hash(&mut hasher);
            p.upgrades.hash(&mut hasher);
            p.research_progress.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Every unit's orders as text, one record per line.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if an order cannot be written.
    pub fn save_orders(&self) -> Result<String> {
        persist::save_orders(&self.world)
    }

    /// Replace unit orders with the ones in `text`.
    pub fn load_orders(&mut self, text: &str) -> LoadReport {
        persist::load_orders(&mut self.world, text)
    }

    /// Snapshot of world and context (the command log is not included).
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if encoding fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize simulation: {e}")))
    }

    /// Restore a snapshot made by [`serialize`](Self::serialize).
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if decoding fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize simulation: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::UnitCommand;
    use crate::economy::Costs;
    use crate::fixtures::sandbox_simulation;
    use crate::math::TilePos;

    #[test]
    fn test_tick_advances_and_reports_spawns() {
        let (mut sim, types) = sandbox_simulation();
        assert_eq!(sim.tick_count(), 0);
        {
            let (world, ctx) = sim.parts_mut();
            world
                .spawn_unit(ctx, types.footman, 0, TilePos::new(1, 1), 0)
                .unwrap();
        }
        let events = sim.tick();
        assert_eq!(events.tick, 0);
        assert_eq!(events.spawned.len(), 1);
        assert_eq!(sim.tick_count(), 1);
    }

    #[test]
    fn test_rejected_commands_are_not_logged() {
        let (mut sim, types) = sandbox_simulation();
        let peasant = {
            let (world, ctx) = sim.parts_mut();
            world
                .spawn_unit(ctx, types.peasant, 0, TilePos::new(1, 1), 0)
                .unwrap()
        };
        let go = Command::order(
            peasant,
            UnitCommand::Move {
                pos: TilePos::new(6, 6),
                layer: 0,
            },
        );
        sim.send_command(go).unwrap();
        let train = Command::order(
            peasant,
            UnitCommand::Train {
                unit_type: types.footman,
                payer: None,
            },
        );
        assert!(sim.send_command(train).is_err());
        assert_eq!(sim.log().len(), 1);
        assert_eq!(sim.log().records()[0].command, "move");
        let events = sim.tick();
        assert!(events
            .events
            .iter()
            .any(|e| matches!(e, GameEvent::CommandRejected { .. })));
    }

    #[test]
    fn test_identical_runs_stay_identical() {
        let run = || {
            let (mut sim, types) = sandbox_simulation();
            let (a, b) = {
                let (world, ctx) = sim.parts_mut();
                let a = world
                    .spawn_unit(ctx, types.footman, 0, TilePos::new(2, 2), 0)
                    .unwrap();
                let b = world
                    .spawn_unit(ctx, types.footman, 1, TilePos::new(9, 2), 0)
                    .unwrap();
                (a, b)
            };
            sim.send_command(Command::order(
                a,
                UnitCommand::Attack {
                    target: Some(b),
                    pos: TilePos::new(9, 2),
                    layer: 0,
                },
            ))
            .unwrap();
            sim.run_ticks(120);
            (sim.sync_hash(), sim.state_hash(), sim.seed())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_snapshot_round_trip_preserves_hash() {
        let (mut sim, types) = sandbox_simulation();
        {
            let (world, ctx) = sim.parts_mut();
            world.player_mut(0).unwrap().resources = Costs::gold(500);
            let hall = world
                .spawn_unit(ctx, types.hall, 0, TilePos::new(4, 4), 0)
                .unwrap();
            command::train(world, ctx, hall, types.peasant, None).unwrap();
        }
        sim.run_ticks(7);
        let bytes = sim.serialize().unwrap();
        let mut restored = Simulation::deserialize(&bytes).unwrap();
        assert_eq!(restored.state_hash(), sim.state_hash());
        sim.run_ticks(10);
        restored.run_ticks(10);
        assert_eq!(restored.state_hash(), sim.state_hash());
        assert_eq!(restored.sync_hash(), sim.sync_hash());
    }

    #[test]
    fn test_garbage_snapshot_is_an_error() {
        assert!(matches!(
            Simulation::deserialize(&[1, 2, 3]),
            Err(GameError::InvalidState(_))
        ));
    }
}
