//! Command log, replay recording and playback.
//!
//! Every accepted command becomes a [`LogRecord`] carrying the tick, the
//! acting unit, its type ident and the seed of the synchronized random
//! stream just before the command ran. Playback re-issues the records
//! through the same command layer and compares seeds; records whose unit
//! died, whose slot was reused or whose type changed are skipped and
//! counted, never aborting playback.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::command::{Command, UnitCommand};
use crate::config::DesyncPolicy;
use crate::economy::ResourceKind;
use crate::error::{GameError, Result};
use crate::map::LayerId;
use crate::math::TilePos;
use crate::player::{Diplomacy, PlayerId};
use crate::simulation::Simulation;
use crate::unit::UnitHandle;
use crate::world::World;

/// Current replay format version.
pub const REPLAY_VERSION: u32 = 1;

/// One accepted command as written to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Tick the command was issued before.
    pub tick: u64,
    /// Acting unit.
    pub unit: Option<UnitHandle>,
    /// Type ident of the acting unit when the command was issued.
    pub unit_type: Option<String>,
    /// Command name.
    pub command: String,
    /// Whether the queue was flushed.
    pub flush: bool,
    /// Tile and layer argument.
    pub pos: Option<(i32, i32, LayerId)>,
    /// Destination unit.
    pub dest: Option<UnitHandle>,
    /// Ident or name argument.
    pub value: Option<String>,
    /// Numeric argument.
    pub number: Option<i64>,
    /// Seed of the random stream before the command ran.
    pub seed: u32,
}

/// Why a record could not be re-issued.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SkipReason {
    /// The acting unit no longer exists or is dying.
    #[error("unit {0} is gone")]
    StaleUnit(UnitHandle),
    /// The slot now holds a different unit.
    #[error("slot of {logged} now holds {current}")]
    RecycledSlot {
        /// Handle in the log.
        logged: UnitHandle,
        /// Handle now in the slot.
        current: UnitHandle,
    },
    /// The unit changed type since the log was written.
    #[error("unit {unit} is {actual}, log says {expected}")]
    TypeDrift {
        /// The unit.
        unit: UnitHandle,
        /// Type in the log.
        expected: String,
        /// Type now.
        actual: String,
    },
    /// The destination unit is gone.
    #[error("destination {0} is gone")]
    DeadDestination(UnitHandle),
    /// An ident the catalog does not know.
    #[error("unknown identifier {0}")]
    UnknownIdent(String),
    /// A record missing arguments its command needs.
    #[error("malformed {0} record")]
    Malformed(String),
}

fn pack_handle(h: UnitHandle) -> i64 {
    (i64::from(h.slot) << 32) | i64::from(h.generation)
}

fn unpack_handle(n: i64) -> Option<UnitHandle> {
    let slot = u32::try_from(n >> 32).ok()?;
    let generation = u32::try_from(n & 0xFFFF_FFFF).ok()?;
    Some(UnitHandle::new(slot, generation))
}

fn pack_players(player: PlayerId, other: PlayerId) -> i64 {
    (i64::from(player) << 8) | i64::from(other)
}

fn unpack_players(n: i64) -> Option<(PlayerId, PlayerId)> {
    let player = u8::try_from((n >> 8) & 0xFF).ok()?;
    let other = u8::try_from(n & 0xFF).ok()?;
    Some((player, other))
}

impl LogRecord {
    fn bare(tick: u64, command: &Command, seed: u32) -> Self {
        Self {
            tick,
            unit: command.acting_unit(),
            unit_type: None,
            command: command.name().to_string(),
            flush: command.flush(),
            pos: None,
            dest: None,
            value: None,
            number: None,
            seed,
        }
    }

    fn at(mut self, pos: TilePos, layer: LayerId) -> Self {
        self.pos = Some((pos.x, pos.y, layer));
        self
    }

    fn to(mut self, dest: Option<UnitHandle>) -> Self {
        self.dest = dest;
        self
    }

    fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Record `command` as issued at `tick` against `world`.
    #[must_use]
    pub fn from_command(tick: u64, command: &Command, world: &World, seed: u32) -> Self {
        let mut rec = Self::bare(tick, command, seed);
        let catalog = &world.catalog;
        let order = match *command {
            Command::Unit { unit, order, .. } => {
                rec.unit_type = world.unit(unit).map(|_| world.type_ident(unit));
                order
            }
            Command::Diplomacy {
                player,
                other,
                stance,
            } => {
                rec.number = Some(pack_players(player, other));
                return rec.with_value(stance.name());
            }
            Command::SharedVision {
                player,
                other,
                shared,
            } => {
                rec.number = Some(pack_players(player, other));
                return rec.with_value(if shared { "on" } else { "off" });
            }
        };
        match order {
            UnitCommand::Stop
            | UnitCommand::StandGround
            | UnitCommand::Dismiss
            | UnitCommand::CancelUpgradeTo
            | UnitCommand::CancelResearch => rec,
            UnitCommand::Follow { target }
            | UnitCommand::Defend { target }
            | UnitCommand::Use { target } => rec.to(Some(target)),
            UnitCommand::Board { transport } => rec.to(Some(transport)),
            UnitCommand::Resource { source } => rec.to(Some(source)),
            UnitCommand::ReturnGoods { depot } => rec.to(depot),
            UnitCommand::Move { pos, layer }
            | UnitCommand::AttackGround { pos, layer }
            | UnitCommand::Patrol { pos, layer } => rec.at(pos, layer),
            UnitCommand::Attack { target, pos, layer } => rec.at(pos, layer).to(target),
            UnitCommand::Unload { pos, layer, what } => rec.at(pos, layer).to(what),
            UnitCommand::Build {
                unit_type,
                pos,
                layer,
            } => rec
                .at(pos, layer)
                .with_value(catalog.unit_type_ident(unit_type)),
            UnitCommand::ResourceAt { kind, pos, layer } => {
                rec.at(pos, layer).with_value(kind.name())
            }
            UnitCommand::Train { unit_type, payer } => {
                rec.number = payer.map(i64::from);
                rec.with_value(catalog.unit_type_ident(unit_type))
            }
            UnitCommand::UpgradeTo { unit_type } | UnitCommand::TransformInto { unit_type } => {
                rec.with_value(catalog.unit_type_ident(unit_type))
            }
            UnitCommand::CancelTraining { slot, unit_type } => {
                rec.number = slot.and_then(|s| i64::try_from(s).ok());
                rec.value = unit_type.map(|t| catalog.unit_type_ident(t).to_string());
                rec
            }
            UnitCommand::Research { upgrade, payer } => {
                rec.number = payer.map(i64::from);
                let ident = catalog.upgrade(upgrade).map_or("", |d| d.ident.as_str());
                rec.with_value(ident)
            }
            UnitCommand::SpellCast {
                spell,
                target,
                pos,
                layer,
            } => {
                let ident = catalog.spell(spell).map_or("", |d| d.ident.as_str());
                rec.at(pos, layer).to(target).with_value(ident)
            }
            UnitCommand::Trade { market, home } => {
                rec.number = Some(pack_handle(home));
                rec.to(Some(market))
            }
        }
    }

    fn malformed(&self) -> SkipReason {
        SkipReason::Malformed(self.command.clone())
    }

    fn position(&self) -> std::result::Result<(TilePos, LayerId), SkipReason> {
        self.pos
            .map(|(x, y, layer)| (TilePos::new(x, y), layer))
            .ok_or_else(|| self.malformed())
    }

    fn payer(&self) -> std::result::Result<Option<PlayerId>, SkipReason> {
        self.number
            .map(|n| PlayerId::try_from(n).map_err(|_| self.malformed()))
            .transpose()
    }

    fn value_str(&self) -> std::result::Result<&str, SkipReason> {
        self.value.as_deref().ok_or_else(|| self.malformed())
    }

    fn live(world: &World, unit: UnitHandle) -> std::result::Result<UnitHandle, SkipReason> {
        if world.is_alive(unit) {
            Ok(unit)
        } else {
            Err(SkipReason::DeadDestination(unit))
        }
    }

    fn dest(&self, world: &World) -> std::result::Result<UnitHandle, SkipReason> {
        let dest = self.dest.ok_or_else(|| self.malformed())?;
        Self::live(world, dest)
    }

    fn optional_dest(&self, world: &World) -> std::result::Result<Option<UnitHandle>, SkipReason> {
        self.dest.map(|d| Self::live(world, d)).transpose()
    }

    fn unit_type_arg(
        &self,
        world: &World,
    ) -> std::result::Result<crate::data::UnitTypeId, SkipReason> {
        let ident = self.value_str()?;
        world
            .catalog
            .unit_type_by_ident(ident)
            .ok_or_else(|| SkipReason::UnknownIdent(ident.to_string()))
    }

    fn check_actor(&self, world: &World) -> std::result::Result<UnitHandle, SkipReason> {
        let unit = self.unit.ok_or_else(|| self.malformed())?;
        if !world.units.contains(unit) {
            return Err(match world.units.handle_at(unit.slot) {
                Some(current) => SkipReason::RecycledSlot {
                    logged: unit,
                    current,
                },
                None => SkipReason::StaleUnit(unit),
            });
        }
        if !world.is_alive(unit) {
            return Err(SkipReason::StaleUnit(unit));
        }
        if let Some(expected) = &self.unit_type {
            let actual = world.type_ident(unit);
            if &actual != expected {
                return Err(SkipReason::TypeDrift {
                    unit,
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(unit)
    }

    /// Rebuild the command against the current world.
    ///
    /// # Errors
    ///
    /// Returns why the record no longer applies.
    pub fn to_command(&self, world: &World) -> std::result::Result<Command, SkipReason> {
        match self.command.as_str() {
            "diplomacy" => {
                let (player, other) = self
                    .number
                    .and_then(unpack_players)
                    .ok_or_else(|| self.malformed())?;
                let value = self.value_str()?;
                let stance = Diplomacy::from_name(value)
                    .ok_or_else(|| SkipReason::UnknownIdent(value.to_string()))?;
                return Ok(Command::Diplomacy {
                    player,
                    other,
                    stance,
                });
            }
            "shared-vision" => {
                let (player, other) = self
                    .number
                    .and_then(unpack_players)
                    .ok_or_else(|| self.malformed())?;
                return Ok(Command::SharedVision {
                    player,
                    other,
                    shared: self.value_str()? == "on",
                });
            }
            _ => {}
        }

        let unit = self.check_actor(world)?;
        let order = match self.command.as_str() {
            "stop" => UnitCommand::Stop,
            "stand-ground" => UnitCommand::StandGround,
            "dismiss" => UnitCommand::Dismiss,
            "cancel-upgrade-to" => UnitCommand::CancelUpgradeTo,
            "cancel-research" => UnitCommand::CancelResearch,
            "follow" => UnitCommand::Follow {
                target: self.dest(world)?,
            },
            "defend" => UnitCommand::Defend {
                target: self.dest(world)?,
            },
            "use" => UnitCommand::Use {
                target: self.dest(world)?,
            },
            "board" => UnitCommand::Board {
                transport: self.dest(world)?,
            },
            "resource" => UnitCommand::Resource {
                source: self.dest(world)?,
            },
            "return" => UnitCommand::ReturnGoods {
                depot: self.optional_dest(world)?,
            },
            "move" => {
                let (pos, layer) = self.position()?;
                UnitCommand::Move { pos, layer }
            }
            "attack-ground" => {
                let (pos, layer) = self.position()?;
                UnitCommand::AttackGround { pos, layer }
            }
            "patrol" => {
                let (pos, layer) = self.position()?;
                UnitCommand::Patrol { pos, layer }
            }
            "attack" => {
                let (pos, layer) = self.position()?;
                UnitCommand::Attack {
                    target: self.optional_dest(world)?,
                    pos,
                    layer,
                }
            }
            "unload" => {
                let (pos, layer) = self.position()?;
                UnitCommand::Unload {
                    pos,
                    layer,
                    what: self.optional_dest(world)?,
                }
            }
            "build" => {
                let (pos, layer) = self.position()?;
                UnitCommand::Build {
                    unit_type: self.unit_type_arg(world)?,
                    pos,
                    layer,
                }
            }
            "resource-loc" => {
                let (pos, layer) = self.position()?;
                let name = self.value_str()?;
                let kind = ResourceKind::from_name(name)
                    .ok_or_else(|| SkipReason::UnknownIdent(name.to_string()))?;
                UnitCommand::ResourceAt { kind, pos, layer }
            }
            "train" => UnitCommand::Train {
                unit_type: self.unit_type_arg(world)?,
                payer: self.payer()?,
            },
            "upgrade-to" => UnitCommand::UpgradeTo {
                unit_type: self.unit_type_arg(world)?,
            },
            "transform-into" => UnitCommand::TransformInto {
                unit_type: self.unit_type_arg(world)?,
            },
            "cancel-train" => UnitCommand::CancelTraining {
                slot: self.number.and_then(|n| usize::try_from(n).ok()),
                unit_type: match self.value {
                    Some(_) => Some(self.unit_type_arg(world)?),
                    None => None,
                },
            },
            "research" => {
                let ident = self.value_str()?;
                UnitCommand::Research {
                    upgrade: world
                        .catalog
                        .upgrade_by_ident(ident)
                        .ok_or_else(|| SkipReason::UnknownIdent(ident.to_string()))?,
                    payer: self.payer()?,
                }
            }
            "spell-cast" => {
                let (pos, layer) = self.position()?;
                let ident = self.value_str()?;
                UnitCommand::SpellCast {
                    spell: world
                        .catalog
                        .spell_by_ident(ident)
                        .ok_or_else(|| SkipReason::UnknownIdent(ident.to_string()))?,
                    target: self.optional_dest(world)?,
                    pos,
                    layer,
                }
            }
            "trade" => {
                let home = self
                    .number
                    .and_then(unpack_handle)
                    .ok_or_else(|| self.malformed())?;
                UnitCommand::Trade {
                    market: self.dest(world)?,
                    home: Self::live(world, home)?,
                }
            }
            other => return Err(SkipReason::UnknownIdent(other.to_string())),
        };
        Ok(Command::Unit {
            unit,
            flush: self.flush,
            order,
        })
    }
}

/// Append-only list of accepted commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLog {
    records: Vec<LogRecord>,
}

impl CommandLog {
    /// Append a record.
    pub fn push(&mut self, record: LogRecord) {
        self.records.push(record);
    }

    /// All records in issue order.
    #[must_use]
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Iterate over the records.
    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        self.records.iter()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records issued at `tick`, which run before that tick is processed.
    pub fn at_tick(&self, tick: u64) -> impl Iterator<Item = &LogRecord> {
        self.records.iter().filter(move |r| r.tick == tick)
    }

    /// The log as text, one record per line.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if a record cannot be written.
    pub fn to_text(&self) -> Result<String> {
        let mut out = String::new();
        for record in &self.records {
            let line = ron::to_string(record)
                .map_err(|e| GameError::InvalidState(format!("Failed to write log record: {e}")))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    /// Parse text written by [`to_text`](Self::to_text). Blank lines are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] naming the first bad line.
    pub fn from_text(label: &str, text: &str) -> Result<Self> {
        let mut log = Self::default();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record = ron::from_str(line).map_err(|e| GameError::DataParseError {
                path: format!("{label}:{}", index + 1),
                message: e.to_string(),
            })?;
            log.push(record);
        }
        Ok(log)
    }
}

/// A complete recorded game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Format version.
    pub version: u32,
    /// Scenario the game was started from.
    pub scenario_id: String,
    /// Seed of the random stream at the start.
    pub seed: u32,
    /// Snapshot of the simulation at the start.
    pub initial_state: Vec<u8>,
    /// Accepted commands.
    pub commands: CommandLog,
    /// Tick the recording ended at.
    pub final_tick: u64,
    /// Sync checksum at the end.
    pub final_sync_hash: u32,
    /// State hash at the end.
    pub final_hash: u64,
}

impl Replay {
    /// Start recording from the current state of `simulation`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot fails.
    pub fn new(scenario_id: impl Into<String>, simulation: &Simulation) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            seed: simulation.seed(),
            initial_state: simulation.serialize()?,
            commands: CommandLog::default(),
            final_tick: simulation.tick_count(),
            final_sync_hash: simulation.sync_hash(),
            final_hash: simulation.state_hash(),
        })
    }

    /// Take the command log and end state from `simulation`.
    pub fn finalize(&mut self, simulation: &Simulation) {
        self.commands = simulation.log().clone();
        self.final_tick = simulation.tick_count();
        self.final_sync_hash = simulation.sync_hash();
        self.final_hash = simulation.state_hash();
    }

    /// Restore the recorded starting state.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot does not decode.
    pub fn restore_initial_state(&self) -> Result<Simulation> {
        Simulation::deserialize(&self.initial_state)
    }

    /// Encode with bincode.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize replay: {e}")))
    }

    /// Decode bytes written by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] for undecodable data or a
    /// version this build does not read.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let replay: Self = bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize replay: {e}")))?;
        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "Unsupported replay version: {} (expected {})",
                replay.version, REPLAY_VERSION
            )));
        }
        Ok(replay)
    }

    /// Write to a file.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] on encoding or IO failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = self.to_bytes()?;
        std::fs::write(path, data)
            .map_err(|e| GameError::InvalidState(format!("Failed to write replay file: {e}")))
    }

    /// Read from a file.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] on IO or decoding failure.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| GameError::InvalidState(format!("Failed to read replay file: {e}")))?;
        Self::from_bytes(&data)
    }

    /// Length in ticks.
    #[must_use]
    pub fn duration(&self) -> u64 {
        self.final_tick
    }

    /// Number of logged commands.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

/// A seed mismatch found during playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Desync {
    /// Tick of the record.
    pub tick: u64,
    /// Seed in the log.
    pub expected: u32,
    /// Seed during playback.
    pub actual: u32,
}

/// A record that playback could not re-issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Tick of the record.
    pub tick: u64,
    /// Command name.
    pub command: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// What playback has seen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Records re-issued and accepted.
    pub applied: usize,
    /// Records that no longer applied.
    pub skipped: Vec<SkippedRecord>,
    /// Records re-issued but rejected by the command layer.
    pub rejected: usize,
    /// Seed mismatches.
    pub desyncs: Vec<Desync>,
}

/// Plays a [`Replay`] back through the command layer.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    simulation: Simulation,
    next_record: usize,
    policy: DesyncPolicy,
    report: ReplayReport,
}

impl ReplayPlayer {
    /// Player positioned at the start of `replay`, using the desync policy
    /// of the recorded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial snapshot does not decode.
    pub fn new(replay: Replay) -> Result<Self> {
        let simulation = replay.restore_initial_state()?;
        let policy = simulation.world().config.desync_policy;
        Ok(Self {
            replay,
            simulation,
            next_record: 0,
            policy,
            report: ReplayReport::default(),
        })
    }

    /// Override the desync policy.
    #[must_use]
    pub fn with_policy(mut self, policy: DesyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Issue the records due at the current tick, then run it.
    ///
    /// Returns whether there is more to play.
    pub fn advance(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        let tick = self.simulation.tick_count();
        while let Some(record) = self.replay.commands.records().get(self.next_record) {
            if record.tick > tick {
                break;
            }
            let record = record.clone();
            self.next_record += 1;
            self.apply_record(&record);
        }
        self.simulation.tick();
        !self.is_finished()
    }

    fn apply_record(&mut self, record: &LogRecord) {
        let actual = self.simulation.seed();
        if record.seed != actual {
            let desync = Desync {
                tick: record.tick,
                expected: record.seed,
                actual,
            };
            match self.policy {
                DesyncPolicy::Panic => panic!(
                    "{}",
                    GameError::DesyncDetected {
                        tick: desync.tick,
                        expected: desync.expected,
                        actual: desync.actual,
                    }
                ),
                DesyncPolicy::Report => {
                    tracing::error!(
                        tick = record.tick,
                        expected = format_args!("{:#010x}", record.seed),
                        actual = format_args!("{actual:#010x}"),
                        command = %record.command,
                        "replay desync"
                    );
                    self.report.desyncs.push(desync);
                }
            }
        }
        let command = match record.to_command(self.simulation.world()) {
            Ok(command) => command,
            Err(reason) => {
                tracing::warn!(tick = record.tick, command = %record.command, %reason, "skipping replay record");
                self.report.skipped.push(SkippedRecord {
                    tick: record.tick,
                    command: record.command.clone(),
                    reason,
                });
                return;
            }
        };
        match self.simulation.send_command(command) {
            Ok(()) => self.report.applied += 1,
            Err(_) => self.report.rejected += 1,
        }
    }

    /// Play to the end of the recording.
    pub fn run_to_end(&mut self) -> &ReplayReport {
        while self.advance() {}
        &self.report
    }

    /// Restart and play up to `tick`.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial snapshot does not decode.
    pub fn seek(&mut self, tick: u64) -> Result<()> {
        self.simulation = self.replay.restore_initial_state()?;
        self.next_record = 0;
        self.report = ReplayReport::default();
        while self.simulation.tick_count() < tick && self.advance() {}
        Ok(())
    }

    /// Play to the end and compare the final hashes with the recording.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial snapshot does not decode.
    pub fn verify(&mut self) -> Result<bool> {
        self.seek(self.replay.final_tick)?;
        let matches = self.simulation.sync_hash() == self.replay.final_sync_hash
            && self.simulation.state_hash() == self.replay.final_hash;
        if !matches {
            tracing::error!(
                tick = self.simulation.tick_count(),
                expected = self.replay.final_hash,
                actual = self.simulation.state_hash(),
                "replay final state differs"
            );
        }
        Ok(matches)
    }

    /// Next tick to be played.
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.simulation.tick_count()
    }

    /// Whether the recording has been played to its end.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.simulation.tick_count() >= self.replay.final_tick
            && self.next_record >= self.replay.commands.len()
    }

    /// The simulation being played.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// The recording.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Playback findings so far.
    #[must_use]
    pub const fn report(&self) -> &ReplayReport {
        &self.report
    }

    /// Progress in percent.
    #[must_use]
    pub fn progress_percent(&self) -> f32 {
        if self.replay.final_tick == 0 {
            return 100.0;
        }
        (self.current_tick() as f32 / self.replay.final_tick as f32 * 100.0).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sandbox_simulation;

    fn recorded() -> (Replay, UnitHandle) {
        let (mut sim, types) = sandbox_simulation();
        let footman = {
            let (world, ctx) = sim.parts_mut();
            world
                .spawn_unit(ctx, types.footman, 0, TilePos::new(2, 2), 0)
                .unwrap()
        };
        let mut replay = Replay::new("sandbox", &sim).unwrap();
        sim.run_ticks(5);
        sim.send_command(Command::order(
            footman,
            UnitCommand::Move {
                pos: TilePos::new(12, 2),
                layer: 0,
            },
        ))
        .unwrap();
        sim.run_ticks(40);
        sim.send_command(Command::Diplomacy {
            player: 0,
            other: 2,
            stance: Diplomacy::Allied,
        })
        .unwrap();
        sim.run_ticks(5);
        replay.finalize(&sim);
        (replay, footman)
    }

    #[test]
    fn test_record_fields() {
        let (replay, footman) = recorded();
        assert_eq!(replay.command_count(), 2);
        let first = &replay.commands.records()[0];
        assert_eq!(first.tick, 5);
        assert_eq!(first.unit, Some(footman));
        assert_eq!(first.unit_type.as_deref(), Some("unit-footman"));
        assert_eq!(first.command, "move");
        assert!(first.flush);
        assert_eq!(first.pos, Some((12, 2, 0)));
        let second = &replay.commands.records()[1];
        assert_eq!(second.unit, None);
        assert_eq!(second.value.as_deref(), Some("allied"));
    }

    #[test]
    fn test_text_log_round_trip() {
        let (replay, _) = recorded();
        let text = replay.commands.to_text().unwrap();
        assert_eq!(text.lines().count(), 2);
        let parsed = CommandLog::from_text("log", &text).unwrap();
        assert_eq!(parsed, replay.commands);
    }

    #[test]
    fn test_text_log_reports_bad_line() {
        let err = CommandLog::from_text("log", "\n(garbage\n").unwrap_err();
        match err {
            GameError::DataParseError { path, .. } => assert_eq!(path, "log:2"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_playback_matches_recording() {
        let (replay, _) = recorded();
        let mut player = ReplayPlayer::new(replay)
            .unwrap()
            .with_policy(DesyncPolicy::Report);
        assert!(player.verify().unwrap());
        assert!(player.is_finished());
        let report = player.report();
        assert_eq!(report.applied, 2);
        assert!(report.desyncs.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_seek_backwards() {
        let (replay, _) = recorded();
        let mut player = ReplayPlayer::new(replay)
            .unwrap()
            .with_policy(DesyncPolicy::Report);
        player.seek(30).unwrap();
        assert_eq!(player.current_tick(), 30);
        player.seek(10).unwrap();
        assert_eq!(player.current_tick(), 10);
        assert!(player.progress_percent() > 19.0);
        assert!(player.progress_percent() < 21.0);
    }

    #[test]
    fn test_bytes_round_trip_and_version_check() {
        let (mut replay, _) = recorded();
        let bytes = replay.to_bytes().unwrap();
        let loaded = Replay::from_bytes(&bytes).unwrap();
        assert_eq!(loaded.final_hash, replay.final_hash);
        assert_eq!(loaded.commands, replay.commands);

        replay.version = 99;
        let bytes = replay.to_bytes().unwrap();
        assert!(Replay::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_recycled_slot_is_skipped() {
        let (mut sim, types) = sandbox_simulation();
        let (world, ctx) = sim.parts_mut();
        let old = world
            .spawn_unit(ctx, types.footman, 0, TilePos::new(2, 2), 0)
            .unwrap();
        let record = LogRecord::from_command(
            0,
            &Command::order(old, UnitCommand::Stop),
            world,
            ctx.seed(),
        );
        world.release_unit(old, ctx);
        let new = world
            .spawn_unit(ctx, types.footman, 0, TilePos::new(2, 2), 0)
            .unwrap();
        assert_eq!(new.slot, old.slot);
        assert_eq!(
            record.to_command(world),
            Err(SkipReason::RecycledSlot {
                logged: old,
                current: new
            })
        );
    }

    #[test]
    fn test_type_drift_is_skipped() {
        let (mut sim, types) = sandbox_simulation();
        let (world, ctx) = sim.parts_mut();
        let peasant = world
            .spawn_unit(ctx, types.peasant, 0, TilePos::new(2, 2), 0)
            .unwrap();
        let mut record = LogRecord::from_command(
            0,
            &Command::order(peasant, UnitCommand::Stop),
            world,
            ctx.seed(),
        );
        record.unit_type = Some("unit-footman".into());
        assert!(matches!(
            record.to_command(world),
            Err(SkipReason::TypeDrift { .. })
        ));
    }

    #[test]
    fn test_trade_home_survives_round_trip() {
        let (mut sim, types) = sandbox_simulation();
        let (world, ctx) = sim.parts_mut();
        let caravan = world
            .spawn_unit(ctx, types.caravan, 0, TilePos::new(2, 2), 0)
            .unwrap();
        let home = world
            .spawn_unit(ctx, types.market, 0, TilePos::new(5, 5), 0)
            .unwrap();
        let market = world
            .spawn_unit(ctx, types.market, 2, TilePos::new(20, 5), 0)
            .unwrap();
        let command = Command::order(caravan, UnitCommand::Trade { market, home });
        let record = LogRecord::from_command(0, &command, world, ctx.seed());
        assert_eq!(record.to_command(world), Ok(command));
    }
}
