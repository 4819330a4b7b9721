//! # Skirmish Core
//!
//! Deterministic unit order execution for a real-time strategy game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No wall clock
//! - No system randomness
//! - No IO besides the replay and scenario file helpers
//!
//! Every peer that starts from the same state and applies the same
//! commands on the same ticks ends in the same state. This enables:
//! - Lockstep multiplayer
//! - Replays
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`order`] - One state machine per unit intent
//! - [`queue`] - Per-unit order queue with its auxiliary slots
//! - [`command`] - Validation and queue placement of player commands
//! - [`scheduler`] - The per-tick unit loop
//! - [`handlers`] - Periodic per-unit handlers
//! - [`simulation`] - World, context and command log behind one handle
//! - [`replay`] - Command log, recording and playback
//! - [`persist`] - Saving and loading orders as text
//! - [`scenario`] - Starting states as RON data

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod clock;
pub mod command;
pub mod config;
pub mod connector;
pub mod context;
pub mod data;
pub mod economy;
pub mod error;
pub mod events;
pub mod handlers;
pub mod map;
pub mod math;
pub mod movement;
pub mod order;
pub mod pathfinding;
pub mod persist;
pub mod player;
pub mod player_facade;
pub mod queue;
pub mod replay;
pub mod scenario;
pub mod scheduler;
pub mod simulation;
pub mod unit;
pub mod world;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::command::{Command, CommandResult, UnitCommand};
    pub use crate::config::{DesyncPolicy, RefundBasis, SimConfig};
    pub use crate::context::SimContext;
    pub use crate::data::{Catalog, SpellId, UnitTypeDef, UnitTypeId, UpgradeId};
    pub use crate::economy::{Costs, ResourceKind};
    pub use crate::error::{CommandError, GameError, OrderFault, Result};
    pub use crate::events::GameEvent;
    pub use crate::map::LayerId;
    pub use crate::math::{Fixed, TilePos};
    pub use crate::order::{Action, Order, OrderStatus};
    pub use crate::player::{Diplomacy, PlayerId};
    pub use crate::player_facade::{PlayerFacade, SimulationPlayerFacade};
    pub use crate::queue::OrderSlot;
    pub use crate::replay::{CommandLog, LogRecord, Replay, ReplayPlayer, SkipReason};
    pub use crate::scenario::ScenarioDef;
    pub use crate::simulation::{Simulation, TickEvents};
    pub use crate::unit::UnitHandle;
    pub use crate::world::World;
}
