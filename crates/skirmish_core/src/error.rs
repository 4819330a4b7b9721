//! Error types for the order execution core.

use thiserror::Error;

use crate::order::Action;
use crate::unit::UnitHandle;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Unit handle is stale or never existed.
    #[error("Unit not found: {0}")]
    UnitNotFound(UnitHandle),

    /// Unknown unit type identifier.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(String),

    /// Unknown upgrade identifier.
    #[error("Unknown upgrade: {0}")]
    UnknownUpgrade(String),

    /// Unknown spell identifier.
    #[error("Unknown spell: {0}")]
    UnknownSpell(String),

    /// Unknown player.
    #[error("Unknown player: {0}")]
    UnknownPlayer(u8),

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path (or label) of the data that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// No free tile to place a unit.
    #[error("No room to place {unit_type} near ({x}, {y}) on layer {layer}")]
    NoRoom {
        /// Unit type ident.
        unit_type: String,
        /// Requested X.
        x: i32,
        /// Requested Y.
        y: i32,
        /// Requested layer.
        layer: u8,
    },

    /// Invalid simulation state.
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),

    /// Replay sync seed mismatch.
    #[error("Desync detected at tick {tick}: expected seed {expected:#010x}, got {actual:#010x}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Seed recorded in the log.
        expected: u32,
        /// Seed observed while replaying.
        actual: u32,
    },
}

/// A genuine fault raised while executing one order.
///
/// Faults are isolated by the scheduler to the unit that raised them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderFault {
    /// The order references a catalog entry that does not exist.
    #[error("{action} references missing catalog entry {what}")]
    MissingCatalogEntry {
        /// Order kind.
        action: Action,
        /// Description of the missing entry.
        what: String,
    },

    /// The acting unit vanished while its order was running.
    #[error("{action} lost its unit {unit}")]
    UnitVanished {
        /// Order kind.
        action: Action,
        /// The unit.
        unit: UnitHandle,
    },

    /// A state combination the order cannot make sense of.
    #[error("{action} in impossible state: {detail}")]
    ImpossibleState {
        /// Order kind.
        action: Action,
        /// What was wrong.
        detail: String,
    },
}

/// Why the command layer refused a command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Acting unit is gone, dying, or removed from the map.
    #[error("unit {0} cannot take commands")]
    UnitUnavailable(UnitHandle),

    /// Destination unit is gone or dying.
    #[error("target {0} is not valid")]
    InvalidTarget(UnitHandle),

    /// The unit type lacks the capability for this verb.
    #[error("{unit_type} cannot {verb}")]
    NotCapable {
        /// Acting unit type ident.
        unit_type: String,
        /// Command name.
        verb: &'static str,
    },

    /// Payer cannot afford the cost.
    #[error("not enough resources for {0}")]
    InsufficientResources(String),

    /// Player unit limit reached.
    #[error("unit limit reached")]
    UnitLimit,

    /// The order queue is at its configured depth.
    #[error("order queue full")]
    QueueFull,

    /// Training queue disabled and the unit is already training.
    #[error("training queue disabled")]
    TrainingQueueDisabled,

    /// Unknown type, upgrade or spell ident.
    #[error("unknown identifier {0}")]
    UnknownIdent(String),

    /// A spell that needs a unit was cast at a tile.
    #[error("{0} needs a target unit")]
    MissingTarget(String),

    /// Upgrade already acquired or currently being researched.
    #[error("upgrade {0} already researched or in progress")]
    UpgradeUnavailable(String),

    /// No order at the requested queue slot matches.
    #[error("nothing to cancel")]
    NothingToCancel,

    /// Destination is on a layer no connector chain reaches.
    #[error("no connector route to layer {0}")]
    NoConnectorRoute(u8),

    /// Player ids out of range.
    #[error("unknown player {0}")]
    UnknownPlayer(u8),

    /// Issuer does not control the unit.
    #[error("player {issuer} does not control unit {unit}")]
    NotOwner {
        /// Issuing player.
        issuer: u8,
        /// The unit.
        unit: UnitHandle,
    },

    /// Position outside the map.
    #[error("position ({x}, {y}) is off the map")]
    OffMap {
        /// X.
        x: i32,
        /// Y.
        y: i32,
    },
}
