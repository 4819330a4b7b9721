//! Events emitted by the simulation for the presentation and AI layers.

use serde::{Deserialize, Serialize};

use crate::data::{UnitTypeId, UpgradeId};
use crate::economy::ResourceKind;
use crate::order::Action;
use crate::player::PlayerId;
use crate::unit::UnitHandle;

/// Something observable that happened during a tick or a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// A unit entered the world.
    UnitCreated {
        /// New unit.
        unit: UnitHandle,
        /// Its type.
        unit_type: UnitTypeId,
        /// Owner.
        player: PlayerId,
    },
    /// A unit started dying.
    UnitDied {
        /// The unit.
        unit: UnitHandle,
        /// Owner.
        player: PlayerId,
    },
    /// A unit left the world for good.
    UnitRemoved {
        /// The retired handle.
        unit: UnitHandle,
    },
    /// A building finished training a unit.
    TrainingComplete {
        /// Producer.
        building: UnitHandle,
        /// New unit.
        unit: UnitHandle,
    },
    /// Research finished.
    ResearchComplete {
        /// Benefiting player.
        player: PlayerId,
        /// Upgrade.
        upgrade: UpgradeId,
    },
    /// A unit finished upgrading or transforming.
    TypeChanged {
        /// The unit.
        unit: UnitHandle,
        /// New type.
        unit_type: UnitTypeId,
    },
    /// Construction finished.
    ConstructionComplete {
        /// The building.
        unit: UnitHandle,
    },
    /// Resources reached a player's ledger.
    ResourcesDelivered {
        /// Delivering unit.
        unit: UnitHandle,
        /// Receiving player.
        player: PlayerId,
        /// Kind.
        resource: ResourceKind,
        /// Amount.
        amount: i32,
    },
    /// A resource source ran dry.
    SourceExhausted {
        /// The source.
        source: UnitHandle,
    },
    /// The command layer refused a command.
    CommandRejected {
        /// Acting unit, if any.
        unit: Option<UnitHandle>,
        /// Command name.
        command: String,
        /// Reason.
        reason: String,
    },
    /// An order raised a fault and was abandoned.
    OrderFault {
        /// The unit.
        unit: UnitHandle,
        /// Its type ident.
        unit_type: String,
        /// Order kind.
        action: Action,
        /// Fault description.
        message: String,
    },
    /// Message for a player.
    Notification {
        /// Recipient.
        player: PlayerId,
        /// Text.
        message: String,
    },
}
