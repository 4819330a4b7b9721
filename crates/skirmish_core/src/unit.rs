//! Units and the generation-checked unit table.
//!
//! Every reference from one unit to another (goal, mine, depot, worker,
//! connector destination) is a [`UnitHandle`]. A handle whose generation no
//! longer matches its slot resolves to nothing, so references to dead units
//! quietly become absent instead of dangling.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::data::UnitTypeId;
use crate::economy::ResourceKind;
use crate::map::LayerId;
use crate::math::{fixed_serde, Fixed, TilePos};
use crate::order::Action;
use crate::pathfinding::PathRequest;
use crate::player::PlayerId;
use crate::queue::OrderQueue;

/// Generation-checked reference to a unit slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitHandle {
    /// Slot index in the unit table.
    pub slot: u32,
    /// Generation the slot had when the handle was issued.
    pub generation: u32,
}

impl UnitHandle {
    /// Create a handle.
    #[must_use]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }
}

impl std::fmt::Display for UnitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}.{}", self.slot, self.generation)
    }
}

/// Per-unit bonus variables read by production orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitBonus {
    /// Percentage added to research, training and upgrade progress.
    pub time_efficiency: i32,
}

/// A live unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Own handle.
    pub handle: UnitHandle,
    /// Unit type.
    pub type_id: UnitTypeId,
    /// Owning player.
    pub player: PlayerId,
    /// Top-left tile of the footprint.
    pub pos: TilePos,
    /// Map layer.
    pub layer: LayerId,
    /// Hit points.
    pub hp: i32,
    /// Mana.
    pub mana: i32,
    /// Experience.
    pub xp: i32,
    /// Orders and their auxiliary slots.
    pub orders: OrderQueue,
    /// Ticks before the unit may act again.
    pub wait: u32,
    /// Ticks left in an uninterruptible animation.
    pub anim_ticks: u32,
    /// Ticks left stunned.
    pub stun_ticks: u32,
    /// Draws taken from the synchronized random stream.
    pub rng_draws: u32,
    /// Live goal references pointing at this unit (recounted each tick).
    pub refs: u32,
    /// Not on the map (inside a container, depot or mine).
    pub removed: bool,
    /// Still being constructed.
    pub under_construction: bool,
    /// Playing the death sequence.
    pub dying: bool,
    /// Unit this one is inside.
    pub container: Option<UnitHandle>,
    /// Units inside this one.
    pub contents: Vec<UnitHandle>,
    /// Resource kind carried.
    pub carried_resource: Option<ResourceKind>,
    /// Amount carried.
    pub resources_held: i32,
    /// Stock of a resource source or garrison building.
    pub resource_stock: i32,
    /// Paired connector on another layer.
    pub connection: Option<UnitHandle>,
    /// Settlement this building belongs to.
    pub settlement: Option<UnitHandle>,
    /// Bonus variables.
    pub bonus: UnitBonus,
    /// Sub-tile movement progress.
    #[serde(with = "fixed_serde")]
    pub move_progress: Fixed,
    /// Remaining path, next step last.
    pub path: Vec<TilePos>,
    /// Request the current path answers.
    pub path_request: Option<PathRequest>,
    /// Consecutive ticks the next step was occupied.
    pub blocked_ticks: u32,
}

impl Unit {
    /// Create a unit with a stand-still order.
    #[must_use]
    pub fn new(
        handle: UnitHandle,
        type_id: UnitTypeId,
        player: PlayerId,
        pos: TilePos,
        layer: LayerId,
        hp: i32,
    ) -> Self {
        Self {
            handle,
            type_id,
            player,
            pos,
            layer,
            hp,
            mana: 0,
            xp: 0,
            orders: OrderQueue::new(),
            wait: 0,
            anim_ticks: 0,
            stun_ticks: 0,
            rng_draws: 0,
            refs: 0,
            removed: false,
            under_construction: false,
            dying: false,
            container: None,
            contents: Vec::new(),
            carried_resource: None,
            resources_held: 0,
            resource_stock: 0,
            connection: None,
            settlement: None,
            bonus: UnitBonus::default(),
            move_progress: Fixed::ZERO,
            path: Vec::new(),
            path_request: None,
            blocked_ticks: 0,
        }
    }

    /// Whether an animation forbids queue advancement.
    #[must_use]
    pub const fn is_unbreakable(&self) -> bool {
        self.anim_ticks > 0
    }

    /// Whether the unit is stunned.
    #[must_use]
    pub const fn is_stunned(&self) -> bool {
        self.stun_ticks > 0
    }

    /// Intent kind of the active order.
    #[must_use]
    pub fn current_action(&self) -> Action {
        self.orders.active().action()
    }

    /// Whether the unit may receive commands.
    #[must_use]
    pub fn accepts_commands(&self) -> bool {
        !self.removed && !self.dying
    }

    /// Start an uninterruptible animation of `ticks`.
    pub fn begin_unbreakable(&mut self, ticks: u32) {
        self.anim_ticks = self.anim_ticks.max(ticks);
    }

    /// Forget the current path.
    pub fn clear_path(&mut self) {
        self.path.clear();
        self.path_request = None;
        self.blocked_ticks = 0;
        self.move_progress = Fixed::ZERO;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Slot {
    generation: u32,
    unit: Option<Unit>,
}

/// Slot arena holding every unit.
///
/// Freed slots are reused oldest first; each reuse bumps the generation so
/// stale handles stop resolving.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitTable {
    slots: Vec<Slot>,
    free: VecDeque<u32>,
}

impl UnitTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a slot and store the unit built by `make`.
    pub fn insert_with(&mut self, make: impl FnOnce(UnitHandle) -> Unit) -> UnitHandle {
        if let Some(slot) = self.free.pop_front() {
            let entry = &mut self.slots[slot as usize];
            let handle = UnitHandle::new(slot, entry.generation);
            entry.unit = Some(make(handle));
            handle
        } else {
            let slot = self.slots.len() as u32;
            let handle = UnitHandle::new(slot, 0);
            self.slots.push(Slot {
                generation: 0,
                unit: Some(make(handle)),
            });
            handle
        }
    }

    /// Remove a unit and retire its handle.
    pub fn remove(&mut self, handle: UnitHandle) -> Option<Unit> {
        let entry = self.slots.get_mut(handle.slot as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        let unit = entry.unit.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push_back(handle.slot);
        Some(unit)
    }

    /// Resolve a handle.
    #[must_use]
    pub fn get(&self, handle: UnitHandle) -> Option<&Unit> {
        let entry = self.slots.get(handle.slot as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        entry.unit.as_ref()
    }

    /// Resolve a handle mutably.
    pub fn get_mut(&mut self, handle: UnitHandle) -> Option<&mut Unit> {
        let entry = self.slots.get_mut(handle.slot as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        entry.unit.as_mut()
    }

    /// Whether the handle resolves.
    #[must_use]
    pub fn contains(&self, handle: UnitHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Handle of whatever unit currently occupies `slot`.
    #[must_use]
    pub fn handle_at(&self, slot: u32) -> Option<UnitHandle> {
        let entry = self.slots.get(slot as usize)?;
        entry
            .unit
            .as_ref()
            .map(|_| UnitHandle::new(slot, entry.generation))
    }

    /// Handles of all live units in slot order.
    #[must_use]
    pub fn handles(&self) -> Vec<UnitHandle> {
        self.iter().map(|u| u.handle).collect()
    }

    /// Iterate live units in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.slots.iter().filter_map(|s| s.unit.as_ref())
    }

    /// Iterate live units mutably in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.slots.iter_mut().filter_map(|s| s.unit.as_mut())
    }

    /// Number of live units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether no unit is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
