//! Spell definitions.

use serde::{Deserialize, Serialize};

/// Effect of a spell on its target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SpellEffect {
    /// Restore hit points on the goal unit.
    Heal(i32),
    /// Damage the goal unit, or every unit on the goal tile.
    Damage(i32),
    /// Stun the goal unit for a number of ticks.
    Stun(u32),
}

/// Data-driven spell definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpellDef {
    /// Unique string identifier.
    pub ident: String,
    /// Mana spent per cast.
    pub mana_cost: i32,
    /// Cast range in tiles.
    pub range: u32,
    /// Whether the spell needs a unit goal rather than a tile.
    #[serde(default)]
    pub needs_unit: bool,
    /// What the spell does.
    pub effect: SpellEffect,
}
