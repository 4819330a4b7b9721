//! Data catalog of unit types, upgrades and spells.
//!
//! This module contains pure data structures deserialized from RON text.
//! It performs no IO; callers read files and hand the text over.
//! Catalog entries are referenced from orders and saves by their stable
//! numeric id (position in the catalog) or by string ident.

mod spell_data;
mod unit_data;
mod upgrade_data;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{GameError, Result};

pub use spell_data::{SpellDef, SpellEffect};
pub use unit_data::{AttackStats, GarrisonIncome, HarvestDef, UnitTypeDef};
pub use upgrade_data::{UpgradeDef, UpgradeEffect};

/// Stable id of a unit type (its index in the catalog).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitTypeId(pub u32);

/// Stable id of an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpgradeId(pub u32);

/// Stable id of a spell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpellId(pub u32);

/// All game content the orders read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Unit types; index is [`UnitTypeId`].
    pub unit_types: Vec<UnitTypeDef>,
    /// Upgrades; index is [`UpgradeId`].
    #[serde(default)]
    pub upgrades: Vec<UpgradeDef>,
    /// Spells; index is [`SpellId`].
    #[serde(default)]
    pub spells: Vec<SpellDef>,
}

impl Catalog {
    /// Parse a catalog from RON text and check its cross references.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] for malformed text or dangling
    /// idents.
    pub fn from_ron_str(label: &str, text: &str) -> Result<Self> {
        let catalog: Self = ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: label.to_string(),
            message: e.to_string(),
        })?;
        catalog.validate().map_err(|message| GameError::DataParseError {
            path: label.to_string(),
            message,
        })?;
        Ok(catalog)
    }

    /// Check idents are unique and every cross reference resolves.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut seen = BTreeMap::new();
        for (i, t) in self.unit_types.iter().enumerate() {
            if seen.insert(t.ident.as_str(), i).is_some() {
                return Err(format!("duplicate unit type {}", t.ident));
            }
            if t.width == 0 || t.height == 0 {
                return Err(format!("{} has an empty footprint", t.ident));
            }
        }
        for t in &self.unit_types {
            let unit_refs = t.trains.iter().chain(&t.builds).chain(&t.upgrades_to);
            for r in unit_refs {
                if self.unit_type_by_ident(r).is_none() {
                    return Err(format!("{} references unknown unit type {r}", t.ident));
                }
            }
            for r in &t.researches {
                if self.upgrade_by_ident(r).is_none() {
                    return Err(format!("{} references unknown upgrade {r}", t.ident));
                }
            }
            for r in &t.spells {
                if self.spell_by_ident(r).is_none() {
                    return Err(format!("{} references unknown spell {r}", t.ident));
                }
            }
        }
        Ok(())
    }

    /// Add a unit type, returning its id.
    pub fn add_unit_type(&mut self, def: UnitTypeDef) -> UnitTypeId {
        self.unit_types.push(def);
        UnitTypeId(self.unit_types.len() as u32 - 1)
    }

    /// Add an upgrade, returning its id.
    pub fn add_upgrade(&mut self, def: UpgradeDef) -> UpgradeId {
        self.upgrades.push(def);
        UpgradeId(self.upgrades.len() as u32 - 1)
    }

    /// Add a spell, returning its id.
    pub fn add_spell(&mut self, def: SpellDef) -> SpellId {
        self.spells.push(def);
        SpellId(self.spells.len() as u32 - 1)
    }

    /// Look up a unit type.
    #[must_use]
    pub fn unit_type(&self, id: UnitTypeId) -> Option<&UnitTypeDef> {
        self.unit_types.get(id.0 as usize)
    }

    /// Look up an upgrade.
    #[must_use]
    pub fn upgrade(&self, id: UpgradeId) -> Option<&UpgradeDef> {
        self.upgrades.get(id.0 as usize)
    }

    /// Look up a spell.
    #[must_use]
    pub fn spell(&self, id: SpellId) -> Option<&SpellDef> {
        self.spells.get(id.0 as usize)
    }

    /// Resolve a unit type ident.
    #[must_use]
    pub fn unit_type_by_ident(&self, ident: &str) -> Option<UnitTypeId> {
        self.unit_types
            .iter()
            .position(|t| t.ident == ident)
            .map(|i| UnitTypeId(i as u32))
    }

    /// Resolve an upgrade ident.
    #[must_use]
    pub fn upgrade_by_ident(&self, ident: &str) -> Option<UpgradeId> {
        self.upgrades
            .iter()
            .position(|u| u.ident == ident)
            .map(|i| UpgradeId(i as u32))
    }

    /// Resolve a spell ident.
    #[must_use]
    pub fn spell_by_ident(&self, ident: &str) -> Option<SpellId> {
        self.spells
            .iter()
            .position(|s| s.ident == ident)
            .map(|i| SpellId(i as u32))
    }

    /// Ident of a unit type, or `"?"` for an unknown id.
    #[must_use]
    pub fn unit_type_ident(&self, id: UnitTypeId) -> &str {
        self.unit_type(id).map_or("?", |t| t.ident.as_str())
    }
}
