//! Upgrade (research) definitions.

use serde::{Deserialize, Serialize};

use crate::economy::{Costs, ResourceKind};

/// What acquiring an upgrade changes for the researching player.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UpgradeEffect {
    /// Flat bonus added to every weapon strike.
    DamageBonus(i32),
    /// Percentage points added to training speed.
    TrainSpeed(i32),
    /// Percentage points added to research speed.
    ResearchSpeed(i32),
    /// Percentage points added to construction speed.
    BuildSpeed(i32),
    /// Percentage points added to harvesting speed for one resource.
    HarvestSpeed(ResourceKind, i32),
}

/// Data-driven upgrade definition.
///
/// # Example RON
///
/// ```ron
/// UpgradeDef(
///     ident: "upgrade-sword-1",
///     costs: Costs((800, 0, 0, 0)),
///     research_time: 200,
///     effects: [DamageBonus(2)],
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpgradeDef {
    /// Unique string identifier.
    pub ident: String,
    /// Resources deducted when research starts.
    #[serde(default)]
    pub costs: Costs,
    /// Work units to complete.
    pub research_time: u32,
    /// Effects applied on completion.
    #[serde(default)]
    pub effects: Vec<UpgradeEffect>,
}

impl UpgradeDef {
    /// Upgrade with cost, time and no effects.
    #[must_use]
    pub fn new(ident: impl Into<String>, costs: Costs, research_time: u32) -> Self {
        Self {
            ident: ident.into(),
            costs,
            research_time,
            effects: Vec::new(),
        }
    }

    /// Add an effect.
    #[must_use]
    pub fn with_effect(mut self, effect: UpgradeEffect) -> Self {
        self.effects.push(effect);
        self
    }
}
