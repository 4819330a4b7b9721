//! Player ledgers: resources, speed modifiers, diplomacy and upgrades.
//!
//! The ledger is the one piece of shared state every production order
//! touches. It is mutated only from the scheduler's single logical thread.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::data::{Catalog, UnitTypeDef, UnitTypeId, UpgradeDef, UpgradeEffect, UpgradeId};
use crate::economy::{Costs, ResourceKind, RESOURCE_COUNT};

/// Player index.
pub type PlayerId = u8;

/// Diplomatic stance towards another player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Diplomacy {
    /// Shares victory, never attacked.
    Allied,
    /// Neither attacked nor helped.
    Neutral,
    /// Attacked on sight.
    Enemy,
    /// Attacks everyone, allies included.
    Crazy,
}

impl Diplomacy {
    /// Command value string.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Allied => "allied",
            Self::Neutral => "neutral",
            Self::Enemy => "enemy",
            Self::Crazy => "crazy",
        }
    }

    /// Parse a command value string.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Allied, Self::Neutral, Self::Enemy, Self::Crazy]
            .into_iter()
            .find(|d| d.name() == name)
    }
}

/// Speed modifiers in percent (100 = normal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpeedModifiers {
    /// Training speed.
    pub train: i32,
    /// Research speed.
    pub research: i32,
    /// Upgrade-to speed.
    pub upgrade: i32,
    /// Construction speed.
    pub build: i32,
    /// Harvest speed per resource kind.
    pub harvest: [i32; RESOURCE_COUNT],
}

impl Default for SpeedModifiers {
    fn default() -> Self {
        Self {
            train: 100,
            research: 100,
            upgrade: 100,
            build: 100,
            harvest: [100; RESOURCE_COUNT],
        }
    }
}

/// One player's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Index.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Stored resources.
    pub resources: Costs,
    /// Controlled by the AI layer.
    pub ai: bool,
    /// Passive owner of neutral buildings.
    pub neutral: bool,
    /// Stance towards other players (missing means neutral).
    pub diplomacy: BTreeMap<PlayerId, Diplomacy>,
    /// Players this one shares vision with.
    pub shared_vision: BTreeSet<PlayerId>,
    /// Acquired upgrades.
    pub upgrades: BTreeSet<UpgradeId>,
    /// Research progress, shared by every building researching for this player.
    pub research_progress: BTreeMap<UpgradeId, u32>,
    /// Speed modifiers.
    pub speed: SpeedModifiers,
    /// Flat bonus added to weapon damage.
    pub damage_bonus: i32,
    /// Maximum number of units.
    pub unit_limit: u32,
    /// Live units per type.
    pub type_counts: BTreeMap<UnitTypeId, u32>,
}

impl Player {
    /// Fresh player with no resources.
    #[must_use]
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            resources: Costs::ZERO,
            ai: false,
            neutral: false,
            diplomacy: BTreeMap::new(),
            shared_vision: BTreeSet::new(),
            upgrades: BTreeSet::new(),
            research_progress: BTreeMap::new(),
            speed: SpeedModifiers::default(),
            damage_bonus: 0,
            unit_limit: 200,
            type_counts: BTreeMap::new(),
        }
    }

    /// Total live units.
    #[must_use]
    pub fn unit_count(&self) -> u32 {
        self.type_counts.values().sum()
    }

    /// Live units of one type.
    #[must_use]
    pub fn count_of(&self, type_id: UnitTypeId) -> u32 {
        self.type_counts.get(&type_id).copied().unwrap_or(0)
    }

    /// Stance towards `other`.
    #[must_use]
    pub fn stance_towards(&self, other: PlayerId) -> Diplomacy {
        if other == self.id {
            return Diplomacy::Allied;
        }
        self.diplomacy
            .get(&other)
            .copied()
            .unwrap_or(Diplomacy::Neutral)
    }

    /// Whether this player attacks units of `other`.
    #[must_use]
    pub fn is_enemy_of(&self, other: PlayerId) -> bool {
        match self.stance_towards(other) {
            Diplomacy::Enemy => true,
            Diplomacy::Crazy => other != self.id,
            Diplomacy::Allied | Diplomacy::Neutral => false,
        }
    }

    /// Current cost of a unit type, including the per-unit growth modifier.
    #[must_use]
    pub fn unit_type_cost(&self, type_id: UnitTypeId, def: &UnitTypeDef) -> Costs {
        if def.cost_growth_percent == 0 {
            return def.costs;
        }
        let owned = i32::try_from(self.count_of(type_id)).unwrap_or(i32::MAX);
        def.costs
            .percent(100_i32.saturating_add(def.cost_growth_percent.saturating_mul(owned)))
    }

    /// Whether the ledger covers `costs`.
    #[must_use]
    pub fn can_afford(&self, costs: &Costs) -> bool {
        costs.affordable_from(&self.resources)
    }

    /// Deduct costs. Callers check [`can_afford`](Self::can_afford) first.
    pub fn spend(&mut self, costs: &Costs) {
        self.resources -= *costs;
    }

    /// Credit a percentage of `costs`.
    pub fn refund(&mut self, costs: &Costs, percent: i32) {
        self.resources += costs.percent(percent);
    }

    /// Credit resources.
    pub fn add_resource(&mut self, kind: ResourceKind, amount: i32) {
        self.resources[kind] += amount;
    }

    /// Whether an upgrade is acquired or in progress.
    #[must_use]
    pub fn upgrade_taken(&self, id: UpgradeId) -> bool {
        self.upgrades.contains(&id) || self.research_progress.contains_key(&id)
    }

    /// Record an acquired upgrade and apply its effects.
    pub fn acquire_upgrade(&mut self, id: UpgradeId, def: &UpgradeDef) {
        self.research_progress.remove(&id);
        if !self.upgrades.insert(id) {
            return;
        }
        for effect in &def.effects {
            match *effect {
                UpgradeEffect::DamageBonus(v) => self.damage_bonus += v,
                UpgradeEffect::TrainSpeed(v) => self.speed.train += v,
                UpgradeEffect::ResearchSpeed(v) => self.speed.research += v,
                UpgradeEffect::BuildSpeed(v) => self.speed.build += v,
                UpgradeEffect::HarvestSpeed(kind, v) => self.speed.harvest[kind.index()] += v,
            }
        }
    }

    pub(crate) fn note_unit_added(&mut self, type_id: UnitTypeId) {
        *self.type_counts.entry(type_id).or_insert(0) += 1;
    }

    pub(crate) fn note_unit_removed(&mut self, type_id: UnitTypeId) {
        if let Some(count) = self.type_counts.get_mut(&type_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.type_counts.remove(&type_id);
            }
        }
    }
}

/// Progress added per tick for a speed modifier and a unit's bonus.
///
/// Progress is counted in hundredths of a work unit; a speed of 100% with
/// no bonus completes one work unit per tick.
#[must_use]
pub fn progress_rate(speed_percent: i32, bonus_percent: i32) -> u32 {
    let rate = i64::from(speed_percent) * i64::from(100 + bonus_percent) / 100;
    u32::try_from(rate.max(1)).unwrap_or(u32::MAX)
}

/// Hundredths of a work unit needed to finish `work` units.
#[must_use]
pub const fn progress_goal(work: u32) -> u32 {
    work.saturating_mul(100)
}

/// All players, indexed by [`PlayerId`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerTable {
    players: Vec<Player>,
}

impl PlayerTable {
    /// Create `count` players named after their index.
    #[must_use]
    pub fn with_players(count: u8) -> Self {
        Self {
            players: (0..count)
                .map(|i| Player::new(i, format!("Player {i}")))
                .collect(),
        }
    }

    /// Append a player; its id must equal the current length.
    pub fn push(&mut self, mut player: Player) -> PlayerId {
        let id = self.players.len() as PlayerId;
        player.id = id;
        self.players.push(player);
        id
    }

    /// Look up a player.
    #[must_use]
    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id as usize)
    }

    /// Look up a player mutably.
    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id as usize)
    }

    /// Number of players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether there are no players.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    /// Whether `a` treats `b` as an enemy.
    #[must_use]
    pub fn hostile(&self, a: PlayerId, b: PlayerId) -> bool {
        self.get(a).is_some_and(|p| p.is_enemy_of(b))
    }

    /// Upgrade definitions referenced by players that no longer exist in `catalog`.
    #[must_use]
    pub fn dangling_upgrades(&self, catalog: &Catalog) -> Vec<UpgradeId> {
        self.players
            .iter()
            .flat_map(|p| p.upgrades.iter().chain(p.research_progress.keys()))
            .filter(|id| catalog.upgrade(**id).is_none())
            .copied()
            .collect()
    }
}
