//! Unit type definitions.

use serde::{Deserialize, Serialize};

use crate::economy::{Costs, ResourceKind};
use crate::math::{option_fixed_serde, Fixed};

/// Weapon statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttackStats {
    /// Base damage per strike.
    pub damage: i32,
    /// Extra random damage in `0..=spread`.
    #[serde(default)]
    pub spread: u32,
    /// Maximum range in tiles.
    pub range: u32,
    /// Minimum range in tiles.
    #[serde(default)]
    pub min_range: u32,
    /// Ticks between strikes.
    pub cooldown: u32,
    /// Ticks the swing animation cannot be interrupted.
    #[serde(default)]
    pub swing_ticks: u32,
    /// The attacker dies on its strike.
    #[serde(default)]
    pub suicide: bool,
}

/// How a worker gathers one resource kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HarvestDef {
    /// Resource kind.
    pub resource: ResourceKind,
    /// Maximum carried amount.
    pub capacity: i32,
    /// Amount taken per harvest step.
    pub step: i32,
    /// Ticks between harvest steps.
    pub wait_at_resource: u32,
    /// Ticks spent inside the depot before dropping off.
    pub wait_at_depot: u32,
}

/// Income produced by units garrisoned in a resource building.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GarrisonIncome {
    /// Resource paid out and drawn from the building's stock.
    pub resource: ResourceKind,
    /// Income per contained unit per minute.
    pub per_unit: i32,
}

/// Data-driven unit type definition.
///
/// # Example RON
///
/// ```ron
/// UnitTypeDef(
///     ident: "unit-peasant",
///     name: "Peasant",
///     hp: 30,
///     speed: Some(1073741824),  // Fixed-point for 0.25 tiles per tick
///     costs: Costs((400, 0, 0, 0)),
///     build_time: 60,
///     harvests: [HarvestDef(
///         resource: Gold, capacity: 100, step: 25,
///         wait_at_resource: 10, wait_at_depot: 5,
///     )],
///     builds: ["unit-farm"],
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitTypeDef {
    /// Unique string identifier, used in logs and saves.
    pub ident: String,

    /// Display name.
    pub name: String,

    /// Footprint width in tiles.
    #[serde(default = "one")]
    pub width: u32,

    /// Footprint height in tiles.
    #[serde(default = "one")]
    pub height: u32,

    /// Maximum hit points.
    pub hp: i32,

    /// Maximum mana.
    #[serde(default)]
    pub max_mana: i32,

    /// Tiles per tick; `None` for stationary units.
    #[serde(default, with = "option_fixed_serde")]
    pub speed: Option<Fixed>,

    /// Whether this is a structure.
    #[serde(default)]
    pub building: bool,

    /// Cost to train, build or upgrade into.
    #[serde(default)]
    pub costs: Costs,

    /// Work units (ticks at 100% speed) to produce.
    #[serde(default)]
    pub build_time: u32,

    /// Cost increase in percent per unit of this type the payer owns.
    #[serde(default)]
    pub cost_growth_percent: i32,

    /// Builders stay outside while constructing.
    #[serde(default)]
    pub builder_outside: bool,

    /// Weapon, if the unit can attack.
    #[serde(default)]
    pub attack: Option<AttackStats>,

    /// Tiles within which idle units notice enemies.
    #[serde(default)]
    pub react_range: u32,

    /// Resources this unit can gather.
    #[serde(default)]
    pub harvests: Vec<HarvestDef>,

    /// Resource this unit is a source of.
    #[serde(default)]
    pub source_of: Option<ResourceKind>,

    /// Initial stock of a source or garrison building.
    #[serde(default)]
    pub starting_stock: i32,

    /// Workers harvest standing next to the source instead of entering it.
    #[serde(default)]
    pub harvest_from_outside: bool,

    /// Resources this building accepts as a depot.
    #[serde(default)]
    pub depot_for: Vec<ResourceKind>,

    /// Transport capacity in units.
    #[serde(default)]
    pub transport_capacity: u32,

    /// Connector between map layers.
    #[serde(default)]
    pub connector: bool,

    /// Market for trade routes.
    #[serde(default)]
    pub market: bool,

    /// Can run trade routes between markets.
    #[serde(default)]
    pub trader: bool,

    /// Hit points restored when this item is used.
    #[serde(default)]
    pub item_heal: i32,

    /// Hit points lost per second.
    #[serde(default)]
    pub decay_per_second: i32,

    /// Hit points restored per second.
    #[serde(default)]
    pub regeneration_per_second: i32,

    /// Mana restored per second.
    #[serde(default)]
    pub mana_regeneration_per_second: i32,

    /// Stock restored per second, up to `max_stock`.
    #[serde(default)]
    pub stock_replenish_per_second: i32,

    /// Stock ceiling for replenishment.
    #[serde(default)]
    pub max_stock: i32,

    /// Experience granted to each contained unit every five seconds.
    #[serde(default)]
    pub garrison_training_xp: i32,

    /// Income paid out for garrisoned units every minute.
    #[serde(default)]
    pub garrison_income: Option<GarrisonIncome>,

    /// Length of the death animation in ticks.
    #[serde(default)]
    pub death_ticks: u32,

    /// Spell idents this unit can cast.
    #[serde(default)]
    pub spells: Vec<String>,

    /// Unit type idents this unit trains.
    #[serde(default)]
    pub trains: Vec<String>,

    /// Unit type idents this unit can build.
    #[serde(default)]
    pub builds: Vec<String>,

    /// Upgrade idents researched here.
    #[serde(default)]
    pub researches: Vec<String>,

    /// Unit type idents this unit can upgrade into.
    #[serde(default)]
    pub upgrades_to: Vec<String>,
}

const fn one() -> u32 {
    1
}

impl UnitTypeDef {
    /// Minimal definition with the given ident and hit points.
    #[must_use]
    pub fn new(ident: impl Into<String>, hp: i32) -> Self {
        let ident = ident.into();
        Self {
            name: ident.clone(),
            ident,
            width: 1,
            height: 1,
            hp,
            max_mana: 0,
            speed: None,
            building: false,
            costs: Costs::ZERO,
            build_time: 0,
            cost_growth_percent: 0,
            builder_outside: false,
            attack: None,
            react_range: 0,
            harvests: Vec::new(),
            source_of: None,
            starting_stock: 0,
            harvest_from_outside: false,
            depot_for: Vec::new(),
            transport_capacity: 0,
            connector: false,
            market: false,
            trader: false,
            item_heal: 0,
            decay_per_second: 0,
            regeneration_per_second: 0,
            mana_regeneration_per_second: 0,
            stock_replenish_per_second: 0,
            max_stock: 0,
            garrison_training_xp: 0,
            garrison_income: None,
            death_ticks: 0,
            spells: Vec::new(),
            trains: Vec::new(),
            builds: Vec::new(),
            researches: Vec::new(),
            upgrades_to: Vec::new(),
        }
    }

    /// Set movement speed.
    #[must_use]
    pub fn with_speed(mut self, speed: Fixed) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Make this a structure of the given size.
    #[must_use]
    pub fn as_building(mut self, width: u32, height: u32) -> Self {
        self.building = true;
        self.width = width;
        self.height = height;
        self
    }

    /// Set cost and production time.
    #[must_use]
    pub fn with_cost(mut self, costs: Costs, build_time: u32) -> Self {
        self.costs = costs;
        self.build_time = build_time;
        self
    }

    /// Set weapon and reaction range.
    #[must_use]
    pub fn with_attack(mut self, attack: AttackStats, react_range: u32) -> Self {
        self.attack = Some(attack);
        self.react_range = react_range;
        self
    }

    /// Whether the unit can move at all.
    #[must_use]
    pub fn can_move(&self) -> bool {
        self.speed.is_some_and(|s| s > Fixed::ZERO)
    }

    /// Harvest parameters for a resource kind.
    #[must_use]
    pub fn harvest(&self, kind: ResourceKind) -> Option<&HarvestDef> {
        self.harvests.iter().find(|h| h.resource == kind)
    }

    /// Whether the building accepts `kind` as a depot.
    #[must_use]
    pub fn is_depot_for(&self, kind: ResourceKind) -> bool {
        self.depot_for.contains(&kind)
    }

    /// Whether this type is an item that can be used.
    #[must_use]
    pub const fn is_item(&self) -> bool {
        self.item_heal > 0
    }
}
