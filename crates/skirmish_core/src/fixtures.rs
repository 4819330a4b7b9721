//! Shared test fixtures.
//!
//! A small catalog covering every order kind and a two-layer sandbox world
//! with three players: 0 and 1 are enemies, 2 is a neutral trading partner.

use crate::config::SimConfig;
use crate::context::SimContext;
use crate::data::{
    AttackStats, Catalog, GarrisonIncome, HarvestDef, SpellDef, SpellEffect, SpellId,
    UnitTypeDef, UnitTypeId, UpgradeDef, UpgradeEffect, UpgradeId,
};
use crate::economy::{Costs, ResourceKind};
use crate::map::{Map, MapLayer};
use crate::math::Fixed;
use crate::player::{Diplomacy, PlayerTable};
use crate::simulation::Simulation;
use crate::world::World;

/// Seed used by every sandbox.
pub const SANDBOX_SEED: u32 = 0x5EED;

/// Side length of both sandbox layers.
pub const SANDBOX_SIZE: u32 = 32;

/// Ids of the fixture catalog entries.
#[derive(Debug, Clone, Copy)]
pub struct TestTypes {
    /// Town hall: 3x3 depot, trains peasants, upgrades to keep.
    pub hall: UnitTypeId,
    /// Upgraded town hall.
    pub keep: UnitTypeId,
    /// Worker: gathers gold, builds.
    pub peasant: UnitTypeId,
    /// 3x3 gold source.
    pub mine: UnitTypeId,
    /// Trains footmen, researches sharp swords.
    pub barracks: UnitTypeId,
    /// Melee soldier.
    pub footman: UnitTypeId,
    /// Dies on its first strike.
    pub sapper: UnitTypeId,
    /// Carries two units.
    pub transport: UnitTypeId,
    /// Layer connector.
    pub portal: UnitTypeId,
    /// 2x2 market.
    pub market: UnitTypeId,
    /// Trader.
    pub caravan: UnitTypeId,
    /// Healing item.
    pub potion: UnitTypeId,
    /// Spell caster.
    pub mage: UnitTypeId,
    /// 2x2 building put up by an outside builder.
    pub farm: UnitTypeId,
    /// Garrison building paying gold for its occupants.
    pub outpost: UnitTypeId,
    /// Summoned unit that decays.
    pub skeleton: UnitTypeId,
    /// Damage upgrade.
    pub sharp_swords: UpgradeId,
    /// Healing spell.
    pub heal: SpellId,
    /// Damage spell.
    pub fireball: SpellId,
}

fn walker(ident: &str, hp: i32) -> UnitTypeDef {
    UnitTypeDef::new(ident, hp).with_speed(Fixed::ONE)
}

/// Build the fixture catalog.
#[must_use]
pub fn test_catalog() -> (Catalog, TestTypes) {
    let mut catalog = Catalog::default();

    let sharp_swords = catalog.add_upgrade(
        UpgradeDef::new("upgrade-sharp-swords", Costs::gold(100), 30)
            .with_effect(UpgradeEffect::DamageBonus(2)),
    );
    let heal = catalog.add_spell(SpellDef {
        ident: "spell-heal".into(),
        mana_cost: 20,
        range: 4,
        needs_unit: true,
        effect: SpellEffect::Heal(15),
    });
    let fireball = catalog.add_spell(SpellDef {
        ident: "spell-fireball".into(),
        mana_cost: 30,
        range: 4,
        needs_unit: false,
        effect: SpellEffect::Damage(20),
    });

    let mut hall = UnitTypeDef::new("unit-town-hall", 1200)
        .as_building(3, 3)
        .with_cost(Costs::gold(400), 20);
    hall.depot_for = vec![ResourceKind::Gold, ResourceKind::Wood];
    hall.trains = vec!["unit-peasant".into()];
    hall.upgrades_to = vec!["unit-keep".into()];
    hall.death_ticks = 2;
    let hall = catalog.add_unit_type(hall);

    let mut keep = UnitTypeDef::new("unit-keep", 1400)
        .as_building(3, 3)
        .with_cost(Costs::gold(500), 10);
    keep.depot_for = vec![ResourceKind::Gold, ResourceKind::Wood];
    keep.trains = vec!["unit-peasant".into()];
    let keep = catalog.add_unit_type(keep);

    let mut peasant = walker("unit-peasant", 30).with_cost(Costs::gold(50), 5);
    peasant.harvests = vec![HarvestDef {
        resource: ResourceKind::Gold,
        capacity: 20,
        step: 5,
        wait_at_resource: 2,
        wait_at_depot: 2,
    }];
    peasant.builds = vec![
        "unit-town-hall".into(),
        "unit-barracks".into(),
        "unit-farm".into(),
    ];
    peasant.death_ticks = 3;
    let peasant = catalog.add_unit_type(peasant);

    let mut mine = UnitTypeDef::new("unit-gold-mine", 25_500).as_building(3, 3);
    mine.source_of = Some(ResourceKind::Gold);
    mine.starting_stock = 1000;
    let mine = catalog.add_unit_type(mine);

    let mut barracks = UnitTypeDef::new("unit-barracks", 800)
        .as_building(3, 3)
        .with_cost(Costs::gold(300), 10);
    barracks.trains = vec!["unit-footman".into()];
    barracks.researches = vec!["upgrade-sharp-swords".into()];
    let barracks = catalog.add_unit_type(barracks);

    let mut footman = walker("unit-footman", 60)
        .with_cost(Costs::gold(100), 8)
        .with_attack(
            AttackStats {
                damage: 6,
                spread: 3,
                range: 1,
                min_range: 0,
                cooldown: 10,
                swing_ticks: 3,
                suicide: false,
            },
            5,
        );
    footman.death_ticks = 3;
    let footman = catalog.add_unit_type(footman);

    let sapper = catalog.add_unit_type(walker("unit-sapper", 20).with_attack(
        AttackStats {
            damage: 40,
            spread: 0,
            range: 1,
            min_range: 0,
            cooldown: 1,
            swing_ticks: 0,
            suicide: true,
        },
        3,
    ));

    let mut transport = walker("unit-transport", 100);
    transport.transport_capacity = 2;
    let transport = catalog.add_unit_type(transport);

    let mut portal = UnitTypeDef::new("unit-portal", 500).as_building(1, 1);
    portal.connector = true;
    let portal = catalog.add_unit_type(portal);

    let mut market = UnitTypeDef::new("unit-market", 600).as_building(2, 2);
    market.market = true;
    let market = catalog.add_unit_type(market);

    let mut caravan = walker("unit-caravan", 40);
    caravan.trader = true;
    let caravan = catalog.add_unit_type(caravan);

    let mut potion = UnitTypeDef::new("unit-potion", 1);
    potion.item_heal = 20;
    let potion = catalog.add_unit_type(potion);

    let mut mage = walker("unit-mage", 40);
    mage.max_mana = 100;
    mage.mana_regeneration_per_second = 1;
    mage.spells = vec!["spell-heal".into(), "spell-fireball".into()];
    let mage = catalog.add_unit_type(mage);

    let mut farm = UnitTypeDef::new("unit-farm", 400)
        .as_building(2, 2)
        .with_cost(Costs::gold(80), 10);
    farm.builder_outside = true;
    let farm = catalog.add_unit_type(farm);

    let mut outpost = UnitTypeDef::new("unit-outpost", 500).as_building(2, 2);
    outpost.transport_capacity = 4;
    outpost.starting_stock = 10;
    outpost.garrison_training_xp = 2;
    outpost.garrison_income = Some(GarrisonIncome {
        resource: ResourceKind::Gold,
        per_unit: 5,
    });
    let outpost = catalog.add_unit_type(outpost);

    let mut skeleton = walker("unit-skeleton", 15);
    skeleton.decay_per_second = 10;
    let skeleton = catalog.add_unit_type(skeleton);

    let types = TestTypes {
        hall,
        keep,
        peasant,
        mine,
        barracks,
        footman,
        sapper,
        transport,
        portal,
        market,
        caravan,
        potion,
        mage,
        farm,
        outpost,
        skeleton,
        sharp_swords,
        heal,
        fireball,
    };
    (catalog, types)
}

/// Three players; 0 and 1 at war, 2 neutral.
#[must_use]
pub fn test_players() -> PlayerTable {
    let mut players = PlayerTable::with_players(3);
    if let Some(p) = players.get_mut(0) {
        p.diplomacy.insert(1, Diplomacy::Enemy);
    }
    if let Some(p) = players.get_mut(1) {
        p.diplomacy.insert(0, Diplomacy::Enemy);
    }
    if let Some(p) = players.get_mut(2) {
        p.neutral = true;
    }
    players
}

/// Two empty 32x32 layers.
#[must_use]
pub fn test_map() -> Map {
    let mut map = Map::single(SANDBOX_SIZE, SANDBOX_SIZE);
    map.add_layer(MapLayer::new(SANDBOX_SIZE, SANDBOX_SIZE));
    map
}

/// Empty world plus context for driving orders directly.
#[must_use]
pub fn sandbox() -> (World, SimContext, TestTypes) {
    sandbox_with(SimConfig::default())
}

/// [`sandbox`] with custom rules.
#[must_use]
pub fn sandbox_with(config: SimConfig) -> (World, SimContext, TestTypes) {
    let (catalog, types) = test_catalog();
    let ctx = SimContext::new(SANDBOX_SEED, config.ticks_per_second);
    let world = World::new(test_map(), catalog, test_players(), config);
    (world, ctx, types)
}

/// Empty simulation over the sandbox world.
#[must_use]
pub fn sandbox_simulation() -> (Simulation, TestTypes) {
    sandbox_simulation_with(SimConfig::default())
}

/// [`sandbox_simulation`] with custom rules.
#[must_use]
pub fn sandbox_simulation_with(config: SimConfig) -> (Simulation, TestTypes) {
    let (world, ctx, types) = sandbox_with(config);
    (Simulation::from_parts(world, ctx), types)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_consistent() {
        let (catalog, types) = test_catalog();
        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.unit_type_by_ident("unit-peasant"), Some(types.peasant));
    }

    #[test]
    fn test_players_at_war() {
        let players = test_players();
        assert!(players.hostile(0, 1));
        assert!(players.hostile(1, 0));
        assert!(!players.hostile(0, 2));
    }
}
