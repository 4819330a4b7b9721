//! Scenario definitions: the starting state of a game as RON data.
//!
//! A scenario names the map layers, the players with their stockpiles and
//! stances, the units placed at the start and the connector pairs linking
//! layers. [`ScenarioDef::build`] turns it into a ready [`Simulation`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::SimConfig;
use crate::context::SimContext;
use crate::data::Catalog;
use crate::economy::{Costs, ResourceKind};
use crate::error::{GameError, Result};
use crate::map::{CellType, LayerId, Map, MapLayer};
use crate::math::{Footprint, TilePos};
use crate::player::{Diplomacy, Player, PlayerId, PlayerTable};
use crate::simulation::Simulation;
use crate::world::World;

/// One map layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDef {
    /// Width in tiles.
    pub width: u32,
    /// Height in tiles.
    pub height: u32,
    /// Impassable tiles.
    #[serde(default)]
    pub blocked: Vec<(i32, i32)>,
    /// Tiles with double movement cost.
    #[serde(default)]
    pub slow: Vec<(i32, i32)>,
}

/// One player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerDef {
    /// Display name.
    pub name: String,
    /// Starting stockpile by resource name.
    pub resources: BTreeMap<String, i32>,
    /// Controlled by the AI.
    pub ai: bool,
    /// Never attacked and never attacking.
    pub neutral: bool,
    /// Stances towards other players; unlisted players are neutral.
    pub diplomacy: BTreeMap<PlayerId, Diplomacy>,
    /// Players this one shares vision with.
    pub shared_vision: Vec<PlayerId>,
    /// Maximum number of units, if not the default.
    pub unit_limit: Option<u32>,
}

/// Units placed at the start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Unit type ident.
    pub unit_type: String,
    /// Owner.
    pub player: PlayerId,
    /// Top-left tile.
    pub x: i32,
    /// Top-left tile.
    pub y: i32,
    /// Layer.
    #[serde(default)]
    pub layer: LayerId,
    /// How many; extra copies go on the nearest free tiles.
    #[serde(default = "one")]
    pub count: u32,
}

const fn one() -> u32 {
    1
}

/// Two connector units leading into each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorPair {
    /// Connector unit type ident.
    pub unit_type: String,
    /// Owner of both ends.
    pub player: PlayerId,
    /// First end: x, y, layer.
    pub a: (i32, i32, LayerId),
    /// Second end: x, y, layer.
    pub b: (i32, i32, LayerId),
}

/// A complete starting state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDef {
    /// Identifier recorded in replays.
    pub id: String,
    /// Seed of the synchronized random stream.
    #[serde(default)]
    pub seed: u32,
    /// Rules; defaults when omitted.
    #[serde(default)]
    pub config: SimConfig,
    /// Map layers, layer 0 first.
    pub layers: Vec<LayerDef>,
    /// Players, player 0 first.
    pub players: Vec<PlayerDef>,
    /// Starting units.
    #[serde(default)]
    pub units: Vec<UnitPlacement>,
    /// Layer connectors.
    #[serde(default)]
    pub connectors: Vec<ConnectorPair>,
}

impl ScenarioDef {
    /// Parse from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] for malformed text.
    pub fn from_ron_str(label: &str, text: &str) -> Result<Self> {
        ron::from_str(text).map_err(|e| GameError::DataParseError {
            path: label.to_string(),
            message: e.to_string(),
        })
    }

    /// Read a RON file.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if the file cannot be read and
    /// [`GameError::DataParseError`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            GameError::InvalidState(format!(
                "Failed to read scenario '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_ron_str(&path.display().to_string(), &text)
    }

    fn map(&self) -> Result<Map> {
        let mut map = Map::default();
        for (index, def) in self.layers.iter().enumerate() {
            if def.width == 0 || def.height == 0 {
                return Err(GameError::InvalidState(format!(
                    "Layer {index} of scenario '{}' has zero size",
                    self.id
                )));
            }
            let mut layer = MapLayer::new(def.width, def.height);
            let cells = def
                .blocked
                .iter()
                .map(|&p| (p, CellType::Blocked))
                .chain(def.slow.iter().map(|&p| (p, CellType::SlowTerrain)));
            for ((x, y), cell) in cells {
                if !layer.set_cell(TilePos::new(x, y), cell) {
                    return Err(GameError::InvalidState(format!(
                        "Tile ({x}, {y}) is outside layer {index}"
                    )));
                }
            }
            map.add_layer(layer);
        }
        if map.layer_count() == 0 {
            return Err(GameError::InvalidState(format!(
                "Scenario '{}' has no layers",
                self.id
            )));
        }
        Ok(map)
    }

    fn players(&self) -> Result<PlayerTable> {
        let count = self.players.len();
        let mut table = PlayerTable::default();
        for def in &self.players {
            let mut player = Player::new(0, def.name.clone());
            for (name, &amount) in &def.resources {
                let kind = ResourceKind::from_name(name).ok_or_else(|| {
                    GameError::InvalidState(format!("Unknown resource '{name}'"))
                })?;
                player.resources[kind] = amount;
            }
            player.ai = def.ai;
            player.neutral = def.neutral;
            for (&other, &stance) in &def.diplomacy {
                if usize::from(other) >= count {
                    return Err(GameError::UnknownPlayer(other));
                }
                player.diplomacy.insert(other, stance);
            }
            for &other in &def.shared_vision {
                if usize::from(other) >= count {
                    return Err(GameError::UnknownPlayer(other));
                }
                player.shared_vision.insert(other);
            }
            if let Some(limit) = def.unit_limit {
                player.unit_limit = limit;
            }
            table.push(player);
        }
        Ok(table)
    }

    /// Build the simulation over `catalog`.
    ///
    /// # Errors
    ///
    /// Fails on an inconsistent catalog, unknown idents or players, tiles
    /// off the map or placements without room.
    pub fn build(&self, catalog: Catalog) -> Result<Simulation> {
        catalog
            .validate()
            .map_err(|e| GameError::InvalidState(format!("Invalid catalog: {e}")))?;
        let map = self.map()?;
        let players = self.players()?;
        let mut ctx = SimContext::new(self.seed, self.config.ticks_per_second);
        let mut world = World::new(map, catalog, players, self.config.clone());

        for placement in &self.units {
            let type_id = world
                .catalog
                .unit_type_by_ident(&placement.unit_type)
                .ok_or_else(|| GameError::UnknownUnitType(placement.unit_type.clone()))?;
            let pos = TilePos::new(placement.x, placement.y);
            let first = world.spawn_unit(&mut ctx, type_id, placement.player, pos, placement.layer)?;
            let near = world
                .footprint(first)
                .unwrap_or_else(|| Footprint::new(pos, 1, 1));
            for _ in 1..placement.count {
                world.spawn_unit_near(&mut ctx, type_id, placement.player, near, placement.layer)?;
            }
        }

        for pair in &self.connectors {
            let type_id = world
                .catalog
                .unit_type_by_ident(&pair.unit_type)
                .ok_or_else(|| GameError::UnknownUnitType(pair.unit_type.clone()))?;
            let (ax, ay, al) = pair.a;
            let (bx, by, bl) = pair.b;
            let a = world.spawn_unit(&mut ctx, type_id, pair.player, TilePos::new(ax, ay), al)?;
            let b = world.spawn_unit(&mut ctx, type_id, pair.player, TilePos::new(bx, by), bl)?;
            if let Some(u) = world.unit_mut(a) {
                u.connection = Some(b);
            }
            if let Some(u) = world.unit_mut(b) {
                u.connection = Some(a);
            }
        }

        tracing::info!(
            scenario = %self.id,
            seed = self.seed,
            units = world.units.len(),
            players = world.players.len(),
            "scenario built"
        );
        // placement events are not part of the game
        ctx.drain_events();
        Ok(Simulation::from_parts(world, ctx))
    }

    /// Starting stockpile of a player.
    #[must_use]
    pub fn starting_resources(&self, player: PlayerId) -> Costs {
        let mut costs = Costs::ZERO;
        if let Some(def) = self.players.get(usize::from(player)) {
            for (name, &amount) in &def.resources {
                if let Some(kind) = ResourceKind::from_name(name) {
                    costs[kind] = amount;
                }
            }
        }
        costs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test_catalog;

    const SCENARIO: &str = r#"(
        id: "two-layer-skirmish",
        seed: 42,
        config: (max_queue_depth: 16),
        layers: [
            (width: 24, height: 24, blocked: [(10, 10), (10, 11)]),
            (width: 16, height: 16),
        ],
        players: [
            (name: "Blue", resources: {"gold": 500}, diplomacy: {1: Enemy}),
            (name: "Red", resources: {"gold": 300, "wood": 50}, ai: true, diplomacy: {0: Enemy}),
        ],
        units: [
            (unit_type: "unit-town-hall", player: 0, x: 2, y: 2),
            (unit_type: "unit-peasant", player: 0, x: 6, y: 2, count: 3),
            (unit_type: "unit-footman", player: 1, x: 4, y: 4, layer: 1),
        ],
        connectors: [
            (unit_type: "unit-portal", player: 0, a: (20, 20, 0), b: (2, 12, 1)),
        ],
    )"#;

    #[test]
    fn test_parse_and_build() {
        let def = ScenarioDef::from_ron_str("scenario", SCENARIO).unwrap();
        assert_eq!(def.units[2].layer, 1);
        assert_eq!(def.units[0].count, 1);
        let (catalog, _) = test_catalog();
        let sim = def.build(catalog).unwrap();
        let world = sim.world();
        assert_eq!(world.units.len(), 1 + 3 + 1 + 2);
        assert_eq!(world.map.layer_count(), 2);
        assert_eq!(world.config.max_queue_depth, 16);
        assert_eq!(world.player(1).unwrap().resources[ResourceKind::Wood], 50);
        assert!(world.players.hostile(0, 1));
        assert_eq!(sim.seed(), 42);
        assert_eq!(
            world.map.layer(0).unwrap().cell(TilePos::new(10, 11)),
            Some(CellType::Blocked)
        );
        let portals: Vec<_> = world
            .units
            .iter()
            .filter(|u| u.connection.is_some())
            .collect();
        assert_eq!(portals.len(), 2);
        assert_eq!(portals[0].connection, Some(portals[1].handle));
    }

    #[test]
    fn test_same_scenario_same_state() {
        let def = ScenarioDef::from_ron_str("scenario", SCENARIO).unwrap();
        let a = def.build(test_catalog().0).unwrap();
        let b = def.build(test_catalog().0).unwrap();
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_unknown_unit_type() {
        let text = SCENARIO.replace("unit-footman", "unit-dragon");
        let def = ScenarioDef::from_ron_str("scenario", &text).unwrap();
        assert!(matches!(
            def.build(test_catalog().0),
            Err(GameError::UnknownUnitType(ident)) if ident == "unit-dragon"
        ));
    }

    #[test]
    fn test_overlapping_units_rejected() {
        let text = SCENARIO.replace("x: 6, y: 2", "x: 3, y: 3");
        let def = ScenarioDef::from_ron_str("scenario", &text).unwrap();
        assert!(matches!(
            def.build(test_catalog().0),
            Err(GameError::NoRoom { .. })
        ));
    }

    #[test]
    fn test_malformed_text() {
        assert!(matches!(
            ScenarioDef::from_ron_str("bad", "(id: 3"),
            Err(GameError::DataParseError { .. })
        ));
    }

    #[test]
    fn test_starting_resources() {
        let def = ScenarioDef::from_ron_str("scenario", SCENARIO).unwrap();
        assert_eq!(def.starting_resources(0), Costs::gold(500));
    }
}
