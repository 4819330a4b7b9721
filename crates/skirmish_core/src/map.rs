//! Tile map layers with terrain and unit occupancy.
//!
//! Each layer is a separate partition of the world; units only travel
//! between layers through connector units.

use serde::{Deserialize, Serialize};

use crate::math::{Footprint, TilePos};
use crate::unit::UnitHandle;

/// Map layer index.
pub type LayerId = u8;

/// Terrain of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellType {
    /// Normal walkable terrain (cost: 1).
    #[default]
    Walkable,
    /// Impassable terrain.
    Blocked,
    /// Slow terrain with double movement cost.
    SlowTerrain,
}

impl CellType {
    /// Step cost, `None` for blocked tiles.
    #[must_use]
    pub const fn movement_cost(self) -> Option<u32> {
        match self {
            Self::Walkable => Some(1),
            Self::Blocked => None,
            Self::SlowTerrain => Some(2),
        }
    }

    /// Returns true if this cell is walkable.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        !matches!(self, Self::Blocked)
    }
}

/// One map layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapLayer {
    width: u32,
    height: u32,
    cells: Vec<CellType>,
    occupants: Vec<Option<UnitHandle>>,
}

impl MapLayer {
    /// Create a fully walkable layer.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width > 0, "MapLayer width must be positive");
        assert!(height > 0, "MapLayer height must be positive");
        let count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            cells: vec![CellType::Walkable; count],
            occupants: vec![None; count],
        }
    }

    /// Width in tiles.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in tiles.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, pos: TilePos) -> Option<usize> {
        if self.in_bounds(pos) {
            Some(pos.y as usize * self.width as usize + pos.x as usize)
        } else {
            None
        }
    }

    /// Whether `pos` is on the layer.
    #[must_use]
    pub fn in_bounds(&self, pos: TilePos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    /// Whether every tile of `fp` is on the layer.
    #[must_use]
    pub fn footprint_in_bounds(&self, fp: Footprint) -> bool {
        self.in_bounds(fp.origin) && self.in_bounds(fp.far_corner())
    }

    /// Terrain at `pos`.
    #[must_use]
    pub fn cell(&self, pos: TilePos) -> Option<CellType> {
        self.index(pos).map(|i| self.cells[i])
    }

    /// Set terrain; returns `false` when out of bounds.
    pub fn set_cell(&mut self, pos: TilePos, cell: CellType) -> bool {
        match self.index(pos) {
            Some(i) => {
                self.cells[i] = cell;
                true
            }
            None => false,
        }
    }

    /// Step cost into `pos`, `None` when blocked or off the layer.
    #[must_use]
    pub fn movement_cost(&self, pos: TilePos) -> Option<u32> {
        self.cell(pos).and_then(CellType::movement_cost)
    }

    /// Unit standing on `pos`.
    #[must_use]
    pub fn occupant(&self, pos: TilePos) -> Option<UnitHandle> {
        self.index(pos).and_then(|i| self.occupants[i])
    }

    /// Whether every tile of `fp` is walkable and free (ignoring `except`).
    #[must_use]
    pub fn footprint_free(&self, fp: Footprint, except: Option<UnitHandle>) -> bool {
        self.footprint_in_bounds(fp)
            && fp.tiles().all(|t| {
                self.cell(t).is_some_and(CellType::is_walkable)
                    && self.occupant(t).map_or(true, |o| Some(o) == except)
            })
    }

    /// Mark `fp` as occupied by `unit`.
    pub fn occupy(&mut self, fp: Footprint, unit: UnitHandle) {
        for t in fp.tiles() {
            if let Some(i) = self.index(t) {
                self.occupants[i] = Some(unit);
            }
        }
    }

    /// Clear tiles of `fp` that `unit` occupies.
    pub fn vacate(&mut self, fp: Footprint, unit: UnitHandle) {
        for t in fp.tiles() {
            if let Some(i) = self.index(t) {
                if self.occupants[i] == Some(unit) {
                    self.occupants[i] = None;
                }
            }
        }
    }

    /// Nearest free origin for a `width` x `height` footprint around `around`.
    ///
    /// Searches rings of growing radius; within a ring tiles are tried in
    /// row-major order so the result is deterministic.
    #[must_use]
    pub fn find_free_spot(
        &self,
        around: Footprint,
        width: u32,
        height: u32,
        max_radius: u32,
    ) -> Option<TilePos> {
        for radius in 1..=max_radius as i32 {
            let far = around.far_corner();
            let min_x = around.origin.x - radius - width as i32 + 1;
            let min_y = around.origin.y - radius - height as i32 + 1;
            let max_x = far.x + radius;
            let max_y = far.y + radius;
            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    let candidate = Footprint::new(TilePos::new(x, y), width, height);
                    if candidate.distance_to(around) != radius as u32 {
                        continue;
                    }
                    if self.footprint_free(candidate, None) {
                        return Some(candidate.origin);
                    }
                }
            }
        }
        None
    }
}

/// All layers of the world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Map {
    layers: Vec<MapLayer>,
}

impl Map {
    /// Map with a single layer.
    #[must_use]
    pub fn single(width: u32, height: u32) -> Self {
        Self {
            layers: vec![MapLayer::new(width, height)],
        }
    }

    /// Append a layer, returning its id.
    pub fn add_layer(&mut self, layer: MapLayer) -> LayerId {
        self.layers.push(layer);
        (self.layers.len() - 1) as LayerId
    }

    /// Look up a layer.
    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<&MapLayer> {
        self.layers.get(id as usize)
    }

    /// Look up a layer mutably.
    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut MapLayer> {
        self.layers.get_mut(id as usize)
    }

    /// Number of layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}
