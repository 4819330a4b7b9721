//! The mutable world orders execute against.
//!
//! [`World`] bundles the unit table, players, map layers, the loaded
//! catalog and the rules. It also owns the primitives that keep those in
//! step with each other: spawning, map occupancy, containers, transforms
//! and death.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::SimConfig;
use crate::context::SimContext;
use crate::data::{Catalog, UnitTypeDef, UnitTypeId};
use crate::economy::ResourceKind;
use crate::error::{GameError, Result};
use crate::events::GameEvent;
use crate::map::{LayerId, Map};
use crate::math::{Footprint, TilePos};
use crate::order::Order;
use crate::player::{Player, PlayerId, PlayerTable};
use crate::unit::{Unit, UnitHandle, UnitTable};

/// Everything orders read and write besides the simulation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    /// Live units.
    pub units: UnitTable,
    /// Players.
    pub players: PlayerTable,
    /// Map layers.
    pub map: Map,
    /// Unit types, upgrades and spells.
    pub catalog: Catalog,
    /// Rules.
    pub config: SimConfig,
}

impl World {
    /// Assemble a world with no units.
    #[must_use]
    pub fn new(map: Map, catalog: Catalog, players: PlayerTable, config: SimConfig) -> Self {
        Self {
            units: UnitTable::new(),
            players,
            map,
            catalog,
            config,
        }
    }

    /// Resolve a handle.
    #[must_use]
    pub fn unit(&self, handle: UnitHandle) -> Option<&Unit> {
        self.units.get(handle)
    }

    /// Resolve a handle mutably.
    pub fn unit_mut(&mut self, handle: UnitHandle) -> Option<&mut Unit> {
        self.units.get_mut(handle)
    }

    /// Type definition of a unit.
    #[must_use]
    pub fn unit_type(&self, handle: UnitHandle) -> Option<&UnitTypeDef> {
        self.unit(handle)
            .and_then(|u| self.catalog.unit_type(u.type_id))
    }

    /// Type ident of a unit, for diagnostics.
    #[must_use]
    pub fn type_ident(&self, handle: UnitHandle) -> String {
        self.unit(handle).map_or_else(
            || String::from("<gone>"),
            |u| self.catalog.unit_type_ident(u.type_id).to_string(),
        )
    }

    /// Whether the handle resolves to a unit that is not dying.
    #[must_use]
    pub fn is_alive(&self, handle: UnitHandle) -> bool {
        self.unit(handle).is_some_and(|u| !u.dying)
    }

    /// Tiles covered by a unit.
    #[must_use]
    pub fn footprint(&self, handle: UnitHandle) -> Option<Footprint> {
        let unit = self.unit(handle)?;
        let def = self.catalog.unit_type(unit.type_id)?;
        Some(Footprint::new(unit.pos, def.width, def.height))
    }

    /// Gap between two units on the same layer.
    #[must_use]
    pub fn distance_between(&self, a: UnitHandle, b: UnitHandle) -> Option<u32> {
        let (ua, ub) = (self.unit(a)?, self.unit(b)?);
        if ua.layer != ub.layer {
            return None;
        }
        Some(self.footprint(a)?.distance_to(self.footprint(b)?))
    }

    /// Player record.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Player record, mutably.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// Maximum hit points of a unit's type.
    #[must_use]
    pub fn max_hp(&self, handle: UnitHandle) -> i32 {
        self.unit_type(handle).map_or(0, |d| d.hp)
    }

    /// Spawn a unit with its top-left corner exactly at `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnknownUnitType`] or [`GameError::NoRoom`].
    pub fn spawn_unit(
        &mut self,
        ctx: &mut SimContext,
        type_id: UnitTypeId,
        player: PlayerId,
        pos: TilePos,
        layer: LayerId,
    ) -> Result<UnitHandle> {
        let def = self
            .catalog
            .unit_type(type_id)
            .ok_or_else(|| GameError::UnknownUnitType(format!("{type_id:?}")))?;
        let fp = Footprint::new(pos, def.width, def.height);
        let free = self
            .map
            .layer(layer)
            .is_some_and(|l| l.footprint_free(fp, None));
        if !free {
            return Err(GameError::NoRoom {
                unit_type: def.ident.clone(),
                x: pos.x,
                y: pos.y,
                layer,
            });
        }
        self.ensure_player(player)?;
        Ok(self.insert_unit(ctx, type_id, player, pos, layer))
    }

    /// Spawn a unit on the nearest free spot around `near`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UnknownUnitType`] or [`GameError::NoRoom`].
    pub fn spawn_unit_near(
        &mut self,
        ctx: &mut SimContext,
        type_id: UnitTypeId,
        player: PlayerId,
        near: Footprint,
        layer: LayerId,
    ) -> Result<UnitHandle> {
        let def = self
            .catalog
            .unit_type(type_id)
            .ok_or_else(|| GameError::UnknownUnitType(format!("{type_id:?}")))?;
        let (width, height) = (def.width, def.height);
        let spot = self.map.layer(layer).and_then(|l| {
            l.find_free_spot(near, width, height, self.config.drop_out_radius)
        });
        let Some(spot) = spot else {
            return Err(GameError::NoRoom {
                unit_type: def.ident.clone(),
                x: near.origin.x,
                y: near.origin.y,
                layer,
            });
        };
        self.ensure_player(player)?;
        Ok(self.insert_unit(ctx, type_id, player, spot, layer))
    }

    fn ensure_player(&self, player: PlayerId) -> Result<()> {
        if self.players.get(player).is_some() {
            Ok(())
        } else {
            Err(GameError::UnknownPlayer(player))
        }
    }

    fn insert_unit(
        &mut self,
        ctx: &mut SimContext,
        type_id: UnitTypeId,
        player: PlayerId,
        pos: TilePos,
        layer: LayerId,
    ) -> UnitHandle {
        let (hp, mana, stock, width, height) = self.catalog.unit_type(type_id).map_or(
            (1, 0, 0, 1, 1),
            |d| (d.hp, d.max_mana, d.starting_stock, d.width, d.height),
        );
        let handle = self.units.insert_with(|h| {
            let mut unit = Unit::new(h, type_id, player, pos, layer, hp);
            unit.mana = mana;
            unit.resource_stock = stock;
            unit
        });
        if let Some(l) = self.map.layer_mut(layer) {
            l.occupy(Footprint::new(pos, width, height), handle);
        }
        if let Some(p) = self.players.get_mut(player) {
            p.note_unit_added(type_id);
        }
        ctx.emit(GameEvent::UnitCreated {
            unit: handle,
            unit_type: type_id,
            player,
        });
        tracing::trace!(unit = %handle, player, "unit created");
        handle
    }

    /// Take a unit off the map; it keeps its position for later placement.
    pub fn remove_from_map(&mut self, handle: UnitHandle) {
        let Some(fp) = self.footprint(handle) else {
            return;
        };
        let Some(unit) = self.units.get_mut(handle) else {
            return;
        };
        if unit.removed {
            return;
        }
        unit.removed = true;
        unit.clear_path();
        let layer = unit.layer;
        if let Some(l) = self.map.layer_mut(layer) {
            l.vacate(fp, handle);
        }
    }

    /// Put a removed unit back on the map at `pos`. Fails if occupied.
    pub fn place_at(&mut self, handle: UnitHandle, pos: TilePos, layer: LayerId) -> bool {
        let Some(def) = self.unit_type(handle) else {
            return false;
        };
        let fp = Footprint::new(pos, def.width, def.height);
        let free = self
            .map
            .layer(layer)
            .is_some_and(|l| l.footprint_free(fp, Some(handle)));
        if !free {
            return false;
        }
        if let Some(unit) = self.units.get_mut(handle) {
            unit.pos = pos;
            unit.layer = layer;
            unit.removed = false;
        }
        if let Some(l) = self.map.layer_mut(layer) {
            l.occupy(fp, handle);
        }
        true
    }

    /// Move a unit on the map by one step, keeping occupancy current.
    pub fn step_unit(&mut self, handle: UnitHandle, to: TilePos) {
        let Some(fp) = self.footprint(handle) else {
            return;
        };
        let Some(unit) = self.units.get_mut(handle) else {
            return;
        };
        unit.pos = to;
        let layer = unit.layer;
        if let Some(l) = self.map.layer_mut(layer) {
            l.vacate(fp, handle);
            l.occupy(Footprint::new(to, fp.width, fp.height), handle);
        }
    }

    /// Move `handle` inside `container`.
    pub fn enter_container(&mut self, handle: UnitHandle, container: UnitHandle) {
        self.remove_from_map(handle);
        if let Some(unit) = self.units.get_mut(handle) {
            unit.container = Some(container);
        }
        if let Some(outer) = self.units.get_mut(container) {
            if !outer.contents.contains(&handle) {
                outer.contents.push(handle);
            }
        }
    }

    fn unlink_container(&mut self, handle: UnitHandle) {
        let container = self.units.get_mut(handle).and_then(|u| u.container.take());
        if let Some(outer) = container.and_then(|c| self.units.get_mut(c)) {
            outer.contents.retain(|c| *c != handle);
        }
    }

    /// Place a removed unit on a free tile next to its container (or its
    /// own last position). Returns `false` when no tile is free; the unit
    /// then stays where it is.
    pub fn drop_out(&mut self, handle: UnitHandle) -> bool {
        let Some(unit) = self.unit(handle) else {
            return false;
        };
        if !unit.removed {
            return true;
        }
        let (near, layer) = unit
            .container
            .and_then(|c| Some((self.footprint(c)?, self.unit(c)?.layer)))
            .unwrap_or((Footprint::tile(unit.pos), unit.layer));
        self.drop_out_near(handle, near, layer)
    }

    /// Place a removed unit on a free tile around `near`.
    pub fn drop_out_near(&mut self, handle: UnitHandle, near: Footprint, layer: LayerId) -> bool {
        let Some(def) = self.unit_type(handle) else {
            return false;
        };
        let (width, height) = (def.width, def.height);
        let spot = self.map.layer(layer).and_then(|l| {
            l.find_free_spot(near, width, height, self.config.drop_out_radius)
        });
        let Some(spot) = spot else {
            return false;
        };
        self.unlink_container(handle);
        self.place_at(handle, spot, layer)
    }

    /// Drop out every unit inside `container`, returning those that found no room.
    pub fn drop_out_all(&mut self, container: UnitHandle) -> Vec<UnitHandle> {
        let contents = self
            .unit(container)
            .map(|u| u.contents.clone())
            .unwrap_or_default();
        contents
            .into_iter()
            .filter(|c| !self.drop_out(*c))
            .collect()
    }

    /// Start a unit's death sequence.
    ///
    /// All held orders are cancelled (refunding whatever they reserved) and
    /// replaced by a single die order. The unit stops blocking its tiles
    /// but stays resolvable until the die order releases it. Units inside
    /// die with it.
    pub fn let_unit_die(&mut self, handle: UnitHandle, ctx: &mut SimContext) {
        let Some(unit) = self.units.get(handle) else {
            return;
        };
        if unit.dying {
            return;
        }
        let death_ticks = self
            .catalog
            .unit_type(unit.type_id)
            .map_or(0, |d| d.death_ticks);
        let player = unit.player;
        let removed = unit.removed;
        let layer = unit.layer;
        let fp = self.footprint(handle);

        let orders = match self.units.get_mut(handle) {
            Some(unit) => {
                unit.dying = true;
                unit.wait = 0;
                unit.anim_ticks = 0;
                unit.stun_ticks = 0;
                unit.clear_path();
                unit.orders.replace_all(Order::die(death_ticks))
            }
            None => return,
        };
        if !removed {
            if let (Some(fp), Some(l)) = (fp, self.map.layer_mut(layer)) {
                l.vacate(fp, handle);
            }
        }
        for mut order in orders {
            order.cancel(handle, self, ctx);
        }
        // cancel hooks may have let a builder out
        let contents = self
            .unit(handle)
            .map(|u| u.contents.clone())
            .unwrap_or_default();
        for inner in contents {
            self.let_unit_die(inner, ctx);
            self.release_unit(inner, ctx);
        }
        ctx.emit(GameEvent::UnitDied {
            unit: handle,
            player,
        });
        tracing::debug!(unit = %handle, player, "unit dying");
    }

    /// Remove a unit from the world for good and retire its handle.
    pub fn release_unit(&mut self, handle: UnitHandle, ctx: &mut SimContext) {
        if !self.units.contains(handle) {
            return;
        }
        if self.is_alive(handle) {
            self.let_unit_die(handle, ctx);
        }
        let contents = self
            .unit(handle)
            .map(|u| u.contents.clone())
            .unwrap_or_default();
        for inner in contents {
            self.let_unit_die(inner, ctx);
            self.release_unit(inner, ctx);
        }
        self.unlink_container(handle);
        if let (Some(fp), Some(unit)) = (self.footprint(handle), self.units.get(handle)) {
            let layer = unit.layer;
            if let Some(l) = self.map.layer_mut(layer) {
                l.vacate(fp, handle);
            }
        }
        if let Some(unit) = self.units.remove(handle) {
            if let Some(p) = self.players.get_mut(unit.player) {
                p.note_unit_removed(unit.type_id);
            }
            ctx.emit(GameEvent::UnitRemoved { unit: handle });
            tracing::trace!(unit = %handle, "unit released");
        }
    }

    /// Apply damage; returns `true` if the hit was lethal.
    pub fn hit_unit(&mut self, target: UnitHandle, damage: i32, ctx: &mut SimContext) -> bool {
        let Some(unit) = self.units.get_mut(target) else {
            return false;
        };
        if unit.dying {
            return false;
        }
        unit.hp -= damage.max(0);
        if unit.hp <= 0 {
            self.let_unit_die(target, ctx);
            true
        } else {
            false
        }
    }

    /// Restore hit points up to the type maximum.
    pub fn heal_unit(&mut self, target: UnitHandle, amount: i32) {
        let max = self.max_hp(target);
        if let Some(unit) = self.units.get_mut(target) {
            unit.hp = (unit.hp + amount).min(max);
        }
    }

    /// Change a unit's type in place, scaling hit points to the new maximum.
    ///
    /// Fails when the new footprint does not fit.
    pub fn transform_unit(
        &mut self,
        handle: UnitHandle,
        new_type: UnitTypeId,
        ctx: &mut SimContext,
    ) -> bool {
        let Some(unit) = self.unit(handle) else {
            return false;
        };
        let (old_type, pos, layer, removed, hp, player) =
            (unit.type_id, unit.pos, unit.layer, unit.removed, unit.hp, unit.player);
        let (Some(old_def), Some(new_def)) =
            (self.catalog.unit_type(old_type), self.catalog.unit_type(new_type))
        else {
            return false;
        };
        let old_fp = Footprint::new(pos, old_def.width, old_def.height);
        let new_fp = Footprint::new(pos, new_def.width, new_def.height);
        let new_hp = if old_def.hp > 0 {
            (i64::from(hp) * i64::from(new_def.hp) / i64::from(old_def.hp)).max(1) as i32
        } else {
            new_def.hp
        };
        let new_mana_cap = new_def.max_mana;
        if !removed {
            let Some(l) = self.map.layer_mut(layer) else {
                return false;
            };
            if !l.footprint_free(new_fp, Some(handle)) {
                return false;
            }
            l.vacate(old_fp, handle);
            l.occupy(new_fp, handle);
        }
        if let Some(unit) = self.units.get_mut(handle) {
            unit.type_id = new_type;
            unit.hp = new_hp;
            unit.mana = unit.mana.min(new_mana_cap);
        }
        if let Some(p) = self.players.get_mut(player) {
            p.note_unit_removed(old_type);
            p.note_unit_added(new_type);
        }
        ctx.emit(GameEvent::TypeChanged {
            unit: handle,
            unit_type: new_type,
        });
        true
    }

    /// Nearest on-map, living unit within `radius` of `area` accepted by
    /// `filter`. Ties go to the lowest slot.
    pub fn nearest_unit(
        &self,
        area: Footprint,
        layer: LayerId,
        radius: u32,
        filter: impl Fn(&Unit, &UnitTypeDef) -> bool,
    ) -> Option<UnitHandle> {
        self.units
            .iter()
            .filter(|u| !u.removed && !u.dying && u.layer == layer)
            .filter_map(|u| {
                let def = self.catalog.unit_type(u.type_id)?;
                if !filter(u, def) {
                    return None;
                }
                let d = area.distance_to(Footprint::new(u.pos, def.width, def.height));
                (d <= radius).then_some((d, u.handle))
            })
            .min_by_key(|(d, h)| (*d, h.slot))
            .map(|(_, h)| h)
    }

    /// Nearest hostile unit within `radius`.
    #[must_use]
    pub fn nearest_enemy(&self, handle: UnitHandle, radius: u32) -> Option<UnitHandle> {
        let unit = self.unit(handle)?;
        let fp = self.footprint(handle)?;
        let player = unit.player;
        self.nearest_unit(fp, unit.layer, radius, |other, _| {
            other.handle != handle && self.players.hostile(player, other.player)
        })
    }

    /// Nearest finished depot of the unit's owner accepting `kind`.
    #[must_use]
    pub fn nearest_depot(&self, handle: UnitHandle, kind: ResourceKind) -> Option<UnitHandle> {
        let unit = self.unit(handle)?;
        let near = self
            .footprint(unit.container.unwrap_or(handle))
            .unwrap_or_else(|| Footprint::tile(unit.pos));
        let player = unit.player;
        self.nearest_unit(near, unit.layer, self.config.depot_search_radius, |u, def| {
            u.player == player && !u.under_construction && def.is_depot_for(kind)
        })
    }

    /// Nearest non-empty source of `kind` around `area`.
    #[must_use]
    pub fn nearest_source(
        &self,
        area: Footprint,
        layer: LayerId,
        kind: ResourceKind,
    ) -> Option<UnitHandle> {
        self.nearest_unit(area, layer, self.config.resource_search_radius, |u, def| {
            def.source_of == Some(kind) && !u.under_construction && u.resource_stock > 0
        })
    }

    /// Recount how many held orders reference each unit.
    pub fn recount_refs(&mut self) {
        let mut counts: BTreeMap<UnitHandle, u32> = BTreeMap::new();
        for unit in self.units.iter() {
            for (_, order) in unit.orders.slots() {
                if let Some(goal) = order.head.goal.filter(|g| self.units.contains(*g)) {
                    *counts.entry(goal).or_insert(0) += 1;
                }
            }
        }
        for unit in self.units.iter_mut() {
            unit.refs = counts.get(&unit.handle).copied().unwrap_or(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sandbox, TestTypes};

    #[test]
    fn test_spawn_occupies_footprint() {
        let (mut world, mut ctx, types) = sandbox();
        let hall = world
            .spawn_unit(&mut ctx, types.hall, 0, TilePos::new(2, 2), 0)
            .unwrap();
        let layer = world.map.layer(0).unwrap();
        assert_eq!(layer.occupant(TilePos::new(3, 3)), Some(hall));
        assert_eq!(world.player(0).unwrap().count_of(types.hall), 1);
        assert!(world
            .spawn_unit(&mut ctx, types.peasant, 0, TilePos::new(3, 3), 0)
            .is_err());
    }

    #[test]
    fn test_let_unit_die_installs_die_order_and_frees_tile() {
        let (mut world, mut ctx, types) = sandbox();
        let peasant = world
            .spawn_unit(&mut ctx, types.peasant, 0, TilePos::new(1, 1), 0)
            .unwrap();
        world.let_unit_die(peasant, &mut ctx);
        let unit = world.unit(peasant).unwrap();
        assert!(unit.dying);
        assert_eq!(unit.current_action(), crate::order::Action::Die);
        assert!(!world.is_alive(peasant));
        assert_eq!(world.map.layer(0).unwrap().occupant(TilePos::new(1, 1)), None);
    }

    #[test]
    fn test_release_kills_contents() {
        let (mut world, mut ctx, types) = sandbox();
        let boat = world
            .spawn_unit(&mut ctx, types.transport, 0, TilePos::new(5, 5), 0)
            .unwrap();
        let rider = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(6, 5), 0)
            .unwrap();
        world.enter_container(rider, boat);
        world.let_unit_die(boat, &mut ctx);
        world.release_unit(boat, &mut ctx);
        assert!(world.unit(boat).is_none());
        assert!(world.unit(rider).is_none());
        assert_eq!(world.player(0).unwrap().unit_count(), 0);
    }

    #[test]
    fn test_drop_out_next_to_container() {
        let (mut world, mut ctx, types) = sandbox();
        let hall = world
            .spawn_unit(&mut ctx, types.hall, 0, TilePos::new(4, 4), 0)
            .unwrap();
        let peasant = world
            .spawn_unit(&mut ctx, types.peasant, 0, TilePos::new(0, 0), 0)
            .unwrap();
        world.enter_container(peasant, hall);
        assert!(world.unit(peasant).unwrap().removed);
        assert!(world.drop_out(peasant));
        let unit = world.unit(peasant).unwrap();
        assert!(!unit.removed);
        assert_eq!(unit.container, None);
        let hall_fp = world.footprint(hall).unwrap();
        assert_eq!(hall_fp.distance_to_tile(unit.pos), 1);
        assert!(world.unit(hall).unwrap().contents.is_empty());
    }

    #[test]
    fn test_nearest_enemy_prefers_distance_then_slot() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(5, 5), 0)
            .unwrap();
        let far = world
            .spawn_unit(&mut ctx, types.footman, 1, TilePos::new(9, 5), 0)
            .unwrap();
        let near_a = world
            .spawn_unit(&mut ctx, types.footman, 1, TilePos::new(7, 5), 0)
            .unwrap();
        let _near_b = world
            .spawn_unit(&mut ctx, types.footman, 1, TilePos::new(3, 5), 0)
            .unwrap();
        assert_eq!(world.nearest_enemy(me, 6), Some(near_a));
        assert_ne!(world.nearest_enemy(me, 6), Some(far));
        assert_eq!(world.nearest_enemy(me, 1), None);
    }

    #[test]
    fn test_recount_refs() {
        let (mut world, mut ctx, types) = sandbox();
        let a = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        let b = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(3, 1), 0)
            .unwrap();
        world
            .unit_mut(a)
            .unwrap()
            .orders
            .replace_active(Order::follow(b, TilePos::new(3, 1), 0));
        world.recount_refs();
        assert_eq!(world.unit(b).unwrap().refs, 1);
        assert_eq!(world.unit(a).unwrap().refs, 0);
    }
}
