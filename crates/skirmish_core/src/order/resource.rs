//! Resource gathering and returning goods.
//!
//! A worker walks to a source, harvests in steps until it is full or the
//! source runs dry, carries the load to the nearest depot of its owner,
//! waits inside while dropping off and heads back. Return-goods runs the
//! depot half of the same machine and finishes after one drop-off.

use serde::{Deserialize, Serialize};

use super::{Action, OrderHead, OrderStatus};
use crate::context::SimContext;
use crate::data::HarvestDef;
use crate::economy::ResourceKind;
use crate::error::OrderFault;
use crate::events::GameEvent;
use crate::map::LayerId;
use crate::math::{Footprint, TilePos};
use crate::movement;
use crate::pathfinding::{PathRequest, PathStatus};
use crate::unit::UnitHandle;
use crate::world::World;

/// How many times a worker looks for another source before giving up.
const MAX_SOURCE_RETRIES: u32 = 3;

/// Phase of a gather order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatherState {
    /// Choosing a source.
    Initializing,
    /// Walking to the source.
    MovingToResource,
    /// Harvesting at or inside the source.
    Gathering,
    /// Carrying the load to a depot.
    MovingToDepot,
    /// Inside the depot, unloading.
    WaitingAtDepot,
    /// Crediting the load and leaving the depot.
    DroppingOff,
    /// Looking for another source after a failure.
    GivingUp,
}

/// Gather or return-goods state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOrder {
    /// Resource kind gathered.
    pub kind: ResourceKind,
    /// Current phase.
    pub state: GatherState,
    /// Source being harvested.
    pub mine: Option<UnitHandle>,
    /// Where the last source was, for finding a replacement.
    pub resource_pos: TilePos,
    /// Layer of the last source.
    pub resource_layer: LayerId,
    /// Depot goods are carried to.
    pub depot: Option<UnitHandle>,
    /// Ticks until the next harvest step or the end of a depot visit.
    pub time_to_harvest: u32,
    /// Source searches so far.
    pub attempts: u32,
}

impl ResourceOrder {
    /// Fresh state for `kind` starting in `state`.
    #[must_use]
    pub const fn new(kind: ResourceKind, state: GatherState) -> Self {
        Self {
            kind,
            state,
            mine: None,
            resource_pos: TilePos::new(0, 0),
            resource_layer: 0,
            depot: None,
            time_to_harvest: 0,
            attempts: 0,
        }
    }
}

fn action_of(returning: bool) -> Action {
    if returning {
        Action::ReturnGoods
    } else {
        Action::Resource
    }
}

pub(super) fn execute(
    head: &mut OrderHead,
    r: &mut ResourceOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
    returning: bool,
) -> Result<OrderStatus, OrderFault> {
    let action = action_of(returning);
    let u = world
        .unit(unit)
        .ok_or(OrderFault::UnitVanished { action, unit })?;
    let (held, carried) = (u.resources_held, u.carried_resource);
    let Some(harvest) = world.unit_type(unit).and_then(|d| d.harvest(r.kind)).cloned() else {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    };
    if returning && held == 0 && r.state == GatherState::MovingToDepot {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    }
    if !returning && held > 0 && carried != Some(r.kind) {
        // switching resources drops the old load
        if let Some(u) = world.unit_mut(unit) {
            u.resources_held = 0;
            u.carried_resource = None;
        }
    }

    match r.state {
        GatherState::Initializing => {
            initialize(head, r, unit, world, &harvest);
            Ok(OrderStatus::Continue)
        }
        GatherState::MovingToResource => move_to_resource(r, unit, world, ctx, &harvest),
        GatherState::Gathering => gather(r, unit, world, ctx, &harvest),
        GatherState::MovingToDepot => move_to_depot(r, unit, world, ctx, &harvest),
        GatherState::WaitingAtDepot => {
            if r.time_to_harvest > 0 {
                r.time_to_harvest -= 1;
            } else {
                r.state = GatherState::DroppingOff;
            }
            Ok(OrderStatus::Continue)
        }
        GatherState::DroppingOff => {
            drop_off(head, r, unit, world, ctx, returning);
            Ok(OrderStatus::Continue)
        }
        GatherState::GivingUp => {
            give_up(head, r, unit, world, ctx);
            Ok(OrderStatus::Continue)
        }
    }
}

fn is_source(world: &World, h: UnitHandle, kind: ResourceKind) -> bool {
    world.is_alive(h)
        && world
            .unit(h)
            .is_some_and(|u| !u.under_construction && u.resource_stock > 0)
        && world.unit_type(h).is_some_and(|d| d.source_of == Some(kind))
}

fn initialize(
    head: &OrderHead,
    r: &mut ResourceOrder,
    unit: UnitHandle,
    world: &World,
    harvest: &HarvestDef,
) {
    let held = world.unit(unit).map_or(0, |u| u.resources_held);
    let mine = head
        .live_goal(world)
        .filter(|g| is_source(world, *g, r.kind))
        .or_else(|| {
            world.nearest_source(Footprint::tile(head.goal_pos), head.goal_layer, r.kind)
        });
    if let Some((pos, layer)) = mine.and_then(|m| world.unit(m)).map(|m| (m.pos, m.layer)) {
        r.resource_pos = pos;
        r.resource_layer = layer;
    } else {
        r.resource_pos = head.goal_pos;
        r.resource_layer = head.goal_layer;
    }
    r.mine = mine;
    r.state = if held >= harvest.capacity {
        GatherState::MovingToDepot
    } else if mine.is_some() {
        GatherState::MovingToResource
    } else {
        GatherState::GivingUp
    };
    tracing::trace!(unit = %unit, state = ?r.state, "gather initialized");
}

fn move_to_resource(
    r: &mut ResourceOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
    harvest: &HarvestDef,
) -> Result<OrderStatus, OrderFault> {
    let Some(mine) = r.mine.filter(|m| is_source(world, *m, r.kind)) else {
        r.state = GatherState::GivingUp;
        return Ok(OrderStatus::Continue);
    };
    let (Some(area), Some(layer)) = (world.footprint(mine), world.unit(mine).map(|m| m.layer))
    else {
        r.state = GatherState::GivingUp;
        return Ok(OrderStatus::Continue);
    };
    let request = PathRequest::to_area(area, layer, 1, 1);
    match movement::step(world, ctx, unit, &request) {
        PathStatus::Arrived => {
            let outside = world
                .unit_type(mine)
                .is_some_and(|d| d.harvest_from_outside);
            if !outside {
                world.enter_container(unit, mine);
            }
            r.time_to_harvest = harvest_wait(world, unit, r.kind, harvest.wait_at_resource);
            r.state = GatherState::Gathering;
            tracing::trace!(unit = %unit, mine = %mine, "started gathering");
        }
        PathStatus::Unreachable => r.state = GatherState::GivingUp,
        PathStatus::Computing | PathStatus::Moving | PathStatus::Blocked => {}
    }
    Ok(OrderStatus::Continue)
}

/// Ticks between harvest steps under the owner's harvest speed.
fn harvest_wait(world: &World, unit: UnitHandle, kind: ResourceKind, base: u32) -> u32 {
    let speed = world
        .unit(unit)
        .and_then(|u| world.player(u.player))
        .map_or(100, |p| p.speed.harvest[kind.index()])
        .max(1);
    let scaled = u64::from(base) * 100 / speed as u64;
    u32::try_from(scaled).unwrap_or(u32::MAX)
}

fn gather(
    r: &mut ResourceOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
    harvest: &HarvestDef,
) -> Result<OrderStatus, OrderFault> {
    let Some(mine) = r.mine.filter(|m| world.is_alive(*m)) else {
        leave_source(world, unit);
        let held = world.unit(unit).map_or(0, |u| u.resources_held);
        r.state = if held > 0 {
            GatherState::MovingToDepot
        } else {
            GatherState::GivingUp
        };
        return Ok(OrderStatus::Continue);
    };
    if r.time_to_harvest > 0 {
        r.time_to_harvest -= 1;
        return Ok(OrderStatus::Continue);
    }

    let stock = world.unit(mine).map_or(0, |m| m.resource_stock);
    let held = world.unit(unit).map_or(0, |u| u.resources_held);
    let amount = harvest.step.min(harvest.capacity - held).min(stock).max(0);
    if let Some(m) = world.unit_mut(mine) {
        m.resource_stock -= amount;
    }
    let held = held + amount;
    if let Some(u) = world.unit_mut(unit) {
        u.resources_held = held;
        u.carried_resource = Some(r.kind);
    }
    let exhausted = stock - amount <= 0;
    if exhausted {
        exhaust_source(world, ctx, mine);
    }
    if exhausted || held >= harvest.capacity {
        leave_source(world, unit);
        r.state = GatherState::MovingToDepot;
        tracing::trace!(unit = %unit, held, exhausted, "load ready");
    } else {
        r.time_to_harvest = harvest_wait(world, unit, r.kind, harvest.wait_at_resource);
    }
    Ok(OrderStatus::Continue)
}

/// Empty a source: everyone inside is let out and the source is destroyed.
fn exhaust_source(world: &mut World, ctx: &mut SimContext, mine: UnitHandle) {
    ctx.emit(GameEvent::SourceExhausted { source: mine });
    let stuck = world.drop_out_all(mine);
    if !stuck.is_empty() {
        tracing::warn!(mine = %mine, stuck = stuck.len(), "workers trapped in exhausted source");
    }
    world.let_unit_die(mine, ctx);
    tracing::debug!(mine = %mine, "source exhausted");
}

fn leave_source(world: &mut World, unit: UnitHandle) {
    if world.unit(unit).is_some_and(|u| u.removed) {
        world.drop_out(unit);
    }
}

fn move_to_depot(
    r: &mut ResourceOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
    harvest: &HarvestDef,
) -> Result<OrderStatus, OrderFault> {
    leave_source(world, unit);
    let depot = r
        .depot
        .filter(|d| world.is_alive(*d))
        .filter(|d| world.unit_type(*d).is_some_and(|t| t.is_depot_for(r.kind)))
        .or_else(|| world.nearest_depot(unit, r.kind));
    let Some(depot) = depot else {
        if let Some(player) = world.unit(unit).map(|u| u.player) {
            ctx.notify(player, format!("no depot for {}", r.kind));
        }
        r.state = GatherState::GivingUp;
        return Ok(OrderStatus::Continue);
    };
    r.depot = Some(depot);
    let (Some(area), Some(layer)) = (world.footprint(depot), world.unit(depot).map(|d| d.layer))
    else {
        r.state = GatherState::GivingUp;
        return Ok(OrderStatus::Continue);
    };
    let request = PathRequest::to_area(area, layer, 1, 1);
    match movement::step(world, ctx, unit, &request) {
        PathStatus::Arrived => {
            world.enter_container(unit, depot);
            r.time_to_harvest = harvest.wait_at_depot;
            r.state = GatherState::WaitingAtDepot;
        }
        PathStatus::Unreachable => {
            r.depot = None;
            r.state = GatherState::GivingUp;
        }
        PathStatus::Computing | PathStatus::Moving | PathStatus::Blocked => {}
    }
    Ok(OrderStatus::Continue)
}

fn drop_off(
    head: &mut OrderHead,
    r: &mut ResourceOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
    returning: bool,
) {
    let Some(u) = world.unit_mut(unit) else {
        return;
    };
    let (player, amount) = (u.player, u.resources_held);
    u.resources_held = 0;
    u.carried_resource = None;
    if amount > 0 {
        if let Some(p) = world.player_mut(player) {
            p.add_resource(r.kind, amount);
        }
        ctx.emit(GameEvent::ResourcesDelivered {
            unit,
            player,
            resource: r.kind,
            amount,
        });
        tracing::debug!(unit = %unit, player, amount, kind = %r.kind, "resources delivered");
    }
    if world.unit(unit).is_some_and(|u| u.removed) && !world.drop_out(unit) {
        // depot surrounded; try again next tick
        return;
    }
    if returning {
        head.finished = true;
        return;
    }
    r.state = if r.mine.is_some_and(|m| is_source(world, m, r.kind)) {
        GatherState::MovingToResource
    } else {
        r.mine = None;
        GatherState::GivingUp
    };
}

fn give_up(
    head: &mut OrderHead,
    r: &mut ResourceOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) {
    leave_source(world, unit);
    r.attempts += 1;
    let alternative = world.nearest_source(Footprint::tile(r.resource_pos), r.resource_layer, r.kind);
    match alternative {
        Some(mine) if r.attempts <= MAX_SOURCE_RETRIES => {
            r.mine = Some(mine);
            if let Some((pos, layer)) = world.unit(mine).map(|m| (m.pos, m.layer)) {
                r.resource_pos = pos;
                r.resource_layer = layer;
            }
            r.state = GatherState::MovingToResource;
            tracing::debug!(unit = %unit, mine = %mine, "switching to another source");
        }
        _ => {
            head.finished = true;
            if let Some(player) = world.unit(unit).map(|u| u.player) {
                ctx.notify(player, format!("no more {} to gather", r.kind));
            }
            tracing::debug!(unit = %unit, kind = %r.kind, "gave up gathering");
        }
    }
}
