//! Construction: the worker's build order and the site's built order.
//!
//! A worker walks next to the site, pays and places the structure, then
//! either goes inside (the structure builds itself) or keeps working from
//! outside. The structure carries its own [`BuiltOrder`], so it keeps
//! progressing if the worker dies.

use serde::{Deserialize, Serialize};

use super::{Action, Order, OrderHead, OrderKind, OrderStatus};
use crate::config::RefundBasis;
use crate::context::SimContext;
use crate::data::UnitTypeId;
use crate::economy::Costs;
use crate::error::OrderFault;
use crate::events::GameEvent;
use crate::math::Footprint;
use crate::movement;
use crate::pathfinding::{PathRequest, PathStatus};
use crate::player::{progress_goal, progress_rate};
use crate::unit::UnitHandle;
use crate::world::World;

/// Phase of a build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildState {
    /// Walking next to the site.
    MovingToSite,
    /// At the site, about to pay and place the structure.
    RequestingConstruction,
    /// Structure placed; working on it.
    Constructing,
}

/// Worker side of construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOrder {
    /// Structure to build.
    pub unit_type: UnitTypeId,
    /// Current phase.
    pub state: BuildState,
    /// Failed route attempts so far.
    pub attempts: u32,
    /// Settlement the structure will belong to.
    pub settlement: Option<UnitHandle>,
    /// The half-built structure, once placed.
    pub building: Option<UnitHandle>,
}

/// Structure side of construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltOrder {
    /// Hundredths of work done.
    pub progress: u32,
    /// Worker waiting inside, released on completion.
    pub worker: Option<UnitHandle>,
    /// Cost paid when the structure was placed.
    pub cost: Costs,
}

/// Request for standing next to the site footprint.
pub(super) fn site_request(head: &OrderHead, build: &BuildOrder, world: &World) -> PathRequest {
    let (width, height) = world
        .catalog
        .unit_type(build.unit_type)
        .map_or((1, 1), |d| (d.width, d.height));
    PathRequest::to_area(
        Footprint::new(head.goal_pos, width, height),
        head.goal_layer,
        1,
        1,
    )
}

pub(super) fn execute_build(
    head: &mut OrderHead,
    build: &mut BuildOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let player = world
        .unit(unit)
        .map(|u| u.player)
        .ok_or(OrderFault::UnitVanished {
            action: Action::Build,
            unit,
        })?;
    if build.state == BuildState::MovingToSite {
        let request = site_request(head, build, world);
        match movement::step(world, ctx, unit, &request) {
            PathStatus::Arrived => build.state = BuildState::RequestingConstruction,
            PathStatus::Unreachable => {
                build.attempts += 1;
                if build.attempts > world.config.build_retry_limit {
                    ctx.notify(player, "cannot reach the building site");
                    head.finished = true;
                }
                return Ok(OrderStatus::Continue);
            }
            PathStatus::Computing | PathStatus::Moving | PathStatus::Blocked => {
                return Ok(OrderStatus::Continue);
            }
        }
    }
    if build.state == BuildState::RequestingConstruction {
        return start_construction(head, build, unit, player, world, ctx);
    }
    help_construction(head, build, unit, world)
}

fn start_construction(
    head: &mut OrderHead,
    build: &mut BuildOrder,
    unit: UnitHandle,
    player: u8,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let def = world
        .catalog
        .unit_type(build.unit_type)
        .ok_or_else(|| OrderFault::MissingCatalogEntry {
            action: Action::Build,
            what: format!("{:?}", build.unit_type),
        })?;
    let site = Footprint::new(head.goal_pos, def.width, def.height);
    let builder_outside = def.builder_outside;
    let free = world
        .map
        .layer(head.goal_layer)
        .is_some_and(|l| l.footprint_free(site, None));
    if !free {
        tracing::debug!(unit = %unit, site = %head.goal_pos, "building site occupied");
        ctx.notify(player, "building site is occupied");
        head.finished = true;
        return Ok(OrderStatus::Continue);
    }
    let Some(owner) = world.player(player) else {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    };
    let cost = owner.unit_type_cost(build.unit_type, def);
    if !owner.can_afford(&cost) {
        ctx.notify(player, "not enough resources to build");
        head.finished = true;
        return Ok(OrderStatus::Continue);
    }

    let building = match world.spawn_unit(ctx, build.unit_type, player, head.goal_pos, head.goal_layer) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(unit = %unit, error = %e, "placing structure failed");
            head.finished = true;
            return Ok(OrderStatus::Continue);
        }
    };
    if let Some(owner) = world.player_mut(player) {
        owner.spend(&cost);
    }
    let worker = (!builder_outside).then_some(unit);
    if let Some(site) = world.unit_mut(building) {
        site.under_construction = true;
        site.hp = 1;
        site.settlement = build.settlement;
        site.orders.replace_active(Order::built(worker, cost));
    }
    build.building = Some(building);
    build.state = BuildState::Constructing;
    if builder_outside {
        tracing::debug!(unit = %unit, building = %building, "construction started");
    } else {
        world.enter_container(unit, building);
        tracing::debug!(unit = %unit, building = %building, "worker entered construction");
    }
    Ok(OrderStatus::Continue)
}

fn help_construction(
    head: &mut OrderHead,
    build: &mut BuildOrder,
    unit: UnitHandle,
    world: &mut World,
) -> Result<OrderStatus, OrderFault> {
    let building = build.building.filter(|b| world.is_alive(*b));
    let Some(building) = building.filter(|b| world.unit(*b).is_some_and(|u| u.under_construction))
    else {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    };
    if world.unit(unit).is_some_and(|u| u.removed) {
        // inside: the structure builds itself and drops us out
        return Ok(OrderStatus::Continue);
    }
    let Some(u) = world.unit(unit) else {
        return Ok(OrderStatus::Continue);
    };
    let (player, bonus) = (u.player, u.bonus.time_efficiency);
    let speed = world.player(player).map_or(100, |p| p.speed.build);
    let rate = progress_rate(speed, bonus);
    let (goal, max_hp) = world
        .unit_type(building)
        .map_or((1, 1), |d| (progress_goal(d.build_time).max(1), d.hp));
    if let Some(site) = world.unit_mut(building) {
        if let OrderKind::Built(built) = &mut site.orders.active_mut().kind {
            let before = built.progress.min(goal);
            built.progress = built.progress.saturating_add(rate);
            let gain = hp_share(max_hp, built.progress.min(goal), goal) - hp_share(max_hp, before, goal);
            site.hp = (site.hp + gain).clamp(1, max_hp.max(1));
        }
    }
    Ok(OrderStatus::Continue)
}

pub(super) fn execute_built(
    head: &mut OrderHead,
    built: &mut BuiltOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let u = world.unit(unit).ok_or(OrderFault::UnitVanished {
        action: Action::Built,
        unit,
    })?;
    let (player, bonus) = (u.player, u.bonus.time_efficiency);
    let def = world
        .unit_type(unit)
        .ok_or_else(|| OrderFault::MissingCatalogEntry {
            action: Action::Built,
            what: format!("type of {unit}"),
        })?;
    let goal = progress_goal(def.build_time).max(1);
    let max_hp = def.hp;
    let needs_help = def.builder_outside && world.config.help_build_required;

    let before = built.progress;
    if !needs_help {
        let speed = world.player(player).map_or(100, |p| p.speed.build);
        built.progress = built.progress.saturating_add(progress_rate(speed, bonus));
    }
    let after = built.progress.min(goal);
    let hp_gain = hp_share(max_hp, after, goal) - hp_share(max_hp, before.min(goal), goal);
    if let Some(u) = world.unit_mut(unit) {
        u.hp = (u.hp + hp_gain).clamp(1, max_hp.max(1));
    }
    if built.progress < goal {
        return Ok(OrderStatus::Continue);
    }

    head.finished = true;
    // a building that cannot move keeps its pending order as a rally order
    let mobile = world.unit_type(unit).is_some_and(|d| d.can_move());
    let pending = world.unit_mut(unit).and_then(|u| {
        u.under_construction = false;
        if mobile {
            u.orders.take_pending()
        } else {
            None
        }
    });
    if let Some(worker) = built.worker.take() {
        if world.unit(worker).and_then(|w| w.container) == Some(unit) {
            world.drop_out(worker);
        }
    }
    if let Some(next) = pending {
        if let Some(u) = world.unit_mut(unit) {
            u.orders.insert_after_active(next);
        }
    }
    ctx.emit(GameEvent::ConstructionComplete { unit });
    tracing::info!(unit = %unit, player, "construction complete");
    Ok(OrderStatus::Continue)
}

fn hp_share(max_hp: i32, progress: u32, goal: u32) -> i32 {
    (i64::from(max_hp) * i64::from(progress) / i64::from(goal)) as i32
}

pub(super) fn cancel_built(
    built: &mut BuiltOrder,
    unit: UnitHandle,
    world: &mut World,
    _ctx: &mut SimContext,
) {
    let Some(u) = world.unit(unit) else {
        return;
    };
    if !u.under_construction {
        return;
    }
    let (player, type_id) = (u.player, u.type_id);
    let basis = match world.config.refund_basis {
        RefundBasis::IssueSnapshot => built.cost,
        RefundBasis::CurrentCost => match (world.player(player), world.catalog.unit_type(type_id)) {
            (Some(p), Some(def)) => p.unit_type_cost(type_id, def),
            _ => built.cost,
        },
    };
    let percent = world.config.cancel_build_refund_percent;
    if let Some(p) = world.player_mut(player) {
        p.refund(&basis, percent);
    }
    built.progress = 0;
    if let Some(worker) = built.worker.take() {
        if world.unit(worker).and_then(|w| w.container) == Some(unit) {
            world.drop_out(worker);
        }
    }
    tracing::debug!(unit = %unit, percent, "construction cancelled");
}
