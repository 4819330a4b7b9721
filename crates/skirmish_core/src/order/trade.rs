//! Trade routes between a home market and a foreign one.

use serde::{Deserialize, Serialize};

use super::{OrderHead, OrderStatus};
use crate::context::SimContext;
use crate::economy::ResourceKind;
use crate::error::OrderFault;
use crate::events::GameEvent;
use crate::movement;
use crate::pathfinding::{PathRequest, PathStatus};
use crate::unit::UnitHandle;
use crate::world::World;

/// Leg of a trade route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    /// Heading to the foreign market (the goal).
    ToMarket,
    /// Heading home with goods.
    ToHome,
}

/// Trade state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOrder {
    /// Market the income is collected at.
    pub home: UnitHandle,
    /// Current leg.
    pub state: TradeState,
}

pub(super) fn execute(
    head: &mut OrderHead,
    trade: &mut TradeOrder,
    unit: UnitHandle,
    world: &mut World,
    ctx: &mut SimContext,
) -> Result<OrderStatus, OrderFault> {
    let market = head.live_goal(world);
    let home = Some(trade.home).filter(|h| world.is_alive(*h));
    let (Some(market), Some(home)) = (market, home) else {
        tracing::debug!(unit = %unit, "trade route broken");
        head.finished = true;
        return Ok(OrderStatus::Continue);
    };
    let target = match trade.state {
        TradeState::ToMarket => market,
        TradeState::ToHome => home,
    };
    let (Some(area), Some(layer)) = (world.footprint(target), world.unit(target).map(|t| t.layer))
    else {
        head.finished = true;
        return Ok(OrderStatus::Continue);
    };
    let request = PathRequest::to_area(area, layer, 0, 1);
    match movement::step(world, ctx, unit, &request) {
        PathStatus::Arrived => match trade.state {
            TradeState::ToMarket => trade.state = TradeState::ToHome,
            TradeState::ToHome => {
                collect_income(world, ctx, unit, market, home);
                trade.state = TradeState::ToMarket;
            }
        },
        PathStatus::Unreachable => head.finished = true,
        PathStatus::Computing | PathStatus::Moving | PathStatus::Blocked => {}
    }
    Ok(OrderStatus::Continue)
}

/// Income grows with the distance between the two markets.
fn collect_income(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    market: UnitHandle,
    home: UnitHandle,
) {
    let distance = world.distance_between(market, home).unwrap_or(0);
    let percent = world.config.trade_income_percent;
    let amount = (i64::from(distance) * i64::from(percent) / 100).max(1) as i32;
    let Some(player) = world.unit(unit).map(|u| u.player) else {
        return;
    };
    if let Some(p) = world.player_mut(player) {
        p.add_resource(ResourceKind::Gold, amount);
    }
    ctx.emit(GameEvent::ResourcesDelivered {
        unit,
        player,
        resource: ResourceKind::Gold,
        amount,
    });
    tracing::debug!(unit = %unit, player, amount, "trade income");
}
