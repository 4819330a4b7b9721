//! Orders: one state machine per unit intent.
//!
//! An [`Order`] is a closed sum type. Every kind implements execute,
//! cancel and validity through exhaustive matches here, so adding a kind
//! forces every behaviour to be written for it.
//!
//! ## Execution contract
//!
//! - [`Order::execute`] advances one tick and may set `finished`. Calling it
//!   again on a finished order does nothing.
//! - [`Order::cancel`] refunds reserved resources (Train, Research,
//!   UpgradeTo, Built). Every other kind has nothing to release.
//! - [`Order::is_valid`] is checked after loading saved orders.
//! - [`Order::path_request`] panics for kinds that never move.

mod attack;
mod build;
mod movement;
mod production;
mod resource;
mod spell;
mod still;
mod trade;
mod transport;

use serde::{Deserialize, Serialize};

use crate::context::SimContext;
use crate::data::{Catalog, SpellId, UnitTypeId, UpgradeId};
use crate::economy::{Costs, ResourceKind};
use crate::error::OrderFault;
use crate::map::LayerId;
use crate::math::{Footprint, TilePos};
use crate::pathfinding::PathRequest;
use crate::player::PlayerId;
use crate::unit::UnitHandle;
use crate::world::World;

pub use attack::{AttackOrder, AttackState};
pub use build::{BuildOrder, BuildState, BuiltOrder};
pub use production::{ResearchOrder, TrainOrder, TransformOrder, UpgradeToOrder};
pub use resource::{GatherState, ResourceOrder};
pub use spell::SpellCastOrder;
pub use still::{DieOrder, StillOrder};
pub use trade::{TradeOrder, TradeState};
pub use transport::{PatrolOrder, UnloadOrder};

/// Intent kind of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    /// Idle, reacting to enemies.
    Still = 0,
    /// Idle, never moving.
    StandGround = 1,
    /// Move to a tile.
    Move = 2,
    /// Attack a unit or position.
    Attack = 3,
    /// Attack a tile.
    AttackGround = 4,
    /// Walk back and forth.
    Patrol = 5,
    /// Guard a friendly unit.
    Defend = 6,
    /// Follow a unit.
    Follow = 7,
    /// Enter a transporter.
    Board = 8,
    /// Release transported units.
    Unload = 9,
    /// Use an item or connector.
    Use = 10,
    /// Walk to a site and start a building.
    Build = 11,
    /// Being constructed.
    Built = 12,
    /// Train a unit.
    Train = 13,
    /// Research an upgrade.
    Research = 14,
    /// Upgrade into another type over time.
    UpgradeTo = 15,
    /// Instantly become another type.
    TransformInto = 16,
    /// Gather resources.
    Resource = 17,
    /// Bring carried resources to a depot.
    ReturnGoods = 18,
    /// Run a trade route.
    Trade = 19,
    /// Cast a spell.
    SpellCast = 20,
    /// Play the death sequence.
    Die = 21,
}

impl Action {
    /// Name used in logs and save files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Still => "action-still",
            Self::StandGround => "action-stand-ground",
            Self::Move => "action-move",
            Self::Attack => "action-attack",
            Self::AttackGround => "action-attack-ground",
            Self::Patrol => "action-patrol",
            Self::Defend => "action-defend",
            Self::Follow => "action-follow",
            Self::Board => "action-board",
            Self::Unload => "action-unload",
            Self::Use => "action-use",
            Self::Build => "action-build",
            Self::Built => "action-built",
            Self::Train => "action-train",
            Self::Research => "action-research",
            Self::UpgradeTo => "action-upgrade-to",
            Self::TransformInto => "action-transform-into",
            Self::Resource => "action-resource",
            Self::ReturnGoods => "action-return-goods",
            Self::Trade => "action-trade",
            Self::SpellCast => "action-spell-cast",
            Self::Die => "action-die",
        }
    }

    /// Numeric code folded into the sync checksum.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Production kinds hold deducted resources and block queue flushes.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Train | Self::Research | Self::UpgradeTo)
    }

    /// Kinds that never request a path.
    #[must_use]
    pub const fn is_stationary(self) -> bool {
        matches!(
            self,
            Self::Built
                | Self::Research
                | Self::Train
                | Self::UpgradeTo
                | Self::Die
                | Self::TransformInto
        )
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fields every order carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHead {
    /// The order is done and may be removed by the scheduler.
    pub finished: bool,
    /// Weak reference to a goal unit.
    pub goal: Option<UnitHandle>,
    /// Goal tile, used when no live goal unit is held.
    pub goal_pos: TilePos,
    /// Goal layer, used when no live goal unit is held.
    pub goal_layer: LayerId,
    /// Maximum distance to the goal.
    pub range: u32,
    /// Minimum distance to the goal.
    pub min_range: u32,
}

impl OrderHead {
    /// Head aimed at a tile.
    #[must_use]
    pub const fn at(pos: TilePos, layer: LayerId, range: u32) -> Self {
        Self {
            finished: false,
            goal: None,
            goal_pos: pos,
            goal_layer: layer,
            range,
            min_range: 0,
        }
    }

    /// Head aimed at a unit (its current tile is remembered as fallback).
    #[must_use]
    pub const fn on(goal: UnitHandle, pos: TilePos, layer: LayerId, range: u32) -> Self {
        Self {
            finished: false,
            goal: Some(goal),
            goal_pos: pos,
            goal_layer: layer,
            range,
            min_range: 0,
        }
    }

    /// The goal unit if it is still alive.
    #[must_use]
    pub fn live_goal(&self, world: &World) -> Option<UnitHandle> {
        self.goal.filter(|g| world.is_alive(*g))
    }

    /// Goal tile: the live goal's position, else the stored tile.
    #[must_use]
    pub fn goal_position(&self, world: &World) -> TilePos {
        self.goal
            .and_then(|g| world.unit(g))
            .map_or(self.goal_pos, |u| u.pos)
    }

    /// Goal layer: the live goal's layer, else the stored layer.
    #[must_use]
    pub fn goal_map_layer(&self, world: &World) -> LayerId {
        self.goal
            .and_then(|g| world.unit(g))
            .map_or(self.goal_layer, |u| u.layer)
    }

    /// Area of the goal: the goal unit's footprint or the stored tile.
    #[must_use]
    pub fn goal_area(&self, world: &World) -> Footprint {
        self.goal
            .and_then(|g| world.footprint(g))
            .unwrap_or_else(|| Footprint::tile(self.goal_pos))
    }

    /// Pathfinding request for reaching the goal within range.
    #[must_use]
    pub fn path_request(&self, world: &World) -> PathRequest {
        PathRequest::to_area(
            self.goal_area(world),
            self.goal_map_layer(world),
            self.min_range,
            self.range,
        )
    }
}

/// Variant-specific state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Still or stand-ground.
    Still(StillOrder),
    /// Move to the goal tile.
    Move,
    /// Attack a unit or the ground.
    Attack(AttackOrder),
    /// Patrol between two tiles.
    Patrol(PatrolOrder),
    /// Guard the goal unit.
    Defend,
    /// Follow the goal unit.
    Follow,
    /// Enter the goal transporter.
    Board,
    /// Unload at the goal tile.
    Unload(UnloadOrder),
    /// Use the goal item or connector.
    Use,
    /// Walk to a site and start construction.
    Build(BuildOrder),
    /// Construction in progress.
    Built(BuiltOrder),
    /// Train a unit.
    Train(TrainOrder),
    /// Research an upgrade.
    Research(ResearchOrder),
    /// Upgrade into another type.
    UpgradeTo(UpgradeToOrder),
    /// Transform into another type.
    TransformInto(TransformOrder),
    /// Gather resources.
    Resource(ResourceOrder),
    /// Return carried goods.
    ReturnGoods(ResourceOrder),
    /// Trade route.
    Trade(TradeOrder),
    /// Cast a spell.
    SpellCast(SpellCastOrder),
    /// Death sequence.
    Die(DieOrder),
}

/// What the scheduler should do after executing an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Keep going.
    Continue,
    /// Replace the executed order with another.
    Replace(Order),
    /// Put this order in front, saving the executed one for later.
    Interrupt(Order),
    /// The unit entered its death sequence during execution.
    Died,
    /// The unit left the world during execution.
    Removed,
}

/// One pending intent of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Shared fields.
    pub head: OrderHead,
    /// Variant state.
    pub kind: OrderKind,
}

impl Order {
    /// Order from its parts.
    #[must_use]
    pub const fn new(head: OrderHead, kind: OrderKind) -> Self {
        Self { head, kind }
    }

    /// Idle order.
    #[must_use]
    pub const fn still() -> Self {
        Self::new(
            OrderHead::at(TilePos::new(0, 0), 0, 0),
            OrderKind::Still(StillOrder {
                stand_ground: false,
            }),
        )
    }

    /// Idle order that never moves.
    #[must_use]
    pub const fn stand_ground() -> Self {
        Self::new(
            OrderHead::at(TilePos::new(0, 0), 0, 0),
            OrderKind::Still(StillOrder { stand_ground: true }),
        )
    }

    /// Move to a tile.
    #[must_use]
    pub const fn move_to(pos: TilePos, layer: LayerId) -> Self {
        Self::new(OrderHead::at(pos, layer, 0), OrderKind::Move)
    }

    /// Attack a unit.
    #[must_use]
    pub const fn attack(goal: UnitHandle, pos: TilePos, layer: LayerId, range: u32, min: u32) -> Self {
        let mut head = OrderHead::on(goal, pos, layer, range);
        head.min_range = min;
        Self::new(head, OrderKind::Attack(AttackOrder::new(false)))
    }

    /// Attack-move towards a tile.
    #[must_use]
    pub const fn attack_move(pos: TilePos, layer: LayerId, range: u32, min: u32) -> Self {
        let mut head = OrderHead::at(pos, layer, range);
        head.min_range = min;
        Self::new(head, OrderKind::Attack(AttackOrder::roaming()))
    }

    /// Attack a tile.
    #[must_use]
    pub const fn attack_ground(pos: TilePos, layer: LayerId, range: u32, min: u32) -> Self {
        let mut head = OrderHead::at(pos, layer, range);
        head.min_range = min;
        Self::new(head, OrderKind::Attack(AttackOrder::new(true)))
    }

    /// Patrol between `origin` and `dest`.
    #[must_use]
    pub const fn patrol(origin: TilePos, dest: TilePos, layer: LayerId) -> Self {
        Self::new(
            OrderHead::at(dest, layer, 0),
            OrderKind::Patrol(PatrolOrder {
                origin,
                heading_out: true,
            }),
        )
    }

    /// Guard a unit.
    #[must_use]
    pub const fn defend(goal: UnitHandle, pos: TilePos, layer: LayerId) -> Self {
        Self::new(OrderHead::on(goal, pos, layer, 2), OrderKind::Defend)
    }

    /// Follow a unit.
    #[must_use]
    pub const fn follow(goal: UnitHandle, pos: TilePos, layer: LayerId) -> Self {
        Self::new(OrderHead::on(goal, pos, layer, 1), OrderKind::Follow)
    }

    /// Board a transporter.
    #[must_use]
    pub const fn board(goal: UnitHandle, pos: TilePos, layer: LayerId) -> Self {
        Self::new(OrderHead::on(goal, pos, layer, 1), OrderKind::Board)
    }

    /// Unload at a tile (all units, or just `what`).
    #[must_use]
    pub const fn unload(pos: TilePos, layer: LayerId, what: Option<UnitHandle>) -> Self {
        Self::new(
            OrderHead::at(pos, layer, 0),
            OrderKind::Unload(UnloadOrder { what }),
        )
    }

    /// Use an item or connector.
    #[must_use]
    pub const fn use_unit(goal: UnitHandle, pos: TilePos, layer: LayerId) -> Self {
        Self::new(OrderHead::on(goal, pos, layer, 1), OrderKind::Use)
    }

    /// Build `unit_type` with its top-left corner at `site`.
    #[must_use]
    pub const fn build(
        unit_type: UnitTypeId,
        site: TilePos,
        layer: LayerId,
        settlement: Option<UnitHandle>,
    ) -> Self {
        let mut head = OrderHead::at(site, layer, 1);
        head.min_range = 1;
        Self::new(
            head,
            OrderKind::Build(BuildOrder {
                unit_type,
                state: BuildState::MovingToSite,
                attempts: 0,
                settlement,
                building: None,
            }),
        )
    }

    /// Construction in progress, paid with `cost`.
    #[must_use]
    pub const fn built(worker: Option<UnitHandle>, cost: Costs) -> Self {
        Self::new(
            OrderHead::at(TilePos::new(0, 0), 0, 0),
            OrderKind::Built(BuiltOrder {
                progress: 0,
                worker,
                cost,
            }),
        )
    }

    /// Train a unit, already paid with `cost` by `payer`.
    #[must_use]
    pub const fn train(unit_type: UnitTypeId, payer: PlayerId, cost: Costs) -> Self {
        Self::new(
            OrderHead::at(TilePos::new(0, 0), 0, 0),
            OrderKind::Train(TrainOrder {
                unit_type,
                payer,
                progress: 0,
                cost,
            }),
        )
    }

    /// Research an upgrade for `payer`, already paid with `cost`.
    #[must_use]
    pub const fn research(upgrade: UpgradeId, payer: PlayerId, cost: Costs) -> Self {
        Self::new(
            OrderHead::at(TilePos::new(0, 0), 0, 0),
            OrderKind::Research(ResearchOrder {
                upgrade,
                payer,
                cost,
            }),
        )
    }

    /// Upgrade into `unit_type`, already paid with `cost`.
    #[must_use]
    pub const fn upgrade_to(unit_type: UnitTypeId, cost: Costs) -> Self {
        Self::new(
            OrderHead::at(TilePos::new(0, 0), 0, 0),
            OrderKind::UpgradeTo(UpgradeToOrder {
                unit_type,
                progress: 0,
                cost,
            }),
        )
    }

    /// Transform into `unit_type`.
    #[must_use]
    pub const fn transform_into(unit_type: UnitTypeId) -> Self {
        Self::new(
            OrderHead::at(TilePos::new(0, 0), 0, 0),
            OrderKind::TransformInto(TransformOrder { unit_type }),
        )
    }

    /// Gather from a specific source.
    #[must_use]
    pub const fn resource_from(
        source: UnitHandle,
        pos: TilePos,
        layer: LayerId,
        kind: ResourceKind,
    ) -> Self {
        Self::new(
            OrderHead::on(source, pos, layer, 1),
            OrderKind::Resource(ResourceOrder::new(kind, GatherState::Initializing)),
        )
    }

    /// Gather from whatever source of `kind` is near `pos`.
    #[must_use]
    pub const fn resource_at(pos: TilePos, layer: LayerId, kind: ResourceKind) -> Self {
        Self::new(
            OrderHead::at(pos, layer, 1),
            OrderKind::Resource(ResourceOrder::new(kind, GatherState::Initializing)),
        )
    }

    /// Bring carried goods to `depot` (or the nearest one).
    #[must_use]
    pub const fn return_goods(depot: Option<UnitHandle>, kind: ResourceKind) -> Self {
        let mut state = ResourceOrder::new(kind, GatherState::MovingToDepot);
        state.depot = depot;
        Self::new(
            OrderHead::at(TilePos::new(0, 0), 0, 1),
            OrderKind::ReturnGoods(state),
        )
    }

    /// Trade between `home` and the foreign `market`.
    #[must_use]
    pub const fn trade(market: UnitHandle, pos: TilePos, layer: LayerId, home: UnitHandle) -> Self {
        Self::new(
            OrderHead::on(market, pos, layer, 1),
            OrderKind::Trade(TradeOrder {
                home,
                state: TradeState::ToMarket,
            }),
        )
    }

    /// Cast a spell at a unit or tile.
    #[must_use]
    pub const fn spell_cast(
        spell: SpellId,
        goal: Option<UnitHandle>,
        pos: TilePos,
        layer: LayerId,
        range: u32,
    ) -> Self {
        let head = match goal {
            Some(g) => OrderHead::on(g, pos, layer, range),
            None => OrderHead::at(pos, layer, range),
        };
        Self::new(head, OrderKind::SpellCast(SpellCastOrder { spell }))
    }

    /// Death sequence lasting `ticks`.
    #[must_use]
    pub const fn die(ticks: u32) -> Self {
        Self::new(
            OrderHead::at(TilePos::new(0, 0), 0, 0),
            OrderKind::Die(DieOrder { ticks_left: ticks }),
        )
    }

    /// Intent kind.
    #[must_use]
    pub const fn action(&self) -> Action {
        match self.kind {
            OrderKind::Still(s) => {
                if s.stand_ground {
                    Action::StandGround
                } else {
                    Action::Still
                }
            }
            OrderKind::Move => Action::Move,
            OrderKind::Attack(a) => {
                if a.ground {
                    Action::AttackGround
                } else {
                    Action::Attack
                }
            }
            OrderKind::Patrol(_) => Action::Patrol,
            OrderKind::Defend => Action::Defend,
            OrderKind::Follow => Action::Follow,
            OrderKind::Board => Action::Board,
            OrderKind::Unload(_) => Action::Unload,
            OrderKind::Use => Action::Use,
            OrderKind::Build(_) => Action::Build,
            OrderKind::Built(_) => Action::Built,
            OrderKind::Train(_) => Action::Train,
            OrderKind::Research(_) => Action::Research,
            OrderKind::UpgradeTo(_) => Action::UpgradeTo,
            OrderKind::TransformInto(_) => Action::TransformInto,
            OrderKind::Resource(_) => Action::Resource,
            OrderKind::ReturnGoods(_) => Action::ReturnGoods,
            OrderKind::Trade(_) => Action::Trade,
            OrderKind::SpellCast(_) => Action::SpellCast,
            OrderKind::Die(_) => Action::Die,
        }
    }

    /// Whether the scheduler may remove this order.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.head.finished
    }

    /// Mark the order done.
    pub fn finish(&mut self) {
        self.head.finished = true;
    }

    /// Goal tile (see [`OrderHead::goal_position`]).
    #[must_use]
    pub fn goal_position(&self, world: &World) -> TilePos {
        self.head.goal_position(world)
    }

    /// Goal layer (see [`OrderHead::goal_map_layer`]).
    #[must_use]
    pub fn goal_map_layer(&self, world: &World) -> LayerId {
        self.head.goal_map_layer(world)
    }

    /// Pathfinding input for this order.
    ///
    /// # Panics
    ///
    /// Panics for kinds that never move; being asked is a logic defect.
    #[must_use]
    pub fn path_request(&self, world: &World) -> PathRequest {
        let action = self.action();
        assert!(
            !action.is_stationary(),
            "{action} never requests a path"
        );
        match self.kind {
            OrderKind::Build(build) => build::site_request(&self.head, &build, world),
            _ => self.head.path_request(world),
        }
    }

    /// Advance one tick.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderFault`] when the order cannot make sense of the
    /// world; the scheduler isolates it to this unit.
    pub fn execute(
        &mut self,
        unit: UnitHandle,
        world: &mut World,
        ctx: &mut SimContext,
    ) -> Result<OrderStatus, OrderFault> {
        // a finished still order is only marked removable, it keeps watching
        if self.head.finished && !matches!(self.kind, OrderKind::Still(_)) {
            return Ok(OrderStatus::Continue);
        }
        let head = &mut self.head;
        match &mut self.kind {
            OrderKind::Still(s) => still::execute_still(head, s, unit, world, ctx),
            OrderKind::Move => movement::execute_move(head, unit, world, ctx),
            OrderKind::Attack(a) => attack::execute(head, a, unit, world, ctx),
            OrderKind::Patrol(p) => transport::execute_patrol(head, p, unit, world, ctx),
            OrderKind::Defend => movement::execute_defend(head, unit, world, ctx),
            OrderKind::Follow => movement::execute_follow(head, unit, world, ctx),
            OrderKind::Board => transport::execute_board(head, unit, world, ctx),
            OrderKind::Unload(u) => transport::execute_unload(head, u, unit, world, ctx),
            OrderKind::Use => transport::execute_use(head, unit, world, ctx),
            OrderKind::Build(b) => build::execute_build(head, b, unit, world, ctx),
            OrderKind::Built(b) => build::execute_built(head, b, unit, world, ctx),
            OrderKind::Train(t) => production::execute_train(head, t, unit, world, ctx),
            OrderKind::Research(r) => production::execute_research(head, r, unit, world, ctx),
            OrderKind::UpgradeTo(u) => production::execute_upgrade_to(head, u, unit, world, ctx),
            OrderKind::TransformInto(t) => production::execute_transform(head, t, unit, world, ctx),
            OrderKind::Resource(r) => resource::execute(head, r, unit, world, ctx, false),
            OrderKind::ReturnGoods(r) => resource::execute(head, r, unit, world, ctx, true),
            OrderKind::Trade(t) => trade::execute(head, t, unit, world, ctx),
            OrderKind::SpellCast(s) => spell::execute(head, s, unit, world, ctx),
            OrderKind::Die(d) => still::execute_die(head, d, unit, world, ctx),
        }
    }

    /// Release whatever this order reserved.
    ///
    /// A finished order already delivered what it paid for and releases
    /// nothing.
    pub fn cancel(&mut self, unit: UnitHandle, world: &mut World, ctx: &mut SimContext) {
        if self.head.finished {
            return;
        }
        match &mut self.kind {
            OrderKind::Train(t) => production::cancel_train(t, unit, world),
            OrderKind::Research(r) => production::cancel_research(r, unit, world),
            OrderKind::UpgradeTo(u) => production::cancel_upgrade_to(u, unit, world),
            OrderKind::Built(b) => build::cancel_built(b, unit, world, ctx),
            OrderKind::Still(_)
            | OrderKind::Move
            | OrderKind::Attack(_)
            | OrderKind::Patrol(_)
            | OrderKind::Defend
            | OrderKind::Follow
            | OrderKind::Board
            | OrderKind::Unload(_)
            | OrderKind::Use
            | OrderKind::Build(_)
            | OrderKind::TransformInto(_)
            | OrderKind::Resource(_)
            | OrderKind::ReturnGoods(_)
            | OrderKind::Trade(_)
            | OrderKind::SpellCast(_)
            | OrderKind::Die(_) => {}
        }
    }

    /// Sanity check after deserialization.
    #[must_use]
    pub fn is_valid(&self, catalog: &Catalog) -> bool {
        let has_type = |id: UnitTypeId| catalog.unit_type(id).is_some();
        match self.kind {
            OrderKind::Still(_) | OrderKind::Move | OrderKind::Die(_) => true,
            OrderKind::Attack(a) => a.ground || self.head.goal.is_some() || self.head.range > 0,
            OrderKind::Patrol(_) | OrderKind::Unload(_) => true,
            OrderKind::Defend | OrderKind::Follow | OrderKind::Board | OrderKind::Use => {
                self.head.goal.is_some()
            }
            OrderKind::Build(b) => has_type(b.unit_type),
            OrderKind::Built(_) => true,
            OrderKind::Train(t) => catalog
                .unit_type(t.unit_type)
                .is_some_and(|def| t.progress <= crate::player::progress_goal(def.build_time)),
            OrderKind::Research(r) => catalog.upgrade(r.upgrade).is_some(),
            OrderKind::UpgradeTo(u) => catalog
                .unit_type(u.unit_type)
                .is_some_and(|def| u.progress <= crate::player::progress_goal(def.build_time)),
            OrderKind::TransformInto(t) => has_type(t.unit_type),
            OrderKind::Resource(_) | OrderKind::ReturnGoods(_) => true,
            OrderKind::Trade(_) => self.head.goal.is_some(),
            OrderKind::SpellCast(s) => catalog.spell(s.spell).is_some(),
        }
    }
}
