//! The command layer: the only legal way intents enter the simulation.
//!
//! UI, AI, network and replay all build a [`Command`] and hand it to
//! [`apply`]. Each verb has its own function that validates first and
//! mutates only once every check has passed, so a rejected command leaves
//! the world untouched. Rejections are reported as
//! [`GameEvent::CommandRejected`] and logged.
//!
//! ## Queue placement
//!
//! - With `flush` the unit's secondary orders are released through their
//!   cancel hooks and the active order is marked finished, unless the unit
//!   is mid-production (those hold deducted resources and must be
//!   cancelled explicitly).
//! - A queue already at `max_queue_depth` silently drops the command.
//! - Units that cannot move, and units under construction, keep movement
//!   style orders in their pending slot instead; for producers that order
//!   is the rally order handed to every trained unit.
//! - Destinations on another layer get `Use` orders for the connector
//!   chain queued in front of the final order.

use serde::{Deserialize, Serialize};

use crate::connector;
use crate::context::SimContext;
use crate::data::{SpellId, UnitTypeDef, UnitTypeId, UpgradeId};
use crate::economy::ResourceKind;
use crate::error::CommandError;
use crate::events::GameEvent;
use crate::map::LayerId;
use crate::math::{Footprint, TilePos};
use crate::order::{Action, Order, OrderKind};
use crate::player::{Diplomacy, PlayerId};
use crate::queue::OrderSlot;
use crate::unit::{Unit, UnitHandle};
use crate::world::World;

/// Outcome of a single verb.
pub type CommandResult = std::result::Result<(), CommandError>;

/// Intent for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitCommand {
    /// Drop everything and stand still.
    Stop,
    /// Hold position.
    StandGround,
    /// Follow a unit.
    Follow {
        /// Unit to follow.
        target: UnitHandle,
    },
    /// Guard a unit.
    Defend {
        /// Unit to guard.
        target: UnitHandle,
    },
    /// Move to a tile.
    Move {
        /// Destination.
        pos: TilePos,
        /// Destination layer.
        layer: LayerId,
    },
    /// Attack a unit, or attack-move to a tile.
    Attack {
        /// Unit to attack; `None` attack-moves.
        target: Option<UnitHandle>,
        /// Destination tile.
        pos: TilePos,
        /// Destination layer.
        layer: LayerId,
    },
    /// Attack a tile.
    AttackGround {
        /// Tile.
        pos: TilePos,
        /// Layer.
        layer: LayerId,
    },
    /// Patrol between the current position and a tile.
    Patrol {
        /// Far end.
        pos: TilePos,
        /// Layer.
        layer: LayerId,
    },
    /// Enter a transporter.
    Board {
        /// The transporter.
        transport: UnitHandle,
    },
    /// Release passengers.
    Unload {
        /// Where to unload.
        pos: TilePos,
        /// Layer.
        layer: LayerId,
        /// One passenger, or everyone.
        what: Option<UnitHandle>,
    },
    /// Construct a building.
    Build {
        /// Building type.
        unit_type: UnitTypeId,
        /// Top-left corner of the site.
        pos: TilePos,
        /// Layer.
        layer: LayerId,
    },
    /// Remove the unit (cancelling construction with a refund).
    Dismiss,
    /// Gather from a source unit.
    Resource {
        /// The source.
        source: UnitHandle,
    },
    /// Gather a resource kind near a tile.
    ResourceAt {
        /// Kind.
        kind: ResourceKind,
        /// Tile.
        pos: TilePos,
        /// Layer.
        layer: LayerId,
    },
    /// Bring carried resources home.
    ReturnGoods {
        /// Depot, or the nearest one.
        depot: Option<UnitHandle>,
    },
    /// Train a unit.
    Train {
        /// Type to train.
        unit_type: UnitTypeId,
        /// Player paying for and receiving the unit; the building's owner
        /// when `None`. Only neutral buildings train for other players.
        payer: Option<PlayerId>,
    },
    /// Cancel a queued training.
    CancelTraining {
        /// Queue position, or the last training order.
        slot: Option<usize>,
        /// Only cancel if the order trains this type.
        unit_type: Option<UnitTypeId>,
    },
    /// Upgrade into another type over time.
    UpgradeTo {
        /// Target type.
        unit_type: UnitTypeId,
    },
    /// Cancel the last upgrade-to order.
    CancelUpgradeTo,
    /// Become another type immediately.
    TransformInto {
        /// Target type.
        unit_type: UnitTypeId,
    },
    /// Research an upgrade.
    Research {
        /// The upgrade.
        upgrade: UpgradeId,
        /// Player paying for and receiving the upgrade; the building's
        /// owner when `None`.
        payer: Option<PlayerId>,
    },
    /// Cancel the last research order.
    CancelResearch,
    /// Cast a spell.
    SpellCast {
        /// The spell.
        spell: SpellId,
        /// Target unit, if any.
        target: Option<UnitHandle>,
        /// Target tile.
        pos: TilePos,
        /// Layer.
        layer: LayerId,
    },
    /// Use an item or connector.
    Use {
        /// The item or connector.
        target: UnitHandle,
    },
    /// Run a trade route.
    Trade {
        /// Foreign market.
        market: UnitHandle,
        /// Home market.
        home: UnitHandle,
    },
}

/// A command as issued by a player, the AI, the network or replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Order one unit.
    Unit {
        /// Acting unit.
        unit: UnitHandle,
        /// Replace the queue rather than append.
        flush: bool,
        /// What to do.
        order: UnitCommand,
    },
    /// Change a player's stance towards another.
    Diplomacy {
        /// Player changing stance.
        player: PlayerId,
        /// Other player.
        other: PlayerId,
        /// New stance.
        stance: Diplomacy,
    },
    /// Start or stop sharing vision.
    SharedVision {
        /// Player sharing.
        player: PlayerId,
        /// Player receiving.
        other: PlayerId,
        /// Share or revoke.
        shared: bool,
    },
}

impl Command {
    /// Flushing command for `unit`.
    #[must_use]
    pub const fn order(unit: UnitHandle, order: UnitCommand) -> Self {
        Self::Unit {
            unit,
            flush: true,
            order,
        }
    }

    /// Appending command for `unit`.
    #[must_use]
    pub const fn queued(unit: UnitHandle, order: UnitCommand) -> Self {
        Self::Unit {
            unit,
            flush: false,
            order,
        }
    }

    /// The unit the command is for.
    #[must_use]
    pub const fn acting_unit(&self) -> Option<UnitHandle> {
        match self {
            Self::Unit { unit, .. } => Some(*unit),
            Self::Diplomacy { .. } | Self::SharedVision { .. } => None,
        }
    }

    /// Whether the command flushes the queue.
    #[must_use]
    pub const fn flush(&self) -> bool {
        match self {
            Self::Unit { flush, .. } => *flush,
            Self::Diplomacy { .. } | Self::SharedVision { .. } => false,
        }
    }

    /// Command name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unit { order, .. } => order.name(),
            Self::Diplomacy { .. } => "diplomacy",
            Self::SharedVision { .. } => "shared-vision",
        }
    }
}

impl UnitCommand {
    /// Command name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::StandGround => "stand-ground",
            Self::Follow { .. } => "follow",
            Self::Defend { .. } => "defend",
            Self::Move { .. } => "move",
            Self::Attack { .. } => "attack",
            Self::AttackGround { .. } => "attack-ground",
            Self::Patrol { .. } => "patrol",
            Self::Board { .. } => "board",
            Self::Unload { .. } => "unload",
            Self::Build { .. } => "build",
            Self::Dismiss => "dismiss",
            Self::Resource { .. } => "resource",
            Self::ResourceAt { .. } => "resource-loc",
            Self::ReturnGoods { .. } => "return",
            Self::Train { .. } => "train",
            Self::CancelTraining { .. } => "cancel-train",
            Self::UpgradeTo { .. } => "upgrade-to",
            Self::CancelUpgradeTo => "cancel-upgrade-to",
            Self::TransformInto { .. } => "transform-into",
            Self::Research { .. } => "research",
            Self::CancelResearch => "cancel-research",
            Self::SpellCast { .. } => "spell-cast",
            Self::Use { .. } => "use",
            Self::Trade { .. } => "trade",
        }
    }
}

/// Validate and carry out a command.
///
/// # Errors
///
/// Returns the rejection reason; the world is unchanged in that case and a
/// [`GameEvent::CommandRejected`] has been emitted.
pub fn apply(world: &mut World, ctx: &mut SimContext, command: &Command) -> CommandResult {
    let result = dispatch(world, ctx, command);
    if let Err(reason) = &result {
        reject(ctx, command, reason);
    }
    result
}

/// Log a refused command and report it as a [`GameEvent::CommandRejected`].
pub fn reject(ctx: &mut SimContext, command: &Command, reason: &CommandError) {
    tracing::warn!(
        tick = ctx.tick(),
        command = command.name(),
        unit = ?command.acting_unit(),
        %reason,
        "command rejected"
    );
    ctx.emit(GameEvent::CommandRejected {
        unit: command.acting_unit(),
        command: command.name().to_string(),
        reason: reason.to_string(),
    });
}

fn dispatch(world: &mut World, ctx: &mut SimContext, command: &Command) -> CommandResult {
    let (unit, flush, order) = match *command {
        Command::Unit { unit, flush, order } => (unit, flush, order),
        Command::Diplomacy {
            player,
            other,
            stance,
        } => return diplomacy(world, player, other, stance),
        Command::SharedVision {
            player,
            other,
            shared,
        } => return shared_vision(world, player, other, shared),
    };
    match order {
        UnitCommand::Stop => stop(world, ctx, unit),
        UnitCommand::StandGround => stand_ground(world, ctx, unit, flush),
        UnitCommand::Follow { target } => follow(world, ctx, unit, target, flush),
        UnitCommand::Defend { target } => defend(world, ctx, unit, target, flush),
        UnitCommand::Move { pos, layer } => move_to(world, ctx, unit, pos, layer, flush),
        UnitCommand::Attack { target, pos, layer } => {
            attack(world, ctx, unit, target, pos, layer, flush)
        }
        UnitCommand::AttackGround { pos, layer } => {
            attack_ground(world, ctx, unit, pos, layer, flush)
        }
        UnitCommand::Patrol { pos, layer } => patrol(world, ctx, unit, pos, layer, flush),
        UnitCommand::Board { transport } => board(world, ctx, unit, transport, flush),
        UnitCommand::Unload { pos, layer, what } => {
            unload(world, ctx, unit, pos, layer, what, flush)
        }
        UnitCommand::Build {
            unit_type,
            pos,
            layer,
        } => build(world, ctx, unit, unit_type, pos, layer, flush),
        UnitCommand::Dismiss => dismiss(world, ctx, unit),
        UnitCommand::Resource { source } => resource(world, ctx, unit, source, flush),
        UnitCommand::ResourceAt { kind, pos, layer } => {
            resource_at(world, ctx, unit, kind, pos, layer, flush)
        }
        UnitCommand::ReturnGoods { depot } => return_goods(world, ctx, unit, depot, flush),
        UnitCommand::Train { unit_type, payer } => train(world, ctx, unit, unit_type, payer),
        UnitCommand::CancelTraining { slot, unit_type } => {
            cancel_training(world, ctx, unit, slot, unit_type)
        }
        UnitCommand::UpgradeTo { unit_type } => upgrade_to(world, ctx, unit, unit_type, flush),
        UnitCommand::CancelUpgradeTo => cancel_upgrade_to(world, ctx, unit),
        UnitCommand::TransformInto { unit_type } => {
            transform_into(world, ctx, unit, unit_type, flush)
        }
        UnitCommand::Research { upgrade, payer } => research(world, ctx, unit, upgrade, payer),
        UnitCommand::CancelResearch => cancel_research(world, ctx, unit),
        UnitCommand::SpellCast {
            spell,
            target,
            pos,
            layer,
        } => spell_cast(world, ctx, unit, spell, target, pos, layer, flush),
        UnitCommand::Use { target } => use_unit(world, ctx, unit, target, flush),
        UnitCommand::Trade { market, home } => trade(world, ctx, unit, market, home, flush),
    }
}

// ---------------------------------------------------------------------------
// queue placement

/// Release everything behind the active order and mark it finished.
///
/// Does nothing while the unit trains, researches or upgrades. A stunned
/// idle unit keeps its idle order unfinished.
pub fn flush_orders(world: &mut World, ctx: &mut SimContext, unit: UnitHandle) {
    let Some(u) = world.unit_mut(unit) else {
        return;
    };
    let action = u.current_action();
    if action.is_production() {
        tracing::trace!(unit = %unit, %action, "flush suppressed during production");
        return;
    }
    let keep_active = u.is_stunned() && matches!(action, Action::Still | Action::StandGround);
    let released = u.orders.truncate_to_active();
    if !keep_active {
        u.orders.active_mut().finish();
    }
    for mut order in released {
        order.cancel(unit, world, ctx);
    }
}

/// Slot for the next order of `unit`, flushing first if asked.
///
/// Units that cannot move and units under construction get their pending
/// slot. `None` means the queue is full and the order must be dropped.
pub fn get_next_order_slot(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    flush: bool,
) -> Option<OrderSlot> {
    if is_stationary(world, unit) {
        return Some(OrderSlot::Pending);
    }
    queue_slot(world, ctx, unit, flush)
}

fn queue_slot(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    flush: bool,
) -> Option<OrderSlot> {
    if flush {
        flush_orders(world, ctx, unit);
    }
    let len = world.unit(unit)?.orders.len();
    if len >= world.config.max_queue_depth {
        tracing::debug!(unit = %unit, len, "order queue full, command dropped");
        return None;
    }
    Some(OrderSlot::Queue(len))
}

fn is_stationary(world: &World, unit: UnitHandle) -> bool {
    let under_construction = world.unit(unit).is_some_and(|u| u.under_construction);
    under_construction || !world.unit_type(unit).is_some_and(UnitTypeDef::can_move)
}

fn place(world: &mut World, unit: UnitHandle, slot: OrderSlot, order: Order) {
    let Some(u) = world.unit_mut(unit) else {
        return;
    };
    match slot {
        OrderSlot::Queue(_) => u.orders.push(order),
        OrderSlot::Pending => {
            u.orders.set_pending(order);
        }
        OrderSlot::Critical => {
            u.orders.set_critical(order);
        }
        OrderSlot::Saved => {
            u.orders.set_saved(order);
        }
    }
}

/// Queue a movement-style order, routing through connectors when
/// `route_to` names another layer.
fn issue(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    order: Order,
    flush: bool,
    route_to: Option<LayerId>,
) -> CommandResult {
    let u = commandable(world, unit)?;
    let (layer, pos) = (u.layer, u.pos);
    let mut hops = Vec::new();
    if let Some(goal_layer) = route_to.filter(|l| *l != layer) {
        if !is_stationary(world, unit) {
            let chain = connector::find_chain(world, layer, pos, goal_layer)
                .ok_or(CommandError::NoConnectorRoute(goal_layer))?;
            hops = connector::chain_orders(world, &chain);
        }
    }
    let mut flush = flush;
    for next in hops.into_iter().chain(std::iter::once(order)) {
        let Some(slot) = get_next_order_slot(world, ctx, unit, flush) else {
            return Ok(());
        };
        place(world, unit, slot, next);
        flush = false;
    }
    Ok(())
}

/// Queue an order in the main queue regardless of mobility.
fn enqueue(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    order: Order,
    flush: bool,
) -> bool {
    match queue_slot(world, ctx, unit, flush) {
        Some(slot) => {
            place(world, unit, slot, order);
            true
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// validation helpers

/// Who pays for production at `producer`. Neutral buildings serve any
/// player; everyone else produces only for their owner.
fn paying_player(
    world: &World,
    producer: &Unit,
    payer: Option<PlayerId>,
) -> Result<PlayerId, CommandError> {
    let owner = producer.player;
    let Some(payer) = payer.filter(|&p| p != owner) else {
        return Ok(owner);
    };
    world
        .player(payer)
        .ok_or(CommandError::UnknownPlayer(payer))?;
    if world.player(owner).is_some_and(|p| p.neutral) {
        Ok(payer)
    } else {
        Err(CommandError::NotOwner {
            issuer: payer,
            unit: producer.handle,
        })
    }
}

fn commandable(world: &World, unit: UnitHandle) -> Result<&Unit, CommandError> {
    world
        .unit(unit)
        .filter(|u| u.accepts_commands())
        .ok_or(CommandError::UnitUnavailable(unit))
}

fn acting_def(world: &World, unit: UnitHandle) -> Result<&UnitTypeDef, CommandError> {
    commandable(world, unit)?;
    world
        .unit_type(unit)
        .ok_or(CommandError::UnitUnavailable(unit))
}

fn not_capable(world: &World, unit: UnitHandle, verb: &'static str) -> CommandError {
    CommandError::NotCapable {
        unit_type: world.type_ident(unit),
        verb,
    }
}

/// Position and layer of a living, on-map target other than `unit`.
fn live_target(
    world: &World,
    unit: UnitHandle,
    target: UnitHandle,
) -> Result<(TilePos, LayerId), CommandError> {
    world
        .unit(target)
        .filter(|t| target != unit && !t.dying && !t.removed)
        .map(|t| (t.pos, t.layer))
        .ok_or(CommandError::InvalidTarget(target))
}

fn on_map(world: &World, pos: TilePos, layer: LayerId) -> CommandResult {
    if world.map.layer(layer).is_some_and(|l| l.in_bounds(pos)) {
        Ok(())
    } else {
        Err(CommandError::OffMap { x: pos.x, y: pos.y })
    }
}

fn unit_type_ident(world: &World, id: UnitTypeId) -> Result<String, CommandError> {
    world
        .catalog
        .unit_type(id)
        .map(|d| d.ident.clone())
        .ok_or_else(|| CommandError::UnknownIdent(format!("{id:?}")))
}

// ---------------------------------------------------------------------------
// verbs

/// Drop every order, including saved and pending ones, and stand still.
pub fn stop(world: &mut World, ctx: &mut SimContext, unit: UnitHandle) -> CommandResult {
    commandable(world, unit)?;
    enqueue(world, ctx, unit, Order::still(), true);
    if let Some(u) = world.unit_mut(unit) {
        u.orders.take_saved();
        u.orders.take_pending();
    }
    Ok(())
}

/// Hold position, striking only what comes into range.
pub fn stand_ground(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    flush: bool,
) -> CommandResult {
    commandable(world, unit)?;
    issue(world, ctx, unit, Order::stand_ground(), flush, None)?;
    if let Some(u) = world.unit_mut(unit) {
        u.orders.take_saved();
    }
    Ok(())
}

/// Follow `target`.
pub fn follow(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    target: UnitHandle,
    flush: bool,
) -> CommandResult {
    commandable(world, unit)?;
    let (pos, layer) = live_target(world, unit, target)?;
    issue(world, ctx, unit, Order::follow(target, pos, layer), flush, Some(layer))
}

/// Guard `target`.
pub fn defend(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    target: UnitHandle,
    flush: bool,
) -> CommandResult {
    commandable(world, unit)?;
    let (pos, layer) = live_target(world, unit, target)?;
    issue(world, ctx, unit, Order::defend(target, pos, layer), flush, Some(layer))
}

/// Move to a tile.
pub fn move_to(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    pos: TilePos,
    layer: LayerId,
    flush: bool,
) -> CommandResult {
    commandable(world, unit)?;
    on_map(world, pos, layer)?;
    issue(world, ctx, unit, Order::move_to(pos, layer), flush, Some(layer))
}

/// Attack a unit, or attack-move towards a tile when `target` is `None`.
pub fn attack(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    target: Option<UnitHandle>,
    pos: TilePos,
    layer: LayerId,
    flush: bool,
) -> CommandResult {
    let def = acting_def(world, unit)?;
    let (range, min) = match (&def.attack, def.can_move()) {
        (Some(stats), _) => (stats.range, stats.min_range),
        // a producer's attack order is only a rally order
        (None, false) => (1, 0),
        (None, true) => return Err(not_capable(world, unit, "attack")),
    };
    let order = match target {
        Some(t) => {
            let (tpos, tlayer) = live_target(world, unit, t)?;
            Order::attack(t, tpos, tlayer, range, min)
        }
        None => {
            on_map(world, pos, layer)?;
            Order::attack_move(pos, layer, range, min)
        }
    };
    let goal_layer = order.goal_map_layer(world);
    issue(world, ctx, unit, order, flush, Some(goal_layer))
}

/// Attack a tile.
pub fn attack_ground(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    pos: TilePos,
    layer: LayerId,
    flush: bool,
) -> CommandResult {
    let def = acting_def(world, unit)?;
    let Some(stats) = def.attack.clone() else {
        return Err(not_capable(world, unit, "attack ground"));
    };
    on_map(world, pos, layer)?;
    let order = Order::attack_ground(pos, layer, stats.range, stats.min_range);
    issue(world, ctx, unit, order, flush, Some(layer))
}

/// Patrol between the current tile and `pos`.
pub fn patrol(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    pos: TilePos,
    layer: LayerId,
    flush: bool,
) -> CommandResult {
    let u = commandable(world, unit)?;
    let (origin, own_layer) = (u.pos, u.layer);
    on_map(world, pos, layer)?;
    if layer != own_layer && !is_stationary(world, unit) {
        return Err(CommandError::NoConnectorRoute(layer));
    }
    issue(world, ctx, unit, Order::patrol(origin, pos, layer), flush, None)
}

/// Enter `transport`.
pub fn board(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    transport: UnitHandle,
    flush: bool,
) -> CommandResult {
    let def = acting_def(world, unit)?;
    if !def.can_move() {
        return Err(not_capable(world, unit, "board"));
    }
    let (pos, layer) = live_target(world, unit, transport)?;
    if world
        .unit_type(transport)
        .map_or(true, |d| d.transport_capacity == 0)
    {
        return Err(CommandError::InvalidTarget(transport));
    }
    issue(world, ctx, unit, Order::board(transport, pos, layer), flush, Some(layer))
}

/// Release one passenger, or all of them, at `pos`.
pub fn unload(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    pos: TilePos,
    layer: LayerId,
    what: Option<UnitHandle>,
    flush: bool,
) -> CommandResult {
    let def = acting_def(world, unit)?;
    if def.transport_capacity == 0 {
        return Err(not_capable(world, unit, "unload"));
    }
    if let Some(passenger) = what {
        let inside = world
            .unit(passenger)
            .is_some_and(|p| p.container == Some(unit));
        if !inside {
            return Err(CommandError::InvalidTarget(passenger));
        }
    }
    on_map(world, pos, layer)?;
    let order = Order::unload(pos, layer, what);
    if is_stationary(world, unit) {
        enqueue(world, ctx, unit, order, flush);
        Ok(())
    } else {
        issue(world, ctx, unit, order, flush, Some(layer))
    }
}

/// Walk to a site and put up a building there.
///
/// Resources are checked now but only deducted once construction starts.
pub fn build(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    unit_type: UnitTypeId,
    pos: TilePos,
    layer: LayerId,
    flush: bool,
) -> CommandResult {
    let def = acting_def(world, unit)?;
    let ident = unit_type_ident(world, unit_type)?;
    if !def.can_move() || !def.builds.contains(&ident) {
        return Err(not_capable(world, unit, "build"));
    }
    let Some(target) = world.catalog.unit_type(unit_type) else {
        return Err(CommandError::UnknownIdent(ident));
    };
    let site = Footprint::new(pos, target.width, target.height);
    if !world
        .map
        .layer(layer)
        .is_some_and(|l| l.footprint_in_bounds(site))
    {
        return Err(CommandError::OffMap { x: pos.x, y: pos.y });
    }
    let player = commandable(world, unit)?.player;
    let affordable = world
        .player(player)
        .is_some_and(|p| p.can_afford(&p.unit_type_cost(unit_type, target)));
    if !affordable {
        return Err(CommandError::InsufficientResources(ident));
    }
    issue(
        world,
        ctx,
        unit,
        Order::build(unit_type, pos, layer, None),
        flush,
        Some(layer),
    )
}

/// Remove the unit. A building under construction is cancelled with the
/// usual refund and its builder let out.
pub fn dismiss(world: &mut World, ctx: &mut SimContext, unit: UnitHandle) -> CommandResult {
    commandable(world, unit)?;
    tracing::debug!(unit = %unit, "dismissed");
    world.let_unit_die(unit, ctx);
    Ok(())
}

/// Gather from `source`.
pub fn resource(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    source: UnitHandle,
    flush: bool,
) -> CommandResult {
    let def = acting_def(world, unit)?;
    let kind = world
        .unit(source)
        .filter(|s| !s.dying)
        .and_then(|_| world.unit_type(source))
        .and_then(|d| d.source_of)
        .ok_or(CommandError::InvalidTarget(source))?;
    if def.harvest(kind).is_none() {
        return Err(not_capable(world, unit, "gather"));
    }
    let Some(s) = world.unit(source) else {
        return Err(CommandError::InvalidTarget(source));
    };
    let (pos, layer) = (s.pos, s.layer);
    issue(
        world,
        ctx,
        unit,
        Order::resource_from(source, pos, layer, kind),
        flush,
        Some(layer),
    )
}

/// Gather `kind` from whatever source is near `pos`.
pub fn resource_at(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    kind: ResourceKind,
    pos: TilePos,
    layer: LayerId,
    flush: bool,
) -> CommandResult {
    let def = acting_def(world, unit)?;
    if def.harvest(kind).is_none() {
        return Err(not_capable(world, unit, "gather"));
    }
    on_map(world, pos, layer)?;
    issue(
        world,
        ctx,
        unit,
        Order::resource_at(pos, layer, kind),
        flush,
        Some(layer),
    )
}

/// Bring carried resources to `depot`, or the nearest depot.
pub fn return_goods(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    depot: Option<UnitHandle>,
    flush: bool,
) -> CommandResult {
    let u = commandable(world, unit)?;
    let player = u.player;
    let Some(kind) = u.carried_resource.filter(|_| u.resources_held > 0) else {
        return Err(not_capable(world, unit, "return goods"));
    };
    if let Some(d) = depot {
        let accepts = world.unit(d).is_some_and(|du| {
            !du.dying && du.player == player && !du.under_construction
        }) && world.unit_type(d).is_some_and(|dd| dd.is_depot_for(kind));
        if !accepts {
            return Err(CommandError::InvalidTarget(d));
        }
    }
    issue(world, ctx, unit, Order::return_goods(depot, kind), flush, None)
}

/// Train a unit for `payer`, or for the building's owner. The cost is
/// deducted now and kept with the order.
pub fn train(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    unit_type: UnitTypeId,
    payer: Option<PlayerId>,
) -> CommandResult {
    let def = acting_def(world, unit)?;
    let ident = unit_type_ident(world, unit_type)?;
    let u = commandable(world, unit)?;
    if u.under_construction || !def.trains.contains(&ident) {
        return Err(not_capable(world, unit, "train"));
    }
    if !world.config.training_queue && u.orders.iter().any(|o| o.action() == Action::Train) {
        return Err(CommandError::TrainingQueueDisabled);
    }
    let player = paying_player(world, u, payer)?;
    let p = world
        .player(player)
        .ok_or(CommandError::UnknownPlayer(player))?;
    if p.unit_count() >= p.unit_limit {
        return Err(CommandError::UnitLimit);
    }
    let Some(target) = world.catalog.unit_type(unit_type) else {
        return Err(CommandError::UnknownIdent(ident));
    };
    let cost = p.unit_type_cost(unit_type, target);
    if !p.can_afford(&cost) {
        return Err(CommandError::InsufficientResources(ident));
    }
    if queue_slot(world, ctx, unit, false).is_none() {
        return Ok(());
    }
    if let Some(p) = world.player_mut(player) {
        p.spend(&cost);
    }
    place(
        world,
        unit,
        OrderSlot::Queue(0),
        Order::train(unit_type, player, cost),
    );
    tracing::debug!(unit = %unit, unit_type = %ident, "training queued");
    Ok(())
}

/// Cancel a training order, refunding it.
pub fn cancel_training(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    slot: Option<usize>,
    unit_type: Option<UnitTypeId>,
) -> CommandResult {
    let u = commandable(world, unit)?;
    let trains = |o: &Order| match o.kind {
        OrderKind::Train(t) => !o.is_finished() && unit_type.map_or(true, |ty| ty == t.unit_type),
        _ => false,
    };
    let index = match slot {
        Some(i) => u.orders.get(i).filter(|&o| trains(o)).map(|_| i),
        None => u.orders.iter().rposition(trains),
    }
    .ok_or(CommandError::NothingToCancel)?;
    cancel_at(world, ctx, unit, index);
    Ok(())
}

fn cancel_at(world: &mut World, ctx: &mut SimContext, unit: UnitHandle, index: usize) {
    let removed = world
        .unit_mut(unit)
        .and_then(|u| u.orders.remove_at(index));
    if let Some(mut order) = removed {
        tracing::debug!(unit = %unit, index, action = %order.action(), "order cancelled");
        order.cancel(unit, world, ctx);
    }
}

/// Cancel the last unfinished order of `action` in the queue.
fn cancel_last(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    action: Action,
) -> CommandResult {
    let u = commandable(world, unit)?;
    let index = u
        .orders
        .iter()
        .rposition(|o| o.action() == action && !o.is_finished())
        .ok_or(CommandError::NothingToCancel)?;
    cancel_at(world, ctx, unit, index);
    Ok(())
}

/// Upgrade into another type. The cost is deducted now.
pub fn upgrade_to(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    unit_type: UnitTypeId,
    flush: bool,
) -> CommandResult {
    let def = acting_def(world, unit)?;
    let ident = unit_type_ident(world, unit_type)?;
    let u = commandable(world, unit)?;
    if u.under_construction || !def.upgrades_to.contains(&ident) {
        return Err(not_capable(world, unit, "upgrade"));
    }
    let player = u.player;
    let p = world
        .player(player)
        .ok_or(CommandError::UnknownPlayer(player))?;
    let Some(target) = world.catalog.unit_type(unit_type) else {
        return Err(CommandError::UnknownIdent(ident));
    };
    let cost = p.unit_type_cost(unit_type, target);
    if !p.can_afford(&cost) {
        return Err(CommandError::InsufficientResources(ident));
    }
    if queue_slot(world, ctx, unit, flush).is_none() {
        return Ok(());
    }
    if let Some(p) = world.player_mut(player) {
        p.spend(&cost);
    }
    place(
        world,
        unit,
        OrderSlot::Queue(0),
        Order::upgrade_to(unit_type, cost),
    );
    Ok(())
}

/// Cancel the last upgrade-to order, refunding it.
pub fn cancel_upgrade_to(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
) -> CommandResult {
    cancel_last(world, ctx, unit, Action::UpgradeTo)
}

/// Become another type at once.
pub fn transform_into(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    unit_type: UnitTypeId,
    flush: bool,
) -> CommandResult {
    commandable(world, unit)?;
    unit_type_ident(world, unit_type)?;
    enqueue(world, ctx, unit, Order::transform_into(unit_type), flush);
    Ok(())
}

/// Research an upgrade for `payer`, or for the building's owner. The cost
/// is deducted now.
pub fn research(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    upgrade: UpgradeId,
    payer: Option<PlayerId>,
) -> CommandResult {
    let def = acting_def(world, unit)?;
    let upgrade_def = world
        .catalog
        .upgrade(upgrade)
        .ok_or_else(|| CommandError::UnknownIdent(format!("{upgrade:?}")))?;
    let ident = upgrade_def.ident.clone();
    let u = commandable(world, unit)?;
    if u.under_construction || !def.researches.contains(&ident) {
        return Err(not_capable(world, unit, "research"));
    }
    let player = paying_player(world, u, payer)?;
    let p = world
        .player(player)
        .ok_or(CommandError::UnknownPlayer(player))?;
    let queued = world.units.iter().any(|other| {
        other.orders.iter().any(|o| {
            matches!(o.kind, OrderKind::Research(r)
                if r.payer == player && r.upgrade == upgrade && !o.is_finished())
        })
    });
    if p.upgrade_taken(upgrade) || queued {
        return Err(CommandError::UpgradeUnavailable(ident));
    }
    let cost = upgrade_def.costs;
    if !p.can_afford(&cost) {
        return Err(CommandError::InsufficientResources(ident));
    }
    if queue_slot(world, ctx, unit, false).is_none() {
        return Ok(());
    }
    if let Some(p) = world.player_mut(player) {
        p.spend(&cost);
    }
    place(
        world,
        unit,
        OrderSlot::Queue(0),
        Order::research(upgrade, player, cost),
    );
    tracing::debug!(unit = %unit, upgrade = %ident, "research queued");
    Ok(())
}

/// Cancel the last research order, refunding it.
pub fn cancel_research(world: &mut World, ctx: &mut SimContext, unit: UnitHandle) -> CommandResult {
    cancel_last(world, ctx, unit, Action::Research)
}

/// Cast a spell at a unit or tile. Mana is checked when the cast happens.
pub fn spell_cast(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    spell: SpellId,
    target: Option<UnitHandle>,
    pos: TilePos,
    layer: LayerId,
    flush: bool,
) -> CommandResult {
    let def = acting_def(world, unit)?;
    let spell_def = world
        .catalog
        .spell(spell)
        .ok_or_else(|| CommandError::UnknownIdent(format!("{spell:?}")))?;
    if !def.spells.contains(&spell_def.ident) {
        return Err(not_capable(world, unit, "cast"));
    }
    let range = spell_def.range;
    let order = match target {
        // casting on oneself is allowed
        Some(t) if t == unit => {
            let u = commandable(world, unit)?;
            Order::spell_cast(spell, Some(t), u.pos, u.layer, range)
        }
        Some(t) => {
            let (tpos, tlayer) = live_target(world, unit, t)?;
            Order::spell_cast(spell, Some(t), tpos, tlayer, range)
        }
        None if spell_def.needs_unit => {
            return Err(CommandError::MissingTarget(spell_def.ident.clone()));
        }
        None => {
            on_map(world, pos, layer)?;
            Order::spell_cast(spell, None, pos, layer, range)
        }
    };
    let goal_layer = order.goal_map_layer(world);
    issue(world, ctx, unit, order, flush, Some(goal_layer))
}

/// Use an item or connector.
pub fn use_unit(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    target: UnitHandle,
    flush: bool,
) -> CommandResult {
    commandable(world, unit)?;
    let (pos, layer) = live_target(world, unit, target)?;
    let usable = world
        .unit_type(target)
        .is_some_and(|d| d.connector || d.is_item());
    if !usable {
        return Err(CommandError::InvalidTarget(target));
    }
    issue(world, ctx, unit, Order::use_unit(target, pos, layer), flush, Some(layer))
}

/// Trade between the unit's own `home` market and a foreign `market`.
pub fn trade(
    world: &mut World,
    ctx: &mut SimContext,
    unit: UnitHandle,
    market: UnitHandle,
    home: UnitHandle,
    flush: bool,
) -> CommandResult {
    let def = acting_def(world, unit)?;
    if !def.trader {
        return Err(not_capable(world, unit, "trade"));
    }
    let player = commandable(world, unit)?.player;
    let is_market = |h: UnitHandle| world.unit_type(h).is_some_and(|d| d.market);
    let (pos, layer) = live_target(world, unit, market)?;
    if !is_market(market) || market == home {
        return Err(CommandError::InvalidTarget(market));
    }
    live_target(world, unit, home)?;
    let own_home = world.unit(home).is_some_and(|h| h.player == player);
    if !is_market(home) || !own_home {
        return Err(CommandError::InvalidTarget(home));
    }
    issue(
        world,
        ctx,
        unit,
        Order::trade(market, pos, layer, home),
        flush,
        Some(layer),
    )
}

/// Set `player`'s stance towards `other`.
pub fn diplomacy(
    world: &mut World,
    player: PlayerId,
    other: PlayerId,
    stance: Diplomacy,
) -> CommandResult {
    if world.player(other).is_none() || player == other {
        return Err(CommandError::UnknownPlayer(other));
    }
    let p = world
        .player_mut(player)
        .ok_or(CommandError::UnknownPlayer(player))?;
    p.diplomacy.insert(other, stance);
    tracing::info!(player, other, stance = stance.name(), "diplomacy changed");
    Ok(())
}

/// Start or stop sharing `player`'s vision with `other`.
pub fn shared_vision(
    world: &mut World,
    player: PlayerId,
    other: PlayerId,
    shared: bool,
) -> CommandResult {
    if world.player(other).is_none() || player == other {
        return Err(CommandError::UnknownPlayer(other));
    }
    let p = world
        .player_mut(player)
        .ok_or(CommandError::UnknownPlayer(player))?;
    if shared {
        p.shared_vision.insert(other);
    } else {
        p.shared_vision.remove(&other);
    }
    tracing::info!(player, other, shared, "shared vision changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::economy::Costs;
    use crate::fixtures::{sandbox, sandbox_with};

    fn cmd(unit: UnitHandle, order: UnitCommand) -> Command {
        Command::order(unit, order)
    }

    #[test]
    fn test_move_replaces_queue_on_flush() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        let go = |x| UnitCommand::Move {
            pos: TilePos::new(x, 1),
            layer: 0,
        };
        apply(&mut world, &mut ctx, &Command::queued(me, go(5))).unwrap();
        apply(&mut world, &mut ctx, &Command::queued(me, go(6))).unwrap();
        assert_eq!(world.unit(me).unwrap().orders.len(), 3);
        apply(&mut world, &mut ctx, &cmd(me, go(9))).unwrap();
        let orders = &world.unit(me).unwrap().orders;
        assert_eq!(orders.len(), 2);
        assert!(orders.active().is_finished());
        assert_eq!(orders.get(1).unwrap().head.goal_pos, TilePos::new(9, 1));
    }

    #[test]
    fn test_flush_is_idempotent() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        for x in 2..5 {
            let order = UnitCommand::Move {
                pos: TilePos::new(x, 1),
                layer: 0,
            };
            apply(&mut world, &mut ctx, &Command::queued(me, order)).unwrap();
        }
        flush_orders(&mut world, &mut ctx, me);
        let once = world.unit(me).unwrap().orders.clone();
        flush_orders(&mut world, &mut ctx, me);
        assert_eq!(world.unit(me).unwrap().orders, once);
        assert_eq!(once.len(), 1);
    }

    #[test]
    fn test_queue_cap_drops_silently() {
        let (mut world, mut ctx, types) = sandbox_with(SimConfig {
            max_queue_depth: 3,
            ..SimConfig::default()
        });
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        for x in 2..8 {
            let order = UnitCommand::Move {
                pos: TilePos::new(x, 1),
                layer: 0,
            };
            assert!(apply(&mut world, &mut ctx, &Command::queued(me, order)).is_ok());
        }
        assert_eq!(world.unit(me).unwrap().orders.len(), 3);
        assert!(ctx.drain_events().iter().all(|e| !matches!(e, GameEvent::CommandRejected { .. })));
    }

    #[test]
    fn test_flush_suppressed_while_training() {
        let (mut world, mut ctx, types) = sandbox();
        world.player_mut(0).unwrap().resources = Costs::gold(1000);
        let hall = world
            .spawn_unit(&mut ctx, types.hall, 0, TilePos::new(4, 4), 0)
            .unwrap();
        train(&mut world, &mut ctx, hall, types.peasant, None).unwrap();
        // make the training active
        world.unit_mut(hall).unwrap().orders.pop_active();
        flush_orders(&mut world, &mut ctx, hall);
        let orders = &world.unit(hall).unwrap().orders;
        assert_eq!(orders.active().action(), Action::Train);
        assert!(!orders.active().is_finished());
    }

    #[test]
    fn test_stationary_unit_takes_pending_order() {
        let (mut world, mut ctx, types) = sandbox();
        let hall = world
            .spawn_unit(&mut ctx, types.hall, 0, TilePos::new(4, 4), 0)
            .unwrap();
        let order = UnitCommand::Move {
            pos: TilePos::new(12, 12),
            layer: 0,
        };
        apply(&mut world, &mut ctx, &cmd(hall, order)).unwrap();
        let orders = &world.unit(hall).unwrap().orders;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders.pending().map(Order::action), Some(Action::Move));
    }

    #[test]
    fn test_train_deducts_and_rejects_when_broke() {
        let (mut world, mut ctx, types) = sandbox();
        world.player_mut(0).unwrap().resources = Costs::gold(60);
        let hall = world
            .spawn_unit(&mut ctx, types.hall, 0, TilePos::new(4, 4), 0)
            .unwrap();
        let order = UnitCommand::Train {
            unit_type: types.peasant,
            payer: None,
        };
        apply(&mut world, &mut ctx, &cmd(hall, order)).unwrap();
        assert_eq!(world.player(0).unwrap().resources, Costs::gold(10));
        let before = world.unit(hall).unwrap().orders.clone();
        let err = apply(&mut world, &mut ctx, &cmd(hall, order)).unwrap_err();
        assert!(matches!(err, CommandError::InsufficientResources(_)));
        assert_eq!(world.unit(hall).unwrap().orders, before);
        assert_eq!(world.player(0).unwrap().resources, Costs::gold(10));
        assert!(ctx
            .drain_events()
            .iter()
            .any(|e| matches!(e, GameEvent::CommandRejected { command, .. } if command == "train")));
    }

    #[test]
    fn test_training_queue_disabled() {
        let (mut world, mut ctx, types) = sandbox_with(SimConfig {
            training_queue: false,
            ..SimConfig::default()
        });
        world.player_mut(0).unwrap().resources = Costs::gold(1000);
        let hall = world
            .spawn_unit(&mut ctx, types.hall, 0, TilePos::new(4, 4), 0)
            .unwrap();
        train(&mut world, &mut ctx, hall, types.peasant, None).unwrap();
        assert_eq!(
            train(&mut world, &mut ctx, hall, types.peasant, None),
            Err(CommandError::TrainingQueueDisabled)
        );
        assert_eq!(world.player(0).unwrap().resources, Costs::gold(950));
    }

    #[test]
    fn test_cancel_training_refunds() {
        let (mut world, mut ctx, types) = sandbox();
        world.player_mut(0).unwrap().resources = Costs::gold(100);
        let hall = world
            .spawn_unit(&mut ctx, types.hall, 0, TilePos::new(4, 4), 0)
            .unwrap();
        train(&mut world, &mut ctx, hall, types.peasant, None).unwrap();
        train(&mut world, &mut ctx, hall, types.peasant, None).unwrap();
        assert_eq!(world.player(0).unwrap().resources, Costs::ZERO);
        cancel_training(&mut world, &mut ctx, hall, None, None).unwrap();
        assert_eq!(world.player(0).unwrap().resources, Costs::gold(50));
        cancel_training(&mut world, &mut ctx, hall, Some(1), Some(types.peasant)).unwrap();
        assert_eq!(world.player(0).unwrap().resources, Costs::gold(100));
        assert_eq!(
            cancel_training(&mut world, &mut ctx, hall, None, None),
            Err(CommandError::NothingToCancel)
        );
        assert_eq!(world.unit(hall).unwrap().orders.len(), 1);
    }

    #[test]
    fn test_neutral_building_trains_for_payer() {
        let (mut world, mut ctx, types) = sandbox();
        world.player_mut(1).unwrap().resources = Costs::gold(100);
        let barracks = world
            .spawn_unit(&mut ctx, types.barracks, 2, TilePos::new(4, 4), 0)
            .unwrap();
        let owner_funds = world.player(2).unwrap().resources;

        train(&mut world, &mut ctx, barracks, types.footman, Some(1)).unwrap();
        assert_eq!(world.player(1).unwrap().resources, Costs::ZERO);
        assert_eq!(world.player(2).unwrap().resources, owner_funds);
        let queued = *world.unit(barracks).unwrap().orders.get(1).unwrap();
        assert!(matches!(queued.kind, OrderKind::Train(t) if t.payer == 1));

        cancel_training(&mut world, &mut ctx, barracks, None, None).unwrap();
        assert_eq!(world.player(1).unwrap().resources, Costs::gold(100));
    }

    #[test]
    fn test_owned_building_refuses_other_payer() {
        let (mut world, mut ctx, types) = sandbox();
        world.player_mut(1).unwrap().resources = Costs::gold(1000);
        let barracks = world
            .spawn_unit(&mut ctx, types.barracks, 0, TilePos::new(4, 4), 0)
            .unwrap();
        assert_eq!(
            research(&mut world, &mut ctx, barracks, types.sharp_swords, Some(1)),
            Err(CommandError::NotOwner {
                issuer: 1,
                unit: barracks
            })
        );
        assert_eq!(world.player(1).unwrap().resources, Costs::gold(1000));
        assert_eq!(world.unit(barracks).unwrap().orders.len(), 1);
    }

    #[test]
    fn test_research_rejected_when_in_progress() {
        let (mut world, mut ctx, types) = sandbox();
        world.player_mut(0).unwrap().resources = Costs::gold(1000);
        let a = world
            .spawn_unit(&mut ctx, types.barracks, 0, TilePos::new(2, 2), 0)
            .unwrap();
        let b = world
            .spawn_unit(&mut ctx, types.barracks, 0, TilePos::new(8, 2), 0)
            .unwrap();
        research(&mut world, &mut ctx, a, types.sharp_swords, None).unwrap();
        assert!(matches!(
            research(&mut world, &mut ctx, b, types.sharp_swords, None),
            Err(CommandError::UpgradeUnavailable(_))
        ));
        cancel_research(&mut world, &mut ctx, a).unwrap();
        assert_eq!(world.player(0).unwrap().resources, Costs::gold(1000));
    }

    #[test]
    fn test_capability_checks() {
        let (mut world, mut ctx, types) = sandbox();
        let peasant = world
            .spawn_unit(&mut ctx, types.peasant, 0, TilePos::new(1, 1), 0)
            .unwrap();
        let enemy = world
            .spawn_unit(&mut ctx, types.footman, 1, TilePos::new(3, 1), 0)
            .unwrap();
        let attack = UnitCommand::Attack {
            target: Some(enemy),
            pos: TilePos::new(3, 1),
            layer: 0,
        };
        assert!(matches!(
            apply(&mut world, &mut ctx, &cmd(peasant, attack)),
            Err(CommandError::NotCapable { .. })
        ));
        let trade = UnitCommand::Trade {
            market: enemy,
            home: enemy,
        };
        assert!(apply(&mut world, &mut ctx, &cmd(peasant, trade)).is_err());
        assert_eq!(world.unit(peasant).unwrap().orders.len(), 1);
    }

    #[test]
    fn test_dead_unit_rejected() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        world.let_unit_die(me, &mut ctx);
        let order = UnitCommand::Move {
            pos: TilePos::new(5, 5),
            layer: 0,
        };
        assert_eq!(
            apply(&mut world, &mut ctx, &cmd(me, order)),
            Err(CommandError::UnitUnavailable(me))
        );
    }

    #[test]
    fn test_cross_layer_move_synthesizes_use_chain() {
        let (mut world, mut ctx, types) = sandbox();
        let a = world
            .spawn_unit(&mut ctx, types.portal, 0, TilePos::new(6, 6), 0)
            .unwrap();
        let b = world
            .spawn_unit(&mut ctx, types.portal, 0, TilePos::new(2, 2), 1)
            .unwrap();
        world.unit_mut(a).unwrap().connection = Some(b);
        world.unit_mut(b).unwrap().connection = Some(a);
        let me = world
            .spawn_unit(&mut ctx, types.peasant, 0, TilePos::new(1, 1), 0)
            .unwrap();
        let order = UnitCommand::Move {
            pos: TilePos::new(10, 10),
            layer: 1,
        };
        apply(&mut world, &mut ctx, &cmd(me, order)).unwrap();
        let actions: Vec<_> = world
            .unit(me)
            .unwrap()
            .orders
            .iter()
            .skip(1)
            .map(|o| (o.action(), o.head.goal))
            .collect();
        assert_eq!(actions, vec![(Action::Use, Some(a)), (Action::Move, None)]);

        let unroutable = UnitCommand::Move {
            pos: TilePos::new(10, 10),
            layer: 7,
        };
        assert!(apply(&mut world, &mut ctx, &cmd(me, unroutable)).is_err());
    }

    #[test]
    fn test_stop_clears_saved_and_pending() {
        let (mut world, mut ctx, types) = sandbox();
        let me = world
            .spawn_unit(&mut ctx, types.footman, 0, TilePos::new(1, 1), 0)
            .unwrap();
        {
            let orders = &mut world.unit_mut(me).unwrap().orders;
            orders.set_saved(Order::move_to(TilePos::new(4, 4), 0));
            orders.set_pending(Order::move_to(TilePos::new(5, 5), 0));
        }
        apply(&mut world, &mut ctx, &cmd(me, UnitCommand::Stop)).unwrap();
        let orders = &world.unit(me).unwrap().orders;
        assert!(orders.saved().is_none());
        assert!(orders.pending().is_none());
        assert_eq!(orders.get(1).map(Order::action), Some(Action::Still));
    }

    #[test]
    fn test_diplomacy_and_vision() {
        let (mut world, mut ctx, _) = sandbox();
        let change = Command::Diplomacy {
            player: 0,
            other: 2,
            stance: Diplomacy::Enemy,
        };
        apply(&mut world, &mut ctx, &change).unwrap();
        assert!(world.players.hostile(0, 2));
        let vision = Command::SharedVision {
            player: 0,
            other: 1,
            shared: true,
        };
        apply(&mut world, &mut ctx, &vision).unwrap();
        assert!(world.player(0).unwrap().shared_vision.contains(&1));
        let bad = Command::Diplomacy {
            player: 0,
            other: 9,
            stance: Diplomacy::Allied,
        };
        assert_eq!(
            apply(&mut world, &mut ctx, &bad),
            Err(CommandError::UnknownPlayer(9))
        );
    }

    #[test]
    fn test_dismiss_under_construction_refunds_and_frees_builder() {
        let (mut world, mut ctx, types) = sandbox();
        let site = world
            .spawn_unit(&mut ctx, types.barracks, 0, TilePos::new(4, 4), 0)
            .unwrap();
        let worker = world
            .spawn_unit(&mut ctx, types.peasant, 0, TilePos::new(1, 1), 0)
            .unwrap();
        world.unit_mut(site).unwrap().under_construction = true;
        world.enter_container(worker, site);
        world
            .unit_mut(site)
            .unwrap()
            .orders
            .replace_active(Order::built(Some(worker), Costs::gold(300)));
        dismiss(&mut world, &mut ctx, site).unwrap();
        assert_eq!(world.player(0).unwrap().resources, Costs::gold(225));
        assert!(world.is_alive(worker));
        assert!(!world.unit(worker).unwrap().removed);
    }
}
