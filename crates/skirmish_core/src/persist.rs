//! Saving and loading unit orders as text.
//!
//! Each order is written on its own line as a RON [`SavedOrder`] tagged
//! with the owning unit and the slot it occupies. Loading is forgiving:
//! corrupt lines are skipped and orders that fail [`Order::is_valid`]
//! become stand-still orders, so a damaged save still loads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{GameError, Result};
use crate::order::Order;
use crate::queue::{OrderQueue, OrderSlot};
use crate::unit::UnitHandle;
use crate::world::World;

/// One order with its owner and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedOrder {
    /// Owning unit.
    pub unit: UnitHandle,
    /// Slot the order occupies.
    pub slot: OrderSlot,
    /// The order.
    pub order: Order,
}

/// Outcome of [`load_orders`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Orders placed as written.
    pub loaded: usize,
    /// Orders replaced by stand-still because they failed validation.
    pub replaced: usize,
    /// Lines that did not parse.
    pub corrupt: usize,
    /// Records naming a unit that does not exist.
    pub orphaned: usize,
}

/// Every order of every unit, one record per line in slot order.
///
/// # Errors
///
/// Returns [`GameError::InvalidState`] if a record cannot be written.
pub fn save_orders(world: &World) -> Result<String> {
    let mut out = String::new();
    for unit in world.units.iter() {
        for (slot, order) in unit.orders.slots() {
            let record = SavedOrder {
                unit: unit.handle,
                slot,
                order: *order,
            };
            let line = ron::to_string(&record)
                .map_err(|e| GameError::InvalidState(format!("Failed to write order: {e}")))?;
            out.push_str(&line);
            out.push('\n');
        }
    }
    Ok(out)
}

/// Replace the orders of every unit named in `text`.
///
/// A unit's queue is reset the first time one of its records is seen, so
/// units absent from the text keep their orders.
pub fn load_orders(world: &mut World, text: &str) -> LoadReport {
    let mut report = LoadReport::default();
    let mut reset = BTreeSet::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let saved: SavedOrder = match ron::from_str(line) {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(line = index + 1, error = %e, "corrupt order record skipped");
                report.corrupt += 1;
                continue;
            }
        };
        let order = if saved.order.is_valid(&world.catalog) {
            report.loaded += 1;
            saved.order
        } else {
            tracing::warn!(
                line = index + 1,
                unit = %saved.unit,
                action = %saved.order.action(),
                "invalid order replaced by stand-still"
            );
            report.replaced += 1;
            Order::still()
        };
        let Some(unit) = world.unit_mut(saved.unit) else {
            report.orphaned += 1;
            continue;
        };
        if reset.insert(saved.unit) {
            unit.orders = OrderQueue::new();
        }
        place(&mut unit.orders, saved.slot, order);
    }
    tracing::debug!(?report, "orders loaded");
    report
}

fn place(queue: &mut OrderQueue, slot: OrderSlot, order: Order) {
    match slot {
        OrderSlot::Queue(0) => {
            queue.replace_active(order);
        }
        OrderSlot::Queue(_) => queue.push(order),
        OrderSlot::Critical => {
            queue.set_critical(order);
        }
        OrderSlot::Saved => {
            queue.set_saved(order);
        }
        OrderSlot::Pending => {
            queue.set_pending(order);
        }
    }
}
