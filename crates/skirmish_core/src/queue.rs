//! The per-unit order queue with its critical, saved and pending slots.
//!
//! The queue is never empty: whenever the last order would be removed a
//! stand-still order takes its place.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::order::Order;

/// Which slot of a unit's queue an order occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSlot {
    /// Position in the main queue (0 is active).
    Queue(usize),
    /// The one-shot critical slot.
    Critical,
    /// The order to resume after an interruption.
    Saved,
    /// The order applied once the unit becomes able to act.
    Pending,
}

/// Orders of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderQueue {
    orders: VecDeque<Order>,
    critical: Option<Order>,
    saved: Option<Order>,
    pending: Option<Order>,
    /// The active order is currently taken out for execution.
    #[serde(skip)]
    detached: bool,
    /// The queue was reset while the active order was taken out.
    #[serde(skip)]
    reset_while_detached: bool,
}

impl OrderQueue {
    /// Queue holding a single stand-still order.
    #[must_use]
    pub fn new() -> Self {
        Self::with_active(Order::still())
    }

    /// Queue holding a single order.
    #[must_use]
    pub fn with_active(order: Order) -> Self {
        Self {
            orders: VecDeque::from([order]),
            critical: None,
            saved: None,
            pending: None,
            detached: false,
            reset_while_detached: false,
        }
    }

    /// Number of orders in the main queue (at least one).
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Always false; present for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// The active order.
    ///
    /// # Panics
    ///
    /// Never in practice: the queue always holds an order.
    #[must_use]
    pub fn active(&self) -> &Order {
        &self.orders[0]
    }

    /// The active order, mutably.
    pub fn active_mut(&mut self) -> &mut Order {
        &mut self.orders[0]
    }

    /// Order at a queue position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Order> {
        self.orders.get(index)
    }

    /// Order at a queue position, mutably.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Order> {
        self.orders.get_mut(index)
    }

    /// Iterate the main queue from the active order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Order> + ExactSizeIterator {
        self.orders.iter()
    }

    /// Every order held, tagged with its slot.
    pub fn slots(&self) -> impl Iterator<Item = (OrderSlot, &Order)> {
        self.orders
            .iter()
            .enumerate()
            .map(|(i, o)| (OrderSlot::Queue(i), o))
            .chain(self.critical.iter().map(|o| (OrderSlot::Critical, o)))
            .chain(self.saved.iter().map(|o| (OrderSlot::Saved, o)))
            .chain(self.pending.iter().map(|o| (OrderSlot::Pending, o)))
    }

    /// Append to the end of the queue.
    pub fn push(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    /// Insert right after the active order.
    pub fn insert_after_active(&mut self, order: Order) {
        self.orders.insert(1, order);
    }

    /// Drop everything after the active order, returning what was dropped.
    pub fn truncate_to_active(&mut self) -> Vec<Order> {
        self.orders.drain(1..).collect()
    }

    /// Replace the active order, returning the old one.
    pub fn replace_active(&mut self, order: Order) -> Order {
        if self.detached {
            self.reset_while_detached = true;
        }
        std::mem::replace(&mut self.orders[0], order)
    }

    /// Remove the finished active order so the next one becomes active.
    ///
    /// Returns `None` and leaves the queue untouched if only one order is
    /// queued.
    pub fn pop_active(&mut self) -> Option<Order> {
        if self.orders.len() > 1 {
            self.orders.pop_front()
        } else {
            None
        }
    }

    /// Remove an order at any position; a stand-still order is left behind
    /// if the queue would become empty.
    pub fn remove_at(&mut self, index: usize) -> Option<Order> {
        if index == 0 && self.detached {
            self.reset_while_detached = true;
        }
        let removed = self.orders.remove(index)?;
        if self.orders.is_empty() {
            self.orders.push_back(Order::still());
        }
        Some(removed)
    }

    /// Replace the whole queue and every slot with `order`, returning all
    /// orders that were held.
    pub fn replace_all(&mut self, order: Order) -> Vec<Order> {
        if self.detached {
            self.reset_while_detached = true;
        }
        let mut out: Vec<Order> = self.orders.drain(..).collect();
        out.extend(self.critical.take());
        out.extend(self.saved.take());
        out.extend(self.pending.take());
        self.orders.push_back(order);
        out
    }

    /// Critical slot.
    #[must_use]
    pub fn critical(&self) -> Option<&Order> {
        self.critical.as_ref()
    }

    /// Fill the critical slot, returning any order it held.
    pub fn set_critical(&mut self, order: Order) -> Option<Order> {
        self.critical.replace(order)
    }

    /// Empty the critical slot.
    pub fn take_critical(&mut self) -> Option<Order> {
        self.critical.take()
    }

    /// Saved slot.
    #[must_use]
    pub fn saved(&self) -> Option<&Order> {
        self.saved.as_ref()
    }

    /// Fill the saved slot, returning any order it held.
    pub fn set_saved(&mut self, order: Order) -> Option<Order> {
        self.saved.replace(order)
    }

    /// Empty the saved slot.
    pub fn take_saved(&mut self) -> Option<Order> {
        self.saved.take()
    }

    /// Pending-replacement slot.
    #[must_use]
    pub fn pending(&self) -> Option<&Order> {
        self.pending.as_ref()
    }

    /// Fill the pending slot, returning any order it held.
    pub fn set_pending(&mut self, order: Order) -> Option<Order> {
        self.pending.replace(order)
    }

    /// Empty the pending slot.
    pub fn take_pending(&mut self) -> Option<Order> {
        self.pending.take()
    }

    /// Take the active order out for execution, leaving a placeholder.
    pub fn detach_active(&mut self) -> Order {
        self.detached = true;
        self.reset_while_detached = false;
        std::mem::replace(&mut self.orders[0], Order::still())
    }

    /// Put an executed order back.
    ///
    /// If the queue was reset while the order was out (the unit died, or a
    /// command replaced the active order) the order is handed back instead
    /// so the caller can cancel it.
    pub fn reattach_active(&mut self, order: Order) -> Option<Order> {
        let reset = self.reset_while_detached;
        self.detached = false;
        self.reset_while_detached = false;
        if reset {
            Some(order)
        } else {
            self.orders[0] = order;
            None
        }
    }

    /// Whether the active order is currently taken out.
    #[must_use]
    pub const fn is_detached(&self) -> bool {
        self.detached
    }
}

impl Default for OrderQueue {
    fn default() -> Self {
        Self::new()
    }
}
