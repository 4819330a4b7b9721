//! Routing between map layers through connector pairs.
//!
//! A unit ordered to a tile on another layer first walks through a chain of
//! connectors. The chain is found once, at issue time, with a breadth-first
//! search over layers; every hop becomes a `Use` order queued in front of
//! the final one.

use std::collections::{BTreeMap, VecDeque};

use crate::map::LayerId;
use crate::math::{Footprint, TilePos};
use crate::order::Order;
use crate::unit::UnitHandle;
use crate::world::World;

/// One usable connector: its entry on `from`, leading to `exit` on `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    entry: UnitHandle,
    entry_pos: TilePos,
    from: LayerId,
    exit_area: Footprint,
    to: LayerId,
}

/// Every live, paired connector in slot order.
fn links(world: &World) -> Vec<Link> {
    world
        .units
        .iter()
        .filter(|u| !u.dying && !u.removed && !u.under_construction)
        .filter(|u| world.catalog.unit_type(u.type_id).is_some_and(|d| d.connector))
        .filter_map(|u| {
            let exit = u.connection.filter(|c| world.is_alive(*c))?;
            let exit_unit = world.unit(exit)?;
            Some(Link {
                entry: u.handle,
                entry_pos: u.pos,
                from: u.layer,
                exit_area: world.footprint(exit)?,
                to: exit_unit.layer,
            })
        })
        .collect()
}

/// Connectors to pass, in order, to get from `start` on `from` to layer `to`.
///
/// Returns an empty chain when both are on the same layer and `None` when
/// no chain exists. Hops are expanded nearest connector first, ties by
/// slot, so the same world always yields the same chain.
#[must_use]
pub fn find_chain(
    world: &World,
    from: LayerId,
    start: TilePos,
    to: LayerId,
) -> Option<Vec<UnitHandle>> {
    if from == to {
        return Some(Vec::new());
    }
    let links = links(world);
    // layer -> (link used to enter it, where we arrive)
    let mut reached: BTreeMap<LayerId, Option<(usize, TilePos)>> = BTreeMap::new();
    reached.insert(from, None);
    let mut frontier = VecDeque::from([(from, start)]);

    while let Some((layer, at)) = frontier.pop_front() {
        let mut outgoing: Vec<(u32, usize)> = links
            .iter()
            .enumerate()
            .filter(|(_, l)| l.from == layer && !reached.contains_key(&l.to))
            .map(|(i, l)| (l.entry_pos.chebyshev(at), i))
            .collect();
        outgoing.sort_by_key(|(d, i)| (*d, links[*i].entry.slot));
        for (_, i) in outgoing {
            let link = links[i];
            if reached.contains_key(&link.to) {
                continue;
            }
            let arrival = link.exit_area.origin;
            reached.insert(link.to, Some((i, arrival)));
            if link.to == to {
                return Some(unwind(&links, &reached, to));
            }
            frontier.push_back((link.to, arrival));
        }
    }
    None
}

fn unwind(
    links: &[Link],
    reached: &BTreeMap<LayerId, Option<(usize, TilePos)>>,
    to: LayerId,
) -> Vec<UnitHandle> {
    let mut chain = Vec::new();
    let mut layer = to;
    while let Some(Some((i, _))) = reached.get(&layer) {
        chain.push(links[*i].entry);
        layer = links[*i].from;
    }
    chain.reverse();
    chain
}

/// `Use` orders walking the chain.
#[must_use]
pub fn chain_orders(world: &World, chain: &[UnitHandle]) -> Vec<Order> {
    chain
        .iter()
        .filter_map(|c| {
            let u = world.unit(*c)?;
            Some(Order::use_unit(*c, u.pos, u.layer))
        })
        .collect()
}
