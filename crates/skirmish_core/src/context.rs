//! The explicit simulation context threaded into every order.
//!
//! All state that must evolve identically on every peer and is not owned by
//! a unit lives here: the clock, the synchronized random stream and the
//! rolling sync checksum.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::SimClock;
use crate::events::GameEvent;
use crate::math::SyncRng;
use crate::player::PlayerId;

/// Clock, random stream and checksum of one simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimContext {
    /// Tick counter.
    pub clock: SimClock,
    /// Synchronized random stream.
    pub rng: SyncRng,
    /// Rolling checksum over processed units.
    pub sync_hash: u32,
    /// Events produced since the last drain.
    #[serde(skip)]
    pub events: Vec<GameEvent>,
}

impl SimContext {
    /// Fresh context at tick zero.
    #[must_use]
    pub fn new(seed: u32, ticks_per_second: u32) -> Self {
        Self {
            clock: SimClock::new(ticks_per_second),
            rng: SyncRng::new(seed),
            sync_hash: 0,
            events: Vec::new(),
        }
    }

    /// Current tick.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.clock.tick()
    }

    /// Current seed of the random stream.
    #[must_use]
    pub const fn seed(&self) -> u32 {
        self.rng.seed()
    }

    /// Draw a value in `0..=max` on behalf of a unit, counting the draw.
    pub fn roll(&mut self, draws: &mut u32, max: u32) -> u32 {
        *draws = draws.wrapping_add(1);
        self.rng.gen_range(0..=max)
    }

    /// Record an event.
    pub fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    /// Send a message to a player.
    pub fn notify(&mut self, player: PlayerId, message: impl Into<String>) {
        self.events.push(GameEvent::Notification {
            player,
            message: message.into(),
        });
    }

    /// Take all pending events.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }
}
