//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! Lockstep peers only exchange commands, so every peer must reach the same
//! state on its own. Sources of non-determinism include:
//!
//! - **Floating-point math**: positions and speeds use
//!   [`skirmish_core::math::Fixed`].
//!
//! - **HashMap iteration order**: units are walked in slot order and all
//!   keyed state lives in `BTreeMap`s.
//!
//! - **System randomness**: every roll goes through the synchronized
//!   stream in [`skirmish_core::context::SimContext`].
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual orders in `skirmish_core`
//! 2. **Property tests**: random command streams must still replay identically
//! 3. **Integration tests**: full scenarios are reproducible
//! 4. **Parallel tests**: running N simulations on threads all match

use std::thread;

use skirmish_core::prelude::*;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    fn from_hashes(hashes: Vec<u64>, ticks: u64) -> Self {
        Self {
            is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
            hashes,
            ticks,
        }
    }

    /// Get all unique hashes (should be 1 for a deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run any stepped state several times and compare the final hashes.
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);
    for _ in 0..runs {
        let mut state = setup();
        for _ in 0..ticks {
            step(&mut state);
        }
        hashes.push(hash(&state));
    }
    DeterminismResult::from_hashes(hashes, ticks)
}

/// Run a simulation twice from `setup_fn` and compare state hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        Simulation::state_hash,
    )
    .is_deterministic
}

/// Run `num_sims` simulations on scoped threads and collect their hashes.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    sim.run_ticks(num_ticks);
                    sim.state_hash()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });
    DeterminismResult::from_hashes(hashes, num_ticks)
}

/// Compare two runs tick by tick.
///
/// Returns the first tick after which the state hashes differ.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut a = setup_fn();
    let mut b = setup_fn();
    if a.state_hash() != b.state_hash() {
        return Some(0);
    }
    for tick in 1..=num_ticks {
        a.tick();
        b.tick();
        if a.state_hash() != b.state_hash() || a.sync_hash() != b.sync_hash() {
            return Some(tick);
        }
    }
    None
}

/// Check that a snapshot taken mid-game continues exactly like the
/// original.
pub fn verify_snapshot_continuation<F>(setup_fn: F, split: u64, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut original = setup_fn();
    original.run_ticks(split);
    let Ok(bytes) = original.serialize() else {
        return false;
    };
    let Ok(mut restored) = Simulation::deserialize(&bytes) else {
        return false;
    };
    if restored.state_hash() != original.state_hash() {
        return false;
    }
    original.run_ticks(num_ticks);
    restored.run_ticks(num_ticks);
    original.state_hash() == restored.state_hash() && original.sync_hash() == restored.sync_hash()
}

/// A command issued before a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedCommand {
    /// Tick the command is sent before.
    pub tick: u64,
    /// The command.
    pub command: Command,
}

/// Drive `sim` through `script` for `ticks` ticks.
///
/// Rejected commands are ignored. Returns how many were accepted.
pub fn play_script(sim: &mut Simulation, script: &[TimedCommand], ticks: u64) -> usize {
    let mut accepted = 0;
    let mut next = 0;
    for tick in 0..ticks {
        while let Some(entry) = script.get(next) {
            if entry.tick > tick {
                break;
            }
            if sim.send_command(entry.command).is_ok() {
                accepted += 1;
            }
            next += 1;
        }
        sim.tick();
    }
    accepted
}

/// Proptest strategies for command streams.
///
/// Units are addressed by index into a caller-supplied roster so the
/// generated values stay independent of any particular world.
pub mod strategies {
    use proptest::prelude::*;
    use skirmish_core::fixtures::SANDBOX_SIZE;
    use skirmish_core::prelude::*;

    use super::TimedCommand;

    /// A command shape not yet bound to units.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CommandShape {
        /// Stop.
        Stop,
        /// Stand ground.
        StandGround,
        /// Move to a tile.
        Move(TilePos),
        /// Patrol to a tile.
        Patrol(TilePos),
        /// Attack-move to a tile.
        AttackMove(TilePos),
        /// Attack another roster unit.
        AttackUnit(usize),
        /// Follow another roster unit.
        Follow(usize),
    }

    /// One generated step of a command stream.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScriptStep {
        /// Tick the command is sent before.
        pub tick: u64,
        /// Index of the acting unit in the roster.
        pub actor: usize,
        /// Whether to flush the queue.
        pub flush: bool,
        /// What to order.
        pub shape: CommandShape,
    }

    /// A tile on the sandbox map.
    pub fn arb_tile() -> impl Strategy<Value = TilePos> {
        let edge = SANDBOX_SIZE as i32;
        (0..edge, 0..edge).prop_map(|(x, y)| TilePos::new(x, y))
    }

    /// Any command shape.
    pub fn arb_shape() -> impl Strategy<Value = CommandShape> {
        prop_oneof![
            Just(CommandShape::Stop),
            Just(CommandShape::StandGround),
            arb_tile().prop_map(CommandShape::Move),
            arb_tile().prop_map(CommandShape::Patrol),
            arb_tile().prop_map(CommandShape::AttackMove),
            any::<usize>().prop_map(CommandShape::AttackUnit),
            any::<usize>().prop_map(CommandShape::Follow),
        ]
    }

    /// A command stream of up to `max_len` steps within `ticks` ticks.
    pub fn arb_script(max_len: usize, ticks: u64) -> impl Strategy<Value = Vec<ScriptStep>> {
        proptest::collection::vec(
            (0..ticks, any::<usize>(), any::<bool>(), arb_shape()).prop_map(
                |(tick, actor, flush, shape)| ScriptStep {
                    tick,
                    actor,
                    flush,
                    shape,
                },
            ),
            0..max_len,
        )
        .prop_map(|mut steps| {
            steps.sort_by_key(|s| s.tick);
            steps
        })
    }

    /// Bind generated steps to real units.
    ///
    /// Indices wrap around the roster; an empty roster yields nothing.
    #[must_use]
    pub fn bind(steps: &[ScriptStep], roster: &[UnitHandle]) -> Vec<TimedCommand> {
        if roster.is_empty() {
            return Vec::new();
        }
        let pick = |i: usize| roster[i % roster.len()];
        steps
            .iter()
            .map(|step| {
                let order = match step.shape {
                    CommandShape::Stop => UnitCommand::Stop,
                    CommandShape::StandGround => UnitCommand::StandGround,
                    CommandShape::Move(pos) => UnitCommand::Move { pos, layer: 0 },
                    CommandShape::Patrol(pos) => UnitCommand::Patrol { pos, layer: 0 },
                    CommandShape::AttackMove(pos) => UnitCommand::Attack {
                        target: None,
                        pos,
                        layer: 0,
                    },
                    CommandShape::AttackUnit(i) => UnitCommand::Attack {
                        target: Some(pick(i)),
                        pos: TilePos::new(0, 0),
                        layer: 0,
                    },
                    CommandShape::Follow(i) => UnitCommand::Follow { target: pick(i) },
                };
                let actor = pick(step.actor);
                TimedCommand {
                    tick: step.tick,
                    command: if step.flush {
                        Command::order(actor, order)
                    } else {
                        Command::queued(actor, order)
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::strategies::{arb_script, bind};
    use super::*;
    use crate::scenarios::{battle, economy, scattered};
    use proptest::prelude::*;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);
        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_divergent_state_is_reported() {
        let counter = std::cell::Cell::new(0u64);
        let result = verify_determinism(
            2,
            1,
            || {
                counter.set(counter.get() + 1);
                counter.get()
            },
            |_| {},
            |n| *n,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 2);
    }

    #[test]
    fn test_economy_determinism() {
        assert!(verify_simulation_determinism(|| economy(6).0, 300));
    }

    #[test]
    fn test_battle_has_no_divergence() {
        assert_eq!(find_first_divergence(|| battle(5).0, 200), None);
    }

    #[test]
    fn test_parallel_battles_match() {
        run_parallel_simulations(|| battle(6).0, 4, 150).assert_deterministic();
    }

    #[test]
    fn test_snapshot_continues_identically() {
        assert!(verify_snapshot_continuation(|| economy(4).0, 60, 120));
        assert!(verify_snapshot_continuation(|| battle(4).0, 25, 100));
    }

    #[test]
    fn test_script_drives_orders() {
        let (mut sim, _, roster) = battle(2);
        let script = [TimedCommand {
            tick: 5,
            command: Command::order(roster.blue[0], UnitCommand::Stop),
        }];
        assert_eq!(play_script(&mut sim, &script, 10), 1);
        assert_eq!(sim.log().len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_command_streams_replay_identically(
            seed in any::<u32>(),
            steps in arb_script(40, 120),
        ) {
            let run = || {
                let (mut sim, _, roster) = scattered(seed, 5);
                let units: Vec<_> = roster.mobile().collect();
                play_script(&mut sim, &bind(&steps, &units), 150);
                (sim.sync_hash(), sim.state_hash())
            };
            prop_assert_eq!(run(), run());
        }

        #[test]
        fn prop_queue_never_empty(
            seed in any::<u32>(),
            steps in arb_script(60, 100),
        ) {
            let (mut sim, _, roster) = scattered(seed, 4);
            let units: Vec<_> = roster.mobile().collect();
            let script = bind(&steps, &units);
            let mut next = 0;
            for tick in 0..120u64 {
                while let Some(entry) = script.get(next) {
                    if entry.tick > tick {
                        break;
                    }
                    let _ = sim.send_command(entry.command);
                    next += 1;
                }
                sim.tick();
                for unit in sim.world().units.iter() {
                    prop_assert!(unit.orders.len() >= 1);
                }
            }
        }

        #[test]
        fn prop_recorded_stream_plays_back(
            seed in any::<u32>(),
            steps in arb_script(20, 80),
        ) {
            let (mut sim, _, roster) = scattered(seed, 3);
            let units: Vec<_> = roster.mobile().collect();
            let mut replay = Replay::new("prop", &sim).unwrap();
            play_script(&mut sim, &bind(&steps, &units), 100);
            replay.finalize(&sim);

            let mut player = ReplayPlayer::new(replay)
                .unwrap()
                .with_policy(DesyncPolicy::Report);
            prop_assert!(player.verify().unwrap());
            prop_assert!(player.report().desyncs.is_empty());
        }
    }
}
