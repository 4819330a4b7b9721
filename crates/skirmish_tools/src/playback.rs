//! Replay playback and reporting.

use std::path::Path;

use serde::Serialize;
use skirmish_core::config::DesyncPolicy;
use skirmish_core::replay::{CommandLog, Replay, ReplayPlayer, ReplayReport};
use skirmish_core::scenario::ScenarioDef;

use crate::validate::load_catalog;
use crate::{read_text, Result};

/// A skipped record in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipEntry {
    /// Tick of the record.
    pub tick: u64,
    /// Command name.
    pub command: String,
    /// Why it was skipped.
    pub reason: String,
}

/// A desync in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DesyncEntry {
    /// Tick of the record.
    pub tick: u64,
    /// Seed in the log.
    pub expected: u32,
    /// Seed during playback.
    pub actual: u32,
}

/// Outcome of playing a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackSummary {
    /// Scenario id.
    pub scenario: String,
    /// Ticks played.
    pub ticks: u64,
    /// Records in the log.
    pub records: usize,
    /// Records re-issued and accepted.
    pub applied: usize,
    /// Records re-issued but rejected.
    pub rejected: usize,
    /// Records that no longer applied.
    pub skipped: Vec<SkipEntry>,
    /// Seed mismatches.
    pub desyncs: Vec<DesyncEntry>,
    /// Sync checksum at the end.
    pub sync_hash: u32,
    /// State hash at the end.
    pub state_hash: u64,
    /// Whether the end state matched the recording, when checked.
    pub matches_recording: Option<bool>,
}

impl PlaybackSummary {
    fn new(player: &ReplayPlayer, matches_recording: Option<bool>) -> Self {
        let replay = player.replay();
        let sim = player.simulation();
        let ReplayReport {
            applied,
            skipped,
            rejected,
            desyncs,
        } = player.report().clone();
        Self {
            scenario: replay.scenario_id.clone(),
            ticks: sim.tick_count(),
            records: replay.command_count(),
            applied,
            rejected,
            skipped: skipped
                .into_iter()
                .map(|s| SkipEntry {
                    tick: s.tick,
                    command: s.command,
                    reason: s.reason.to_string(),
                })
                .collect(),
            desyncs: desyncs
                .into_iter()
                .map(|d| DesyncEntry {
                    tick: d.tick,
                    expected: d.expected,
                    actual: d.actual,
                })
                .collect(),
            sync_hash: sim.sync_hash(),
            state_hash: sim.state_hash(),
            matches_recording,
        }
    }

    /// Whether playback found nothing wrong.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.desyncs.is_empty() && self.matches_recording != Some(false)
    }

    /// Human readable lines for the terminal.
    #[must_use]
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Scenario: {}", self.scenario),
            format!("Ticks: {}", self.ticks),
            format!(
                "Records: {} ({} applied, {} rejected, {} skipped)",
                self.records,
                self.applied,
                self.rejected,
                self.skipped.len()
            ),
        ];
        for skip in &self.skipped {
            lines.push(format!("  skipped {} at tick {}: {}", skip.command, skip.tick, skip.reason));
        }
        for desync in &self.desyncs {
            lines.push(format!(
                "  desync at tick {}: expected {:#010x}, got {:#010x}",
                desync.tick, desync.expected, desync.actual
            ));
        }
        lines.push(format!("Final state hash: {:016x}", self.state_hash));
        match self.matches_recording {
            Some(true) => lines.push("PASS: end state matches the recording".into()),
            Some(false) => lines.push("FAIL: end state differs from the recording".into()),
            None => {}
        }
        lines
    }
}

/// Play a bincode replay file.
///
/// With `verify` the end state is compared against the recording.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded.
pub fn play_replay_file(path: &Path, verify: bool) -> Result<PlaybackSummary> {
    let replay = Replay::load(path)?;
    tracing::info!(
        scenario = %replay.scenario_id,
        commands = replay.command_count(),
        ticks = replay.duration(),
        "replay loaded"
    );
    play(replay, verify)
}

/// Build a scenario and play a text command log against it.
///
/// Plays until `ticks`, or one tick past the last record when `None`.
///
/// # Errors
///
/// Returns an error if a file is invalid or the scenario does not build.
pub fn play_scenario_log(
    catalog: &Path,
    scenario: &Path,
    log: &Path,
    ticks: Option<u64>,
) -> Result<PlaybackSummary> {
    let catalog = load_catalog(catalog)?;
    let def = ScenarioDef::load(scenario)?;
    let sim = def.build(catalog)?;
    let commands = CommandLog::from_text(&log.display().to_string(), &read_text(log)?)?;

    let mut replay = Replay::new(def.id.clone(), &sim)?;
    let last = commands.iter().map(|r| r.tick + 1).max().unwrap_or(0);
    replay.final_tick = ticks.unwrap_or(last);
    replay.commands = commands;
    play(replay, false)
}

fn play(replay: Replay, verify: bool) -> Result<PlaybackSummary> {
    let mut player = ReplayPlayer::new(replay)?.with_policy(DesyncPolicy::Report);
    if verify {
        let matches = player.verify()?;
        Ok(PlaybackSummary::new(&player, Some(matches)))
    } else {
        player.run_to_end();
        Ok(PlaybackSummary::new(&player, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::prelude::*;
    use skirmish_test_utils::scenarios::battle;

    fn recorded_battle() -> Replay {
        let (mut sim, _, roster) = battle(3);
        let mut replay = Replay::new("battle", &sim).unwrap();
        sim.run_ticks(10);
        sim.send_command(Command::order(roster.blue[0], UnitCommand::StandGround))
            .unwrap();
        sim.run_ticks(30);
        replay.finalize(&sim);
        replay
    }

    #[test]
    fn test_verified_file_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("battle.replay");
        recorded_battle().save(&path).unwrap();

        let summary = play_replay_file(&path, true).unwrap();
        assert_eq!(summary.scenario, "battle");
        assert_eq!(summary.records, 1);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.matches_recording, Some(true));
        assert!(summary.is_clean());
        assert!(summary.to_lines().last().unwrap().starts_with("PASS"));
    }

    #[test]
    fn test_tampered_file_reports_desync() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tampered.replay");
        let mut replay = recorded_battle();
        let mut record = replay.commands.records()[0].clone();
        record.seed = record.seed.wrapping_add(7);
        let mut log = CommandLog::default();
        log.push(record);
        replay.commands = log;
        replay.save(&path).unwrap();

        let summary = play_replay_file(&path, false).unwrap();
        assert_eq!(summary.desyncs.len(), 1);
        assert_eq!(summary.desyncs[0].tick, 10);
        assert!(!summary.is_clean());

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["desyncs"][0]["tick"], 10);
    }
}
