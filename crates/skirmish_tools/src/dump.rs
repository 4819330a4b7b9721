//! Command log dumps.

use std::path::Path;

use skirmish_core::replay::Replay;

use crate::{Result, ToolError};

/// The command log of a bincode replay as text, one record per line.
///
/// The output parses back with `CommandLog::from_text`.
///
/// # Errors
///
/// Returns an error if the replay cannot be read or a record not written.
pub fn dump_log(path: &Path) -> Result<String> {
    let replay = Replay::load(path)?;
    Ok(replay.commands.to_text()?)
}

/// Write the dump of `replay` to `out`.
///
/// # Errors
///
/// Returns an error if either file fails.
pub fn dump_log_to(replay: &Path, out: &Path) -> Result<usize> {
    let text = dump_log(replay)?;
    std::fs::write(out, &text).map_err(|source| ToolError::Io {
        path: out.display().to_string(),
        source,
    })?;
    Ok(text.lines().count())
}
