//! Skirmish - Development Tools
//!
//! # Usage
//!
//! ```bash
//! # Check a catalog, or a scenario built over it
//! skirmish-tools validate --catalog data/catalog.ron
//! skirmish-tools validate --catalog data/catalog.ron --scenario data/duel.ron
//!
//! # Play a recorded replay and compare the end state
//! skirmish-tools replay --file games/duel.replay --verify
//!
//! # Play a text command log against a scenario
//! skirmish-tools replay --catalog data/catalog.ron --scenario data/duel.ron --log duel.log
//!
//! # Print the command log of a replay
//! skirmish-tools dump-log games/duel.replay
//! ```
//!
//! Reports go to stdout, logs to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skirmish_tools::{dump, playback, validate, Result};

#[derive(Parser)]
#[command(name = "skirmish-tools")]
#[command(about = "Development tools for Skirmish")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a catalog, or a scenario built over it
    Validate {
        /// Catalog RON file
        #[arg(short, long)]
        catalog: PathBuf,

        /// Scenario RON file
        #[arg(short, long)]
        scenario: Option<PathBuf>,
    },

    /// Play a replay and report desyncs and skipped records
    Replay {
        /// Bincode replay file
        #[arg(short, long, conflicts_with_all = ["catalog", "scenario", "log"])]
        file: Option<PathBuf>,

        /// Compare the end state with the recording
        #[arg(long, requires = "file")]
        verify: bool,

        /// Catalog RON file
        #[arg(short, long, requires_all = ["scenario", "log"])]
        catalog: Option<PathBuf>,

        /// Scenario RON file
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Text command log
        #[arg(short, long)]
        log: Option<PathBuf>,

        /// Ticks to play (default: one past the last record)
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// Print the command log of a bincode replay as text
    DumpLog {
        /// Bincode replay file
        file: PathBuf,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn emit<T: Serialize>(json: bool, report: &T, lines: impl FnOnce() -> Vec<String>) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        for line in lines() {
            println!("{line}");
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Validate { catalog, scenario } => {
            if let Some(scenario) = scenario {
                tracing::info!("Validating scenario: {}", scenario.display());
                let summary = validate::validate_scenario(&scenario, &catalog)?;
                emit(cli.json, &summary, || {
                    vec![format!(
                        "{}: {} layers, {} players, {} units, seed {}",
                        summary.id, summary.layers, summary.players, summary.units, summary.seed
                    )]
                })?;
            } else {
                tracing::info!("Validating catalog: {}", catalog.display());
                let summary = validate::validate_catalog(&catalog)?;
                emit(cli.json, &summary, || {
                    vec![format!(
                        "{} unit types, {} upgrades, {} spells",
                        summary.unit_types, summary.upgrades, summary.spells
                    )]
                })?;
            }
            Ok(true)
        }
        Commands::Replay {
            file,
            verify,
            catalog,
            scenario,
            log,
            ticks,
        } => {
            let summary = match (file, catalog, scenario, log) {
                (Some(file), ..) => playback::play_replay_file(&file, verify)?,
                (None, Some(catalog), Some(scenario), Some(log)) => {
                    playback::play_scenario_log(&catalog, &scenario, &log, ticks)?
                }
                _ => {
                    tracing::error!("replay needs --file, or --catalog with --scenario and --log");
                    return Ok(false);
                }
            };
            emit(cli.json, &summary, || summary.to_lines())?;
            Ok(summary.is_clean())
        }
        Commands::DumpLog { file, output } => {
            if let Some(output) = output {
                let records = dump::dump_log_to(&file, &output)?;
                tracing::info!(records, "wrote {}", output.display());
            } else {
                print!("{}", dump::dump_log(&file)?);
            }
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
