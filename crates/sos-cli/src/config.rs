use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use sos_core::HarvestMode;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "sos")]
#[command(
    author,
    version,
    about = "Harvests Artportalen sightings into the Species Observation System"
)]
#[command(after_help = "Examples:
  sos harvest --mode full
  sos harvest --mode incremental-active
  sos harvest-checklists
  sos process --mode full
  sos status

Tuning lives in sos.toml (~/.config/sos/sos.toml or --config).")]
pub struct Config {
    /// PostgreSQL URL of the SOS database (verbatim collections, observations, run history)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// PostgreSQL URL of the live Artportalen database
    #[arg(long, env = "ARTPORTALEN_DATABASE_URL")]
    pub artportalen_database_url: Option<String>,

    /// PostgreSQL URL of the Artportalen hot standby (defaults to the live database)
    #[arg(long, env = "ARTPORTALEN_BACKUP_DATABASE_URL")]
    pub artportalen_backup_database_url: Option<String>,

    /// Maximum connections per database pool
    #[arg(long, env = "SOS_MAX_CONNECTIONS", default_value = "10")]
    pub max_connections: u32,

    /// Custom path to sos.toml
    #[arg(short, long, env = "SOS_CONFIG", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Harvest sightings into the verbatim collection of a mode
    #[command(after_help = "Examples:
  sos harvest                            # Full harvest from the hot standby
  sos harvest --mode incremental-active  # Catch up the active instance from the live database")]
    Harvest {
        #[arg(short, long, value_enum, default_value = "full")]
        mode: ModeArg,
    },
    /// Harvest all checklists
    HarvestChecklists,
    /// Process verbatim sightings into the public and protected observation tables
    Process {
        #[arg(short, long, value_enum, default_value = "full")]
        mode: ModeArg,
    },
    /// Show the latest run of every stage
    Status,
}

/// Harvest mode as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Re-harvest the whole id span
    Full,
    /// Incremental run on the instance serving queries
    IncrementalActive,
    /// Incremental run on the idle instance
    IncrementalInactive,
}

impl From<ModeArg> for HarvestMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => HarvestMode::Full,
            ModeArg::IncrementalActive => HarvestMode::IncrementalActive,
            ModeArg::IncrementalInactive => HarvestMode::IncrementalInactive,
        }
    }
}
