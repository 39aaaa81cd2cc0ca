//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::logging::LogFormat;

/// Stop-signal task runner.
#[derive(Parser, Debug)]
#[command(name = "sst", version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format.
    #[arg(long, value_enum, default_value = "human", global = true, env = "SST_LOG_FORMAT")]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full session with a scripted participant.
    Run(RunArgs),

    /// Validate a task config without running anything.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the YAML task config.
    #[arg(short, long, env = "SST_CONFIG")]
    pub config: PathBuf,

    /// Participant behaviour.
    #[arg(short, long, value_enum, default_value = "qa")]
    pub mode: Mode,

    /// Write trial rows and block summaries here as JSON.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Sleep on the wall clock instead of a virtual clock.
    #[arg(long)]
    pub realtime: bool,

    /// Override both the block shuffle seed and the participant seed.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the YAML task config.
    #[arg(short, long, env = "SST_CONFIG")]
    pub config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Always-correct go responses, never responds on stop trials.
    Qa,
    /// Horse-race participant with RT jitter, misses and failed stops.
    Sim,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Qa => "qa",
            Mode::Sim => "sim",
        }
    }
}
