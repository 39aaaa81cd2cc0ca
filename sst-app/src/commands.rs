//! `run` and `check` handlers.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use sst_core::Direction;
use sst_experiment::{
    BlockHooks, BlockInfo, BlockSummary, MockTriggerPort, ParticipantPolicy, ScriptedParticipant,
    Session, SessionResult, TaskSettings, TriggerEmitter,
};
use sst_timing::{HighPrecisionTimer, Timer, VirtualTimer};
use tracing::info;

use crate::args::{CheckArgs, Cli, Commands, Mode, RunArgs};
use crate::loader;

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run(&args),
        Commands::Check(args) => check(&args),
    }
}

/// Block triggers plus the between-block feedback line.
#[derive(Debug, Default)]
struct BlockBreaks;

impl BlockHooks for BlockBreaks {
    fn on_block_start(&mut self, block: &BlockInfo, triggers: &mut dyn TriggerEmitter) {
        info!(
            block = block.block_idx + 1,
            of = block.total_blocks,
            trials = block.labels.len(),
            "starting block"
        );
        triggers.emit("block_onset");
    }

    fn on_block_end(
        &mut self,
        block: &BlockInfo,
        summary: &BlockSummary,
        triggers: &mut dyn TriggerEmitter,
    ) {
        triggers.emit("block_end");
        info!(
            block = block.block_idx + 1,
            go_accuracy = %percent(summary.go_hit_rate),
            stop_accuracy = %percent(summary.stop_success_rate),
            "block break"
        );
    }
}

fn percent(rate: Option<f64>) -> String {
    rate.map_or_else(|| "n/a".to_string(), |r| format!("{:.0}%", r * 100.0))
}

#[derive(Serialize)]
struct BlockReport<'a> {
    block_id: &'a str,
    summary: &'a BlockSummary,
    ssd_at_end: &'a BTreeMap<Direction, Duration>,
}

#[derive(Serialize)]
struct Report<'a> {
    mode: &'static str,
    settings: &'a TaskSettings,
    blocks: Vec<BlockReport<'a>>,
    trials: Vec<BTreeMap<String, Value>>,
    triggers_sent: u64,
    triggers_failed: u64,
}

fn run(args: &RunArgs) -> Result<()> {
    let mut config = loader::load(&args.config)?;
    if let Some(seed) = args.seed {
        config.settings.task.seed = Some(seed);
        config.simulation.seed = Some(seed);
    }
    let policy = match args.mode {
        Mode::Qa => config.simulation.ideal()?,
        Mode::Sim => config.simulation.horse_race()?,
    };
    let participant_seed = config
        .simulation
        .seed
        .or(config.settings.task.seed)
        .unwrap_or_else(rand::random);
    info!(
        config = %args.config.display(),
        mode = args.mode.as_str(),
        realtime = args.realtime,
        participant_seed,
        "starting session"
    );

    let settings = config.settings;
    let result = if args.realtime {
        execute(&settings, HighPrecisionTimer::new(), policy, participant_seed)?
    } else {
        execute(&settings, VirtualTimer::new(), policy, participant_seed)?
    };

    let trials = result.records().count();
    let stops: Vec<bool> = result
        .records()
        .filter_map(|r| r.stop_success())
        .collect();
    let withheld = stops.iter().filter(|s| **s).count();
    println!(
        "{trials} trials in {} blocks; stop success {withheld}/{}",
        result.blocks.len(),
        stops.len()
    );

    if let Some(path) = &args.output {
        write_report(path, args.mode, &settings, &result)?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn execute<T: Timer>(
    settings: &TaskSettings,
    timer: T,
    policy: ParticipantPolicy,
    seed: u64,
) -> Result<SessionResult> {
    let mut participant =
        ScriptedParticipant::new(timer, policy, settings.response_keys(), seed);
    let mut session = Session::new(settings.clone(), MockTriggerPort::default())?;
    let result = session.run_all(&mut participant, &mut BlockBreaks)?;
    Ok(result)
}

fn write_report(
    path: &Path,
    mode: Mode,
    settings: &TaskSettings,
    result: &SessionResult,
) -> Result<()> {
    let report = Report {
        mode: mode.as_str(),
        settings,
        blocks: result
            .blocks
            .iter()
            .map(|b| BlockReport {
                block_id: &b.block_id,
                summary: &b.summary,
                ssd_at_end: &b.ssd_at_end,
            })
            .collect(),
        trials: result.rows(),
        triggers_sent: result.triggers_sent,
        triggers_failed: result.triggers_failed,
    };
    let file =
        File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &report)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

fn check(args: &CheckArgs) -> Result<()> {
    let config = loader::load(&args.config)?;
    config.simulation.horse_race()?;
    let task = &config.settings.task;
    let (blocks, trials) = (task.total_blocks, task.trials_per_block);
    Session::new(config.settings.clone(), MockTriggerPort::default())?;
    println!(
        "{}: ok ({blocks} blocks x {trials} trials)",
        args.config.display()
    );
    Ok(())
}
