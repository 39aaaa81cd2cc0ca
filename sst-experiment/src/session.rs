//! Session orchestration: blocks of trials driven through one trial
//! engine, one staircase and one trigger line.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use serde_json::Value;
use sst_core::{Direction, ResponseCapture, TrialLabel, TrialRecord, TriggerPort};
use tracing::{debug, info};

use crate::config::TaskSettings;
use crate::error::{ConfigError, SessionError};
use crate::sequencer::ConditionSequencer;
use crate::staircase::StaircaseController;
use crate::state::TrialEngine;
use crate::trial::TrialMeta;
use crate::trigger::{TriggerEmitter, TriggerLine};

/// Block being run, as seen by hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub block_id: String,
    pub block_idx: usize,
    pub total_blocks: usize,
    pub labels: Vec<TrialLabel>,
}

/// Caller-supplied behaviour around blocks and trials (instruction
/// screens, block-break feedback, extra triggers). Every method defaults
/// to a no-op.
pub trait BlockHooks {
    fn on_block_start(&mut self, _block: &BlockInfo, _triggers: &mut dyn TriggerEmitter) {}

    fn on_block_end(
        &mut self,
        _block: &BlockInfo,
        _summary: &BlockSummary,
        _triggers: &mut dyn TriggerEmitter,
    ) {
    }

    fn on_trial_start(
        &mut self,
        _meta: &TrialMeta,
        _label: TrialLabel,
        _triggers: &mut dyn TriggerEmitter,
    ) {
    }

    fn on_trial_end(&mut self, _record: &TrialRecord, _triggers: &mut dyn TriggerEmitter) {}
}

/// Hooks that do nothing at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl BlockHooks for NoHooks {}

/// Sends `block_onset` / `block_end` around every block.
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerHooks;

impl BlockHooks for TriggerHooks {
    fn on_block_start(&mut self, _block: &BlockInfo, triggers: &mut dyn TriggerEmitter) {
        triggers.emit("block_onset");
    }

    fn on_block_end(
        &mut self,
        _block: &BlockInfo,
        _summary: &BlockSummary,
        triggers: &mut dyn TriggerEmitter,
    ) {
        triggers.emit("block_end");
    }
}

/// Block-break feedback figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlockSummary {
    pub go_trials: usize,
    pub go_hits: usize,
    pub go_hit_rate: Option<f64>,
    pub mean_go_rt: Option<Duration>,
    pub stop_trials: usize,
    pub stop_successes: usize,
    pub stop_success_rate: Option<f64>,
}

impl BlockSummary {
    pub fn from_records(records: &[TrialRecord]) -> Self {
        let mut summary = Self::default();
        let mut rt_total = Duration::ZERO;
        let mut rt_count = 0u32;
        for record in records {
            if record.is_stop() {
                summary.stop_trials += 1;
                if record.stop_success() == Some(true) {
                    summary.stop_successes += 1;
                }
                continue;
            }
            summary.go_trials += 1;
            if record.go_hit == Some(true) {
                summary.go_hits += 1;
                if let Some(rt) = record.go_rt() {
                    rt_total += rt;
                    rt_count += 1;
                }
            }
        }
        summary.go_hit_rate = ratio(summary.go_hits, summary.go_trials);
        summary.stop_success_rate = ratio(summary.stop_successes, summary.stop_trials);
        summary.mean_go_rt = (rt_count > 0).then(|| rt_total / rt_count);
        summary
    }
}

fn ratio(part: usize, whole: usize) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockResult {
    pub block_id: String,
    pub block_idx: usize,
    pub records: Vec<TrialRecord>,
    pub summary: BlockSummary,
    /// Staircase position per direction once the block finished.
    pub ssd_at_end: BTreeMap<Direction, Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionResult {
    pub blocks: Vec<BlockResult>,
    pub triggers_sent: u64,
    pub triggers_failed: u64,
}

impl SessionResult {
    pub fn records(&self) -> impl Iterator<Item = &TrialRecord> {
        self.blocks.iter().flat_map(|b| b.records.iter())
    }

    /// Flat rows for tabular export, one per trial in run order.
    pub fn rows(&self) -> Vec<BTreeMap<String, Value>> {
        self.records().map(TrialRecord::to_row).collect()
    }
}

pub struct Session<P> {
    settings: TaskSettings,
    engine: TrialEngine,
    sequencer: ConditionSequencer,
    staircase: StaircaseController,
    triggers: TriggerLine<P>,
    next_trial_id: u64,
}

impl<P: TriggerPort> Session<P> {
    /// Validates `settings` and prepares a fresh staircase. Nothing is
    /// presented and no trigger is sent.
    pub fn new(settings: TaskSettings, port: P) -> Result<Self, ConfigError> {
        let engine = TrialEngine::from_settings(&settings)?;
        let task = &settings.task;
        let sequencer =
            ConditionSequencer::new(task.go_ratio, task.directions.clone(), task.max_stop_run);
        let staircase = StaircaseController::from_settings(&settings.controller, &task.directions)?;
        let triggers = TriggerLine::new(port, settings.triggers.clone());
        Ok(Self {
            settings,
            engine,
            sequencer,
            staircase,
            triggers,
            next_trial_id: 1,
        })
    }

    pub fn settings(&self) -> &TaskSettings {
        &self.settings
    }

    pub fn staircase(&self) -> &StaircaseController {
        &self.staircase
    }

    /// Id the next trial will receive.
    pub fn next_trial_id(&self) -> u64 {
        self.next_trial_id
    }

    pub fn triggers(&self) -> &TriggerLine<P> {
        &self.triggers
    }

    /// Condition list for block `block_idx`. With a configured seed the
    /// list is reproducible per block.
    pub fn generate_block(&self, block_idx: usize) -> Vec<TrialLabel> {
        let mut rng = match self.settings.task.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(block_idx as u64)),
            None => StdRng::from_os_rng(),
        };
        self.sequencer
            .generate(self.settings.task.trials_per_block, &mut rng)
    }

    pub fn run_block<S, H>(
        &mut self,
        block_idx: usize,
        services: &mut S,
        hooks: &mut H,
    ) -> Result<BlockResult, S::Error>
    where
        S: ResponseCapture + ?Sized,
        H: BlockHooks + ?Sized,
    {
        let labels = self.generate_block(block_idx);
        self.run_labels(block_idx, labels, services, hooks)
    }

    /// Runs a block over a caller-supplied condition list.
    pub fn run_labels<S, H>(
        &mut self,
        block_idx: usize,
        labels: Vec<TrialLabel>,
        services: &mut S,
        hooks: &mut H,
    ) -> Result<BlockResult, S::Error>
    where
        S: ResponseCapture + ?Sized,
        H: BlockHooks + ?Sized,
    {
        let block = BlockInfo {
            block_id: format!("block_{block_idx}"),
            block_idx,
            total_blocks: self.settings.task.total_blocks,
            labels,
        };
        info!(
            block = %block.block_id,
            trials = block.labels.len(),
            stops = block.labels.iter().filter(|l| l.is_stop()).count(),
            "block started"
        );
        hooks.on_block_start(&block, &mut self.triggers);

        let mut records = Vec::with_capacity(block.labels.len());
        for label in &block.labels {
            let meta = TrialMeta {
                trial_id: self.next_trial_id,
                block_id: block.block_id.clone(),
                block_idx,
            };
            self.next_trial_id += 1;

            hooks.on_trial_start(&meta, *label, &mut self.triggers);
            let record = self.engine.run_trial(
                *label,
                &meta,
                &mut self.staircase,
                services,
                &mut self.triggers,
            )?;
            hooks.on_trial_end(&record, &mut self.triggers);
            records.push(record);
        }

        let summary = BlockSummary::from_records(&records);
        let ssd_at_end = self.staircase.snapshot(&self.settings.task.directions);
        info!(
            block = %block.block_id,
            go_hit_rate = summary.go_hit_rate,
            stop_success_rate = summary.stop_success_rate,
            mean_go_rt_ms = summary.mean_go_rt.map(|d| d.as_secs_f64() * 1e3),
            "block finished"
        );
        debug!(block = %block.block_id, ssd = ?ssd_at_end, "staircase at block end");
        hooks.on_block_end(&block, &summary, &mut self.triggers);

        Ok(BlockResult {
            block_id: block.block_id,
            block_idx,
            records,
            summary,
            ssd_at_end,
        })
    }

    /// Runs every configured block between `exp_onset` and `exp_end`.
    pub fn run_all<S, H>(
        &mut self,
        services: &mut S,
        hooks: &mut H,
    ) -> Result<SessionResult, S::Error>
    where
        S: ResponseCapture + ?Sized,
        H: BlockHooks + ?Sized,
    {
        self.triggers.emit("exp_onset");
        let total = self.settings.task.total_blocks;
        let mut blocks = Vec::with_capacity(total);
        for block_idx in 0..total {
            blocks.push(self.run_block(block_idx, services, hooks)?);
        }
        self.triggers.emit("exp_end");
        info!(
            blocks = blocks.len(),
            trials = self.next_trial_id - 1,
            triggers_failed = self.triggers.failed(),
            "session finished"
        );
        Ok(SessionResult {
            blocks,
            triggers_sent: self.triggers.sent(),
            triggers_failed: self.triggers.failed(),
        })
    }
}

/// Validates `settings` and runs the whole session.
pub fn run_session<P, S, H>(
    settings: TaskSettings,
    port: P,
    services: &mut S,
    hooks: &mut H,
) -> Result<SessionResult, SessionError<S::Error>>
where
    P: TriggerPort,
    S: ResponseCapture + ?Sized,
    H: BlockHooks + ?Sized,
{
    let mut session = Session::new(settings, port)?;
    session.run_all(services, hooks).map_err(SessionError::Service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ParticipantPolicy, ScriptedParticipant};
    use crate::trigger::MockTriggerPort;
    use sst_timing::VirtualTimer;

    fn settings(blocks: usize, trials: usize) -> TaskSettings {
        let mut s = TaskSettings::default();
        s.task.total_blocks = blocks;
        s.task.trials_per_block = trials;
        s.task.seed = Some(11);
        s
    }

    fn ideal(settings: &TaskSettings) -> ScriptedParticipant<VirtualTimer> {
        ScriptedParticipant::new(
            VirtualTimer::new(),
            ParticipantPolicy::Ideal {
                go_rt: Duration::from_millis(400),
            },
            settings.response_keys(),
            5,
        )
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl BlockHooks for Recorder {
        fn on_block_start(&mut self, block: &BlockInfo, _: &mut dyn TriggerEmitter) {
            self.events.push(format!("start {}", block.block_id));
        }
        fn on_block_end(
            &mut self,
            block: &BlockInfo,
            s: &BlockSummary,
            _: &mut dyn TriggerEmitter,
        ) {
            let n = s.go_trials + s.stop_trials;
            self.events.push(format!("end {} {n}", block.block_id));
        }
        fn on_trial_end(&mut self, record: &TrialRecord, _: &mut dyn TriggerEmitter) {
            self.events.push(format!("trial {}", record.trial_id));
        }
    }

    #[test]
    fn invalid_settings_fail_before_anything_runs() {
        let mut s = settings(1, 4);
        s.controller.step = 0.0;
        let err = Session::new(s, MockTriggerPort::default()).err().unwrap();
        assert_eq!(err.issues()[0].path, "controller.step");
    }

    #[test]
    fn seeded_blocks_are_reproducible() {
        let session = Session::new(settings(2, 20), MockTriggerPort::default()).unwrap();
        assert_eq!(session.generate_block(0), session.generate_block(0));
        assert_ne!(session.generate_block(0), session.generate_block(1));
    }

    #[test]
    fn run_all_numbers_trials_across_blocks() {
        let s = settings(2, 8);
        let mut p = ideal(&s);
        let mut session = Session::new(s, MockTriggerPort::default()).unwrap();
        let result = session.run_all(&mut p, &mut TriggerHooks).unwrap();

        let ids: Vec<u64> = result.records().map(|r| r.trial_id).collect();
        assert_eq!(ids, (1..=16).collect::<Vec<_>>());
        assert_eq!(session.next_trial_id(), 17);
        assert_eq!(result.blocks[1].records[0].block_id, "block_1");

        let sent = &session.triggers().port().sent;
        assert_eq!(sent.first(), Some(&98));
        assert_eq!(sent[1], 100);
        assert_eq!(sent.last(), Some(&99));
        assert_eq!(sent.iter().filter(|c| **c == 100).count(), 2);
        assert_eq!(result.triggers_failed, 0);
    }

    #[test]
    fn hooks_see_every_block_and_trial() {
        let s = settings(1, 3);
        let mut p = ideal(&s);
        let mut session = Session::new(s, MockTriggerPort::default()).unwrap();
        let mut hooks = Recorder::default();
        session.run_block(0, &mut p, &mut hooks).unwrap();
        assert_eq!(
            hooks.events,
            vec!["start block_0", "trial 1", "trial 2", "trial 3", "end block_0 3"]
        );
    }

    #[test]
    fn ideal_participant_summary() {
        let s = settings(1, 8);
        let mut p = ideal(&s);
        let mut session = Session::new(s, MockTriggerPort::default()).unwrap();
        let block = session.run_block(0, &mut p, &mut NoHooks).unwrap();

        let summary = &block.summary;
        assert_eq!(summary.go_trials, 6);
        assert_eq!(summary.stop_trials, 2);
        assert_eq!(summary.go_hit_rate, Some(1.0));
        assert_eq!(summary.stop_success_rate, Some(1.0));
        assert_eq!(summary.mean_go_rt, Some(Duration::from_millis(400)));
        // Two successful stops move the shared staircase up twice.
        assert_eq!(block.ssd_at_end[&Direction::Left], Duration::from_millis(350));
    }

    #[test]
    fn summary_of_empty_block_has_no_rates() {
        let summary = BlockSummary::from_records(&[]);
        assert_eq!(summary.go_hit_rate, None);
        assert_eq!(summary.stop_success_rate, None);
        assert_eq!(summary.mean_go_rt, None);
    }

    #[test]
    fn rows_flatten_every_trial() {
        let s = settings(1, 4);
        let mut p = ideal(&s);
        let result = run_session(s, MockTriggerPort::default(), &mut p, &mut NoHooks).unwrap();
        let rows = result.rows();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.contains_key("fixation_onset")));
        assert_eq!(rows[0]["trial_id"], Value::from(1u64));
    }

    #[test]
    fn run_session_reports_config_errors() {
        let mut s = settings(1, 4);
        s.task.key_list.clear();
        let mut p = ideal(&TaskSettings::default());
        let err = run_session(s, MockTriggerPort::default(), &mut p, &mut NoHooks).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }
}
