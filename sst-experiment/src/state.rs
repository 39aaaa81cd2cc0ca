use std::time::Duration;

use sst_core::{
    CaptureRequest, PhaseContext, PhaseName, PhaseRecord, ResponseCapture, StimulusId,
    TrialLabel, TrialRecord, TrialState,
};
use tracing::{debug, warn};

use crate::config::TaskSettings;
use crate::error::ConfigError;
use crate::staircase::StaircaseController;
use crate::trial::{ResponseKeys, TrialDurations, TrialMeta};
use crate::trigger::TriggerEmitter;

/// Runs single trials end to end.
///
/// Stateless between trials: the staircase, trigger line and services are
/// passed in by the session that owns them.
#[derive(Debug, Clone)]
pub struct TrialEngine {
    durations: TrialDurations,
    keys: ResponseKeys,
}

/// Fields shared by every phase context of one trial.
struct TrialScope<'a> {
    meta: &'a TrialMeta,
    label: TrialLabel,
    ssd: Option<Duration>,
}

impl TrialScope<'_> {
    fn context(&self, phase: PhaseName, deadline: Duration) -> PhaseContext {
        PhaseContext {
            trial_id: self.meta.trial_id,
            block_id: self.meta.block_id.clone(),
            block_idx: self.meta.block_idx,
            condition: self.label,
            phase,
            deadline,
            ssd: self.ssd,
        }
    }
}

impl TrialEngine {
    pub fn new(durations: TrialDurations, keys: ResponseKeys) -> Self {
        Self { durations, keys }
    }

    pub fn from_settings(settings: &TaskSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self::new(settings.durations()?, settings.response_keys()))
    }

    /// Runs one trial and, for stop trials, feeds the outcome back into the
    /// staircase.
    ///
    /// Service errors abort the trial and are returned unchanged; the
    /// staircase is only touched once the trial has fully completed.
    pub fn run_trial<S, E>(
        &self,
        label: TrialLabel,
        meta: &TrialMeta,
        staircase: &mut StaircaseController,
        services: &mut S,
        triggers: &mut E,
    ) -> Result<TrialRecord, S::Error>
    where
        S: ResponseCapture + ?Sized,
        E: TriggerEmitter,
    {
        let ssd = label
            .is_stop()
            .then(|| staircase.get_ssd_for(label.direction));
        let (pre_stop, stop_signal) = self.durations.stop_windows(ssd.unwrap_or_default());
        let go_stim = label.go_stimulus();
        let correct_key = self.keys.correct_for(label.direction);
        let scope = TrialScope { meta, label, ssd };

        debug!(
            trial_id = meta.trial_id,
            block = %meta.block_id,
            condition = %label,
            ssd_ms = ssd.map(|d| d.as_secs_f64() * 1e3),
            "trial started"
        );

        let mut record = TrialRecord {
            trial_id: meta.trial_id,
            block_id: meta.block_id.clone(),
            block_idx: meta.block_idx,
            condition: label,
            ssd,
            phases: Vec::with_capacity(4),
            go_hit: None,
            go_ssd_key_press: None,
            stop_key_press: None,
            failed_stop: None,
        };

        let mut state = TrialState::Start;
        let mut go_responded = false;
        while let Some(next) = state.next(label.kind, go_responded) {
            state = next;
            let Some(phase) = state.phase() else {
                continue;
            };
            let phase_record = match state {
                TrialState::Fixation => self.show(
                    phase,
                    &[StimulusId::Fixation],
                    self.durations.fixation,
                    services,
                    triggers,
                )?,
                TrialState::GoWindow => {
                    let r = self.capture(
                        phase,
                        &[go_stim],
                        self.durations.go,
                        Some(correct_key),
                        &scope,
                        services,
                        triggers,
                    )?;
                    go_responded = r.key_press();
                    record.go_hit = r.hit;
                    r
                }
                TrialState::NoResponseFeedback => self.show(
                    phase,
                    &[StimulusId::NoResponseFeedback],
                    self.durations.no_response_feedback,
                    services,
                    triggers,
                )?,
                TrialState::PreStopWindow => {
                    let r =
                        self.capture(phase, &[go_stim], pre_stop, None, &scope, services, triggers)?;
                    record.go_ssd_key_press = Some(r.key_press());
                    r
                }
                TrialState::StopSignalWindow => {
                    let r = self.capture(
                        phase,
                        &[go_stim, StimulusId::StopSignal],
                        stop_signal,
                        None,
                        &scope,
                        services,
                        triggers,
                    )?;
                    record.stop_key_press = Some(r.key_press());
                    r
                }
                TrialState::Start | TrialState::Done => continue,
            };
            record.phases.push(phase_record);
        }

        if label.is_stop() {
            let failed = record.go_ssd_key_press == Some(true) || record.stop_key_press == Some(true);
            record.failed_stop = Some(failed);
            staircase.update_for(label.direction, !failed);
        }

        debug!(
            trial_id = meta.trial_id,
            go_hit = ?record.go_hit,
            failed_stop = ?record.failed_stop,
            "trial finished"
        );
        Ok(record)
    }

    fn show<S, E>(
        &self,
        phase: PhaseName,
        stimuli: &[StimulusId],
        duration: Duration,
        services: &mut S,
        triggers: &mut E,
    ) -> Result<PhaseRecord, S::Error>
    where
        S: ResponseCapture + ?Sized,
        E: TriggerEmitter,
    {
        let onset_trigger = triggers.phase_triggers(phase).onset;
        let timing = services.present(stimuli, duration, onset_trigger, triggers)?;
        debug!(%phase, elapsed_ms = timing.elapsed.as_secs_f64() * 1e3, "phase shown");
        Ok(PhaseRecord {
            phase,
            onset: timing.onset,
            duration,
            elapsed: timing.elapsed,
            captured: false,
            key: None,
            rt: None,
            hit: None,
            timed_out: false,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn capture<S, E>(
        &self,
        phase: PhaseName,
        stimuli: &[StimulusId],
        duration: Duration,
        correct_key: Option<&str>,
        scope: &TrialScope<'_>,
        services: &mut S,
        triggers: &mut E,
    ) -> Result<PhaseRecord, S::Error>
    where
        S: ResponseCapture + ?Sized,
        E: TriggerEmitter,
    {
        let context = scope.context(phase, duration);
        let phase_triggers = triggers.phase_triggers(phase);
        let request = CaptureRequest {
            stimuli,
            valid_keys: &self.keys.valid,
            correct_key,
            duration,
            triggers: phase_triggers,
            terminate_on_response: phase.terminates_on_response(),
            context: &context,
        };
        let outcome = services.capture_response(&request, triggers)?;
        let reported = outcome.key.is_some();
        let (key, rt) = self.accept(phase, duration, outcome.key, outcome.rt);
        if reported && key.is_none() {
            // The service already fired the response trigger for this key.
            triggers.fire(phase_triggers.timeout);
        }
        let hit = correct_key.map(|c| key.as_deref() == Some(c));

        debug!(
            %phase,
            key = key.as_deref(),
            rt_ms = rt.map(|d| d.as_secs_f64() * 1e3),
            elapsed_ms = outcome.elapsed.as_secs_f64() * 1e3,
            "phase captured"
        );
        Ok(PhaseRecord {
            phase,
            onset: outcome.onset,
            duration,
            elapsed: outcome.elapsed,
            captured: true,
            timed_out: key.is_none(),
            key,
            rt,
            hit,
        })
    }

    /// Drops keys outside the response set and responses at or after the
    /// window deadline.
    fn accept(
        &self,
        phase: PhaseName,
        duration: Duration,
        key: Option<String>,
        rt: Option<Duration>,
    ) -> (Option<String>, Option<Duration>) {
        match (key, rt) {
            (Some(key), _) if !self.keys.is_valid(&key) => {
                warn!(%phase, key = %key, "ignoring key outside the response set");
                (None, None)
            }
            (Some(key), Some(rt)) if rt >= duration => {
                warn!(
                    %phase,
                    key = %key,
                    rt_ms = rt.as_secs_f64() * 1e3,
                    "response reported after the window closed; scoring as timeout"
                );
                (None, None)
            }
            (Some(key), rt) => (Some(key), rt),
            (None, _) => (None, None),
        }
    }
}
