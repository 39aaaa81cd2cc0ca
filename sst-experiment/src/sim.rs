//! Scripted participant for simulation runs and tests.
//!
//! Implements the presentation and response services on top of a
//! [`Timer`]: every window is slept out on the timer, and responses come
//! from a policy instead of a keyboard. With a [`sst_timing::VirtualTimer`]
//! a whole session runs instantly and deterministically.

use std::convert::Infallible;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sst_core::{
    CaptureOutcome, CaptureRequest, Direction, PhaseName, PresentTiming, Presenter,
    ResponseCapture, StimulusId, TriggerCode, TriggerSink,
};
use sst_timing::{Deadline, Timer};

use crate::config::{positive, seconds};
use crate::error::{ConfigError, ValidationIssue};
use crate::trial::ResponseKeys;

/// How the simulated participant behaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParticipantPolicy {
    /// Correct key at a fixed RT on go trials; never responds once a stop
    /// trial has started.
    Ideal { go_rt: Duration },
    /// Independent race between a go process and a stop process: on stop
    /// trials the response escapes when `go_rt < ssd + ssrt`.
    HorseRace {
        go_rt: Duration,
        /// Half-width of the uniform RT spread around `go_rt`.
        go_rt_jitter: Duration,
        ssrt: Duration,
        miss_rate: f64,
        wrong_key_rate: f64,
    },
}

/// `simulation` section of a config file. Times in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub go_rt: f64,
    pub go_rt_jitter: f64,
    pub ssrt: f64,
    pub miss_rate: f64,
    pub wrong_key_rate: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            go_rt: 0.45,
            go_rt_jitter: 0.1,
            ssrt: 0.22,
            miss_rate: 0.02,
            wrong_key_rate: 0.02,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn ideal(&self) -> Result<ParticipantPolicy, ConfigError> {
        let go_rt = positive("simulation.go_rt", self.go_rt)
            .map_err(|issue| ConfigError::Invalid { issues: vec![issue] })?;
        Ok(ParticipantPolicy::Ideal { go_rt })
    }

    pub fn horse_race(&self) -> Result<ParticipantPolicy, ConfigError> {
        let mut issues = Vec::new();
        let mut take = |r: Result<Duration, ValidationIssue>| {
            r.unwrap_or_else(|issue| {
                issues.push(issue);
                Duration::ZERO
            })
        };
        let go_rt = take(positive("simulation.go_rt", self.go_rt));
        let go_rt_jitter = take(seconds("simulation.go_rt_jitter", self.go_rt_jitter));
        let ssrt = take(seconds("simulation.ssrt", self.ssrt));
        for (path, rate) in [
            ("simulation.miss_rate", self.miss_rate),
            ("simulation.wrong_key_rate", self.wrong_key_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                issues.push(ValidationIssue::new(path, "must be a probability in [0, 1]"));
            }
        }
        if !issues.is_empty() {
            return Err(ConfigError::Invalid { issues });
        }
        Ok(ParticipantPolicy::HorseRace {
            go_rt,
            go_rt_jitter,
            ssrt,
            miss_rate: self.miss_rate,
            wrong_key_rate: self.wrong_key_rate,
        })
    }
}

/// One presented frame, as the participant saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLog {
    pub phase: Option<PhaseName>,
    pub stimuli: Vec<StimulusId>,
    pub duration: Duration,
    pub elapsed: Duration,
}

pub struct ScriptedParticipant<T> {
    timer: T,
    policy: ParticipantPolicy,
    keys: ResponseKeys,
    rng: StdRng,
    /// Go-process outcome drawn at the start of the current stop trial.
    stop_trial: Option<(u64, Option<(String, Duration)>)>,
    pub frames: Vec<FrameLog>,
}

impl<T: Timer> ScriptedParticipant<T> {
    pub fn new(timer: T, policy: ParticipantPolicy, keys: ResponseKeys, seed: u64) -> Self {
        Self {
            timer,
            policy,
            keys,
            rng: StdRng::seed_from_u64(seed),
            stop_trial: None,
            frames: Vec::new(),
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Draws the go process for one trial: the key and its latency from
    /// go onset, or `None` for a miss.
    fn go_process(&mut self, direction: Direction) -> Option<(String, Duration)> {
        let correct = self.keys.correct_for(direction).to_string();
        match self.policy {
            ParticipantPolicy::Ideal { go_rt } => Some((correct, go_rt)),
            ParticipantPolicy::HorseRace {
                go_rt,
                go_rt_jitter,
                miss_rate,
                wrong_key_rate,
                ..
            } => {
                if self.rng.random_bool(miss_rate) {
                    return None;
                }
                let key = if self.rng.random_bool(wrong_key_rate) {
                    let other = match direction {
                        Direction::Left => Direction::Right,
                        Direction::Right => Direction::Left,
                    };
                    self.keys.correct_for(other).to_string()
                } else {
                    correct
                };
                let spread = go_rt_jitter.as_nanos() as i128;
                let offset = if spread > 0 {
                    self.rng.random_range(-spread..=spread)
                } else {
                    0
                };
                let nanos = (go_rt.as_nanos() as i128 + offset).max(1_000_000);
                Some((key, Duration::from_nanos(nanos as u64)))
            }
        }
    }

    /// Key and offset inside the current window at which to respond.
    fn plan(&mut self, request: &CaptureRequest<'_>) -> Option<(String, Duration)> {
        let ctx = request.context;
        let direction = ctx.condition.direction;
        match ctx.phase {
            PhaseName::GoResponseWindow => self.go_process(direction),
            PhaseName::PreStopWindow => {
                let go = match self.policy {
                    ParticipantPolicy::Ideal { .. } => None,
                    ParticipantPolicy::HorseRace { .. } => self.go_process(direction),
                };
                self.stop_trial = Some((ctx.trial_id, go.clone()));
                go.filter(|(_, rt)| *rt < request.duration)
            }
            PhaseName::StopSignalWindow => {
                let (trial_id, go) = self.stop_trial.take()?;
                if trial_id != ctx.trial_id {
                    return None;
                }
                let ssd = ctx.ssd.unwrap_or_default();
                let ssrt = match self.policy {
                    ParticipantPolicy::HorseRace { ssrt, .. } => ssrt,
                    ParticipantPolicy::Ideal { .. } => return None,
                };
                let (key, rt) = go?;
                // rt < ssd: already answered during the pre-stop window.
                if rt < ssd || rt >= ssd + ssrt {
                    return None;
                }
                Some((key, rt - ssd))
            }
            PhaseName::Fixation | PhaseName::NoResponseFeedback => None,
        }
    }

    fn log(
        &mut self,
        phase: Option<PhaseName>,
        stimuli: &[StimulusId],
        duration: Duration,
        elapsed: Duration,
    ) {
        self.frames.push(FrameLog {
            phase,
            stimuli: stimuli.to_vec(),
            duration,
            elapsed,
        });
    }
}

impl<T: Timer> Presenter for ScriptedParticipant<T> {
    type Error = Infallible;

    fn present(
        &mut self,
        stimuli: &[StimulusId],
        duration: Duration,
        onset_trigger: Option<TriggerCode>,
        triggers: &mut dyn TriggerSink,
    ) -> Result<PresentTiming, Self::Error> {
        let deadline = Deadline::starting_now(&self.timer, duration);
        let onset = deadline.start;
        triggers.fire(onset_trigger);
        deadline.wait(&self.timer);
        let elapsed = self.timer.elapsed(onset);
        self.log(None, stimuli, duration, elapsed);
        Ok(PresentTiming { onset, elapsed })
    }
}

impl<T: Timer> ResponseCapture for ScriptedParticipant<T> {
    fn capture_response(
        &mut self,
        request: &CaptureRequest<'_>,
        triggers: &mut dyn TriggerSink,
    ) -> Result<CaptureOutcome, Self::Error> {
        let plan = self.plan(request);
        let duration = request.duration;
        let deadline = Deadline::starting_now(&self.timer, duration);
        let onset = deadline.start;
        triggers.fire(request.triggers.onset);

        let outcome = match plan {
            Some((key, at)) if deadline.contains(at) => {
                self.timer
                    .sleep(at.saturating_sub(self.timer.elapsed(onset)));
                triggers.fire(request.triggers.response);
                if !request.terminate_on_response {
                    deadline.wait(&self.timer);
                }
                CaptureOutcome {
                    onset,
                    elapsed: self.timer.elapsed(onset),
                    key: Some(key),
                    rt: Some(at),
                    timed_out: false,
                }
            }
            _ => {
                deadline.wait(&self.timer);
                triggers.fire(request.triggers.timeout);
                CaptureOutcome::no_response(onset, self.timer.elapsed(onset))
            }
        };
        self.log(
            Some(request.context.phase),
            request.stimuli,
            duration,
            outcome.elapsed,
        );
        Ok(outcome)
    }
}
